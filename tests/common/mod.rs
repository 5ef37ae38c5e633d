// Copyright 2020 Joyent, Inc.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Error as IOError, ErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use slog::{o, Drain, Logger};

use bankshot::pool::{
    AcquireError, ConnTag, ConnectionPool, PooledConnection,
};
use bankshot::probe::Probe;
use bankshot::transaction::{Transaction, Worker};
use bankshot::transport::{PipeAcct, Transport, TransportError};
use bankshot::types::BackendOptions;

pub fn test_log() -> Logger {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!(),
    )
}

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

pub fn options(display_name: &str) -> BackendOptions {
    BackendOptions::new(
        display_name,
        "8080",
        Some(addr("127.0.0.1:8080")),
        None,
    )
}

pub fn worker(transport: Arc<FakeTransport>) -> Worker {
    Worker::new(Some(test_log()), transport)
}

/// What the next pool acquisition returns.
#[derive(Clone, Copy, Debug)]
pub enum AcquireStep {
    Fresh,
    /// A connection taken from the idle list; `live` is whether the
    /// peer will prove liveness when asked.
    Stolen { live: bool },
    Fail,
}

struct PoolState {
    next_id: u64,
    script: VecDeque<AcquireStep>,
    liveness: HashMap<u64, bool>,
    recycled: Vec<u64>,
    closed: Vec<u64>,
    last_timeout: Option<Duration>,
}

pub struct FakePool {
    inner: Mutex<PoolState>,
    honor_force_fresh: bool,
}

impl FakePool {
    pub fn new() -> Arc<FakePool> {
        FakePool::scripted(vec![])
    }

    /// Pool whose acquisitions follow `steps`; once the script runs out
    /// every acquisition yields a fresh connection.
    pub fn scripted(steps: Vec<AcquireStep>) -> Arc<FakePool> {
        Arc::new(FakePool {
            inner: Mutex::new(PoolState {
                next_id: 1,
                script: steps.into_iter().collect(),
                liveness: HashMap::new(),
                recycled: Vec::new(),
                closed: Vec::new(),
                last_timeout: None,
            }),
            honor_force_fresh: true,
        })
    }

    /// A misbehaving pool that ignores `force_fresh`, for driving the
    /// orchestrator through repeated stale connections.
    pub fn scripted_sticky(steps: Vec<AcquireStep>) -> Arc<FakePool> {
        Arc::new(FakePool {
            inner: Mutex::new(PoolState {
                next_id: 1,
                script: steps.into_iter().collect(),
                liveness: HashMap::new(),
                recycled: Vec::new(),
                closed: Vec::new(),
                last_timeout: None,
            }),
            honor_force_fresh: false,
        })
    }

    pub fn recycled(&self) -> Vec<u64> {
        self.inner.lock().unwrap().recycled.clone()
    }

    pub fn closed(&self) -> Vec<u64> {
        self.inner.lock().unwrap().closed.clone()
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.inner.lock().unwrap().last_timeout
    }
}

impl ConnectionPool for FakePool {
    fn acquire(
        &self,
        timeout: Duration,
        force_fresh: bool,
    ) -> Result<PooledConnection, AcquireError> {
        let mut state = self.inner.lock().unwrap();
        state.last_timeout = Some(timeout);
        let mut step =
            state.script.pop_front().unwrap_or(AcquireStep::Fresh);
        if force_fresh && self.honor_force_fresh {
            step = match step {
                AcquireStep::Fail => AcquireStep::Fail,
                _ => AcquireStep::Fresh,
            };
        }
        let (tag, live) = match step {
            AcquireStep::Fail => return Err(AcquireError::Timeout),
            AcquireStep::Fresh => (ConnTag::Fresh, true),
            AcquireStep::Stolen { live } => {
                (ConnTag::ReusedUnverified, live)
            }
        };
        let id = state.next_id;
        state.next_id += 1;
        state.liveness.insert(id, live);
        Ok(PooledConnection {
            id,
            peer: addr("127.0.0.1:8080"),
            local: addr("127.0.0.1:34567"),
            tag,
        })
    }

    fn recycle(&self, conn: PooledConnection) {
        self.inner.lock().unwrap().recycled.push(conn.id);
    }

    fn close(&self, conn: PooledConnection) {
        self.inner.lock().unwrap().closed.push(conn.id);
    }

    fn wait_live(
        &self,
        conn: &mut PooledConnection,
        _timeout: Duration,
    ) -> bool {
        let live = self
            .inner
            .lock()
            .unwrap()
            .liveness
            .get(&conn.id)
            .copied()
            .unwrap_or(true);
        if live {
            conn.tag = ConnTag::ReusedVerified;
        }
        live
    }
}

/// What the next header receive returns.
#[derive(Clone, Copy, Debug)]
pub enum RecvStep {
    Headers(u64),
    Timeout,
    Closed,
    Protocol,
}

struct TransportState {
    recv_script: VecDeque<RecvStep>,
    fail_send: bool,
    fail_proxy: bool,
    sends: u32,
    proxy_headers: u32,
    shovels: u32,
}

pub struct FakeTransport {
    inner: Mutex<TransportState>,
}

impl FakeTransport {
    pub fn new() -> Arc<FakeTransport> {
        FakeTransport::scripted(vec![])
    }

    /// Transport whose header receives follow `steps`; once the script
    /// runs out every receive succeeds.
    pub fn scripted(steps: Vec<RecvStep>) -> Arc<FakeTransport> {
        Arc::new(FakeTransport {
            inner: Mutex::new(TransportState {
                recv_script: steps.into_iter().collect(),
                fail_send: false,
                fail_proxy: false,
                sends: 0,
                proxy_headers: 0,
                shovels: 0,
            }),
        })
    }

    pub fn failing_send() -> Arc<FakeTransport> {
        let transport = FakeTransport::scripted(vec![]);
        transport.inner.lock().unwrap().fail_send = true;
        transport
    }

    pub fn failing_proxy_header() -> Arc<FakeTransport> {
        let transport = FakeTransport::scripted(vec![]);
        transport.inner.lock().unwrap().fail_proxy = true;
        transport
    }

    pub fn sends(&self) -> u32 {
        self.inner.lock().unwrap().sends
    }

    pub fn proxy_headers(&self) -> u32 {
        self.inner.lock().unwrap().proxy_headers
    }

    pub fn shovels(&self) -> u32 {
        self.inner.lock().unwrap().shovels
    }
}

impl Transport for FakeTransport {
    fn send_request(
        &self,
        _conn: &mut PooledConnection,
        _tx: &mut Transaction,
    ) -> Result<u64, TransportError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_send {
            return Err(TransportError::Io(IOError::new(
                ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        state.sends += 1;
        Ok(42)
    }

    fn receive_headers(
        &self,
        _conn: &mut PooledConnection,
        _tx: &mut Transaction,
        _first_byte_timeout: Duration,
        _between_bytes_timeout: Duration,
    ) -> Result<u64, TransportError> {
        let step = self
            .inner
            .lock()
            .unwrap()
            .recv_script
            .pop_front()
            .unwrap_or(RecvStep::Headers(100));
        match step {
            RecvStep::Headers(bytes) => Ok(bytes),
            RecvStep::Timeout => Err(TransportError::Timeout),
            RecvStep::Closed => Err(TransportError::Closed),
            RecvStep::Protocol => {
                Err(TransportError::Protocol(String::from("junk preamble")))
            }
        }
    }

    fn emit_proxy_header(
        &self,
        _conn: &mut PooledConnection,
        _version: u8,
    ) -> Result<u64, TransportError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_proxy {
            return Err(TransportError::Io(IOError::new(
                ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        state.proxy_headers += 1;
        Ok(16)
    }

    fn shovel(
        &self,
        _conn: &mut PooledConnection,
        _tx: &mut Transaction,
    ) -> Result<PipeAcct, TransportError> {
        self.inner.lock().unwrap().shovels += 1;
        Ok(PipeAcct {
            hdrbytes: 0,
            bereq: 0,
            bytes_in: 1000,
            bytes_out: 2000,
        })
    }
}

pub struct FakeProbe {
    health: Mutex<(bool, DateTime<Utc>)>,
    controls: Mutex<Vec<bool>>,
    removed: AtomicBool,
}

impl FakeProbe {
    pub fn healthy() -> Arc<FakeProbe> {
        FakeProbe::with_health(true)
    }

    pub fn sick() -> Arc<FakeProbe> {
        FakeProbe::with_health(false)
    }

    fn with_health(healthy: bool) -> Arc<FakeProbe> {
        Arc::new(FakeProbe {
            health: Mutex::new((healthy, Utc::now())),
            controls: Mutex::new(Vec::new()),
            removed: AtomicBool::new(false),
        })
    }

    pub fn set_health(&self, healthy: bool) {
        *self.health.lock().unwrap() = (healthy, Utc::now());
    }

    pub fn controls(&self) -> Vec<bool> {
        self.controls.lock().unwrap().clone()
    }

    pub fn removed(&self) -> bool {
        self.removed.load(Ordering::Relaxed)
    }
}

impl Probe for FakeProbe {
    fn control(&self, enable: bool) {
        self.controls.lock().unwrap().push(enable);
    }

    fn remove(&self) {
        self.removed.store(true, Ordering::Relaxed);
    }

    fn health(&self) -> (bool, DateTime<Utc>) {
        *self.health.lock().unwrap()
    }
}
