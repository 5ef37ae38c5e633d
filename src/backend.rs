// Copyright 2020 Joyent, Inc.

//! The backend descriptor: the long-lived record of one configured
//! origin, and the one concrete `Director` implemented in this crate.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::director::{Director, Event};
use crate::error::FetchError;
use crate::fetch;
use crate::pipe;
use crate::pool::ConnectionPool;
use crate::probe::Probe;
use crate::registry::Registry;
use crate::stats::BackendStats;
use crate::transaction::{Acct, Transaction, Worker};
use crate::transport::{CloseReason, PipeAcct};
use crate::types::{BackendOptions, ConnectionCount, Parameters};

/// Administrative health override. `Probe` defers to the probe verdict
/// (or reports healthy when no probe is attached).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdminHealth {
    Probe,
    Healthy,
    Sick,
    Deleted,
}

impl AdminHealth {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => AdminHealth::Healthy,
            2 => AdminHealth::Sick,
            3 => AdminHealth::Deleted,
            _ => AdminHealth::Probe,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AdminHealth::Probe => "probe",
            AdminHealth::Healthy => "healthy",
            AdminHealth::Sick => "sick",
            AdminHealth::Deleted => "deleted",
        }
    }
}

/// One configured origin server.
///
/// The descriptor exclusively owns its statistics block (present only
/// while warm) and shares its connection-pool handle with the probe
/// subsystem. The `stats` mutex is the per-descriptor lock: the live
/// connection count is only mutated while it is held, and it is never
/// held across a blocking call.
///
/// Health, administrative state, and the live connection count are kept
/// in atomics so `dump` and `uptime` can read them without locking.
pub struct Backend {
    display_name: String,
    host_header: Option<String>,
    ipv4: Option<SocketAddr>,
    ipv6: Option<SocketAddr>,
    port: String,
    max_connections: u32,
    connect_timeout: Option<Duration>,
    first_byte_timeout: Option<Duration>,
    between_bytes_timeout: Option<Duration>,
    proxy_header: u8,
    params: Arc<Parameters>,
    pool: Arc<dyn ConnectionPool>,
    probe: Option<Arc<dyn Probe>>,
    health: AtomicBool,
    health_changed_us: AtomicI64,
    admin_health: AtomicU8,
    /// Open connection count. Mutated only under the `stats` lock.
    n_conn: AtomicU32,
    /// Cooling deadline in unix micros; zero while the backend is warm.
    cooled_us: AtomicI64,
    stats: Mutex<Option<BackendStats>>,
}

fn dt_from_micros(us: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(
        us.div_euclid(1_000_000),
        (us.rem_euclid(1_000_000) * 1000) as u32,
    )
    .single()
    .unwrap_or_else(Utc::now)
}

impl Backend {
    /// Create a descriptor and register it with `registry`. The probe,
    /// when present, was constructed around its own share of the same
    /// pool handle.
    pub fn new(
        registry: &Arc<Registry>,
        opts: BackendOptions,
        pool: Arc<dyn ConnectionPool>,
        probe: Option<Arc<dyn Probe>>,
    ) -> Arc<Backend> {
        assert!(
            opts.ipv4.is_some() || opts.ipv6.is_some(),
            "backend {}: no address configured",
            opts.display_name
        );

        let be = Arc::new(Backend {
            display_name: opts.display_name,
            host_header: opts.host_header,
            ipv4: opts.ipv4,
            ipv6: opts.ipv6,
            port: opts.port,
            max_connections: opts.max_connections,
            connect_timeout: opts.connect_timeout,
            first_byte_timeout: opts.first_byte_timeout,
            between_bytes_timeout: opts.between_bytes_timeout,
            proxy_header: opts.proxy_header,
            params: registry.params().clone(),
            pool,
            probe,
            health: AtomicBool::new(true),
            health_changed_us: AtomicI64::new(Utc::now().timestamp_micros()),
            admin_health: AtomicU8::new(0),
            n_conn: AtomicU32::new(0),
            cooled_us: AtomicI64::new(0),
            stats: Mutex::new(None),
        });
        registry.insert(be.clone());
        be
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn admin_health(&self) -> AdminHealth {
        AdminHealth::from_u8(self.admin_health.load(Ordering::Relaxed))
    }

    /// Push a health verdict. Used by the probe subsystem for
    /// backends whose probes report by callback rather than by query.
    pub fn set_health(&self, healthy: bool, now: DateTime<Utc>) {
        let prev = self.health.swap(healthy, Ordering::Relaxed);
        if prev != healthy {
            self.health_changed_us
                .store(now.timestamp_micros(), Ordering::Relaxed);
        }
    }

    /// Publish the probe's most recent happiness bitmap. A no-op while
    /// the backend is cold.
    pub fn set_happy(&self, happy: u64) {
        if let Some(stats) = self.stats.lock().unwrap().as_mut() {
            stats.happy = happy;
        }
    }

    /// Read-only copy of the statistics block for the metrics sink.
    /// `None` while the backend is cold.
    pub fn snapshot_stats(&self) -> Option<BackendStats> {
        *self.stats.lock().unwrap()
    }

    pub(crate) fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    pub(crate) fn host_header(&self) -> Option<&str> {
        self.host_header.as_deref()
    }

    pub(crate) fn proxy_header(&self) -> u8 {
        self.proxy_header
    }

    pub(crate) fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub(crate) fn first_byte_timeout(&self) -> Option<Duration> {
        self.first_byte_timeout
    }

    pub(crate) fn between_bytes_timeout(&self) -> Option<Duration> {
        self.between_bytes_timeout
    }

    pub(crate) fn params(&self) -> &Parameters {
        &self.params
    }

    pub(crate) fn current_connections(&self) -> u32 {
        self.n_conn.load(Ordering::Relaxed)
    }

    /// Resolve health through the admin override, then the probe.
    pub(crate) fn resolved_health(&self) -> (bool, DateTime<Utc>) {
        let changed =
            dt_from_micros(self.health_changed_us.load(Ordering::Relaxed));
        match self.admin_health() {
            AdminHealth::Healthy => (true, changed),
            AdminHealth::Sick | AdminHealth::Deleted => (false, changed),
            AdminHealth::Probe => match &self.probe {
                Some(probe) => probe.health(),
                None => (self.health.load(Ordering::Relaxed), changed),
            },
        }
    }

    /// Reserve a connection slot against `max_connections`. The check
    /// and the increment happen under the descriptor lock so the limit
    /// holds under concurrent acquisition.
    pub(crate) fn reserve_slot(&self) -> bool {
        let mut stats = self.stats.lock().unwrap();
        let n = self.n_conn.load(Ordering::Relaxed);
        if self.max_connections > 0 && n >= self.max_connections {
            if let Some(s) = stats.as_mut() {
                s.fail_busy += 1;
            }
            return false;
        }
        self.n_conn.store(n + 1, Ordering::Relaxed);
        true
    }

    /// Give back a reserved slot on a path that never opened a
    /// connection.
    pub(crate) fn release_slot(&self) {
        let _stats = self.stats.lock().unwrap();
        let n = self.n_conn.load(Ordering::Relaxed);
        assert!(
            n > 0,
            "backend {}: connection count underflow",
            self.display_name
        );
        self.n_conn.store(n - 1, Ordering::Relaxed);
    }

    /// Count a connection successfully acquired for a request.
    pub(crate) fn connection_opened(&self) {
        if let Some(s) = self.stats.lock().unwrap().as_mut() {
            s.conn += 1;
            s.opened += 1;
            s.req += 1;
        }
    }

    /// Count a connection released at finish and drain the
    /// transaction's accounting, all under one hold of the descriptor
    /// lock.
    pub(crate) fn connection_done(&self, acct: &Acct, recycled: bool) {
        let mut stats = self.stats.lock().unwrap();
        let n = self.n_conn.load(Ordering::Relaxed);
        assert!(
            n > 0,
            "backend {}: connection count underflow",
            self.display_name
        );
        self.n_conn.store(n - 1, Ordering::Relaxed);
        if let Some(s) = stats.as_mut() {
            // The gauge restarts from zero on rewarm, so a connection
            // opened before a cold/warm cycle can finish against a
            // fresh block.
            if s.conn > 0 {
                s.conn -= 1;
            }
            if recycled {
                s.reuse += 1;
            } else {
                s.close += 1;
            }
            s.charge(acct);
        }
    }

    pub(crate) fn count_failure(
        &self,
        bump: impl FnOnce(&mut BackendStats),
    ) {
        if let Some(s) = self.stats.lock().unwrap().as_mut() {
            bump(s);
        }
    }

    pub(crate) fn count_retry(&self) {
        self.count_failure(|s| s.retry += 1);
    }

    pub(crate) fn charge_pipe(&self, acct: &PipeAcct) {
        if let Some(s) = self.stats.lock().unwrap().as_mut() {
            s.charge_pipe(acct);
        }
    }

    /// Mark the descriptor deleted and stamp its cooling deadline.
    /// In-flight transactions keep using it; only future lookup is
    /// affected.
    pub(crate) fn mark_deleted(&self, now: DateTime<Utc>) {
        self.admin_health
            .store(AdminHealth::Deleted as u8, Ordering::Relaxed);
        self.health_changed_us
            .store(now.timestamp_micros(), Ordering::Relaxed);
        let grace = chrono::Duration::from_std(self.params.backend_cool_grace)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        self.cooled_us
            .store((now + grace).timestamp_micros(), Ordering::Relaxed);
    }

    /// Cooling deadline in unix micros; zero while warm.
    pub(crate) fn cooled_micros(&self) -> i64 {
        self.cooled_us.load(Ordering::Relaxed)
    }

    /// Final teardown, run by the reap sweep after the descriptor has
    /// been unlinked from the cooling registry. The pool handle is
    /// released when the last `Arc<Backend>` drops.
    pub(crate) fn teardown(&self) {
        if let Some(probe) = &self.probe {
            probe.remove();
        }
        // A backend is normally cooled before deletion; drop a leftover
        // stats block rather than leak it.
        self.stats.lock().unwrap().take();
    }

    fn stats_lock(&self) -> MutexGuard<Option<BackendStats>> {
        self.stats.lock().unwrap()
    }
}

impl Director for Backend {
    fn name(&self) -> &'static str {
        "backend"
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn healthy(&self, _tx: Option<&Transaction>) -> bool {
        self.resolved_health().0
    }

    fn uptime(&self) -> (bool, DateTime<Utc>, ConnectionCount) {
        let (healthy, changed) = self.resolved_health();
        (healthy, changed, self.current_connections().into())
    }

    fn get_headers(
        &self,
        wrk: &Worker,
        tx: &mut Transaction,
    ) -> Result<(), FetchError> {
        fetch::get_headers(self, wrk, tx)
    }

    fn get_peer_addr(&self, tx: &Transaction) -> Option<SocketAddr> {
        tx.exchange.as_ref().map(|ex| ex.conn.peer)
    }

    fn finish(&self, wrk: &Worker, tx: &mut Transaction) {
        let ex = tx.exchange.take().unwrap_or_else(|| {
            panic!(
                "backend {}: finish with no connection attached",
                self.display_name
            )
        });
        fetch::release(self, wrk, tx, ex);
    }

    fn pipe(&self, wrk: &Worker, tx: &mut Transaction) -> CloseReason {
        pipe::http1_pipe(self, wrk, tx)
    }

    fn notify(&self, ev: Event) {
        match ev {
            Event::Warm => {
                {
                    let mut stats = self.stats_lock();
                    assert!(
                        stats.is_none(),
                        "backend {}: statistics block already present",
                        self.display_name
                    );
                    *stats = Some(BackendStats::default());
                }
                if let Some(probe) = &self.probe {
                    probe.control(true);
                }
            }
            Event::Cold => {
                if let Some(probe) = &self.probe {
                    probe.control(false);
                }
                let old = self.stats_lock().take();
                assert!(
                    old.is_some(),
                    "backend {}: no statistics block to tear down",
                    self.display_name
                );
            }
        }
    }

    fn dump(&self, sink: &mut dyn io::Write) -> io::Result<()> {
        writeln!(sink, "display_name = {},", self.display_name)?;
        if let Some(addr) = &self.ipv4 {
            writeln!(sink, "ipv4 = {},", addr)?;
        }
        if let Some(addr) = &self.ipv6 {
            writeln!(sink, "ipv6 = {},", addr)?;
        }
        writeln!(sink, "port = {},", self.port)?;
        if let Some(host) = &self.host_header {
            writeln!(sink, "hosthdr = {},", host)?;
        }
        writeln!(
            sink,
            "health = {},",
            if self.health.load(Ordering::Relaxed) {
                "healthy"
            } else {
                "sick"
            }
        )?;
        writeln!(
            sink,
            "admin_health = {}, changed = {:.6},",
            self.admin_health().as_str(),
            self.health_changed_us.load(Ordering::Relaxed) as f64 / 1e6
        )?;
        writeln!(sink, "n_conn = {},", self.current_connections())
    }
}
