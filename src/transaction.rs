// Copyright 2020 Joyent, Inc.

//! Per-worker and per-transaction state threaded through the director
//! interface.

use std::sync::Arc;
use std::time::Duration;

use slog::{o, Drain, Logger};

use crate::pool::PooledConnection;
use crate::transport::{CloseReason, Transport};

/// Default per-transaction workspace, matching the configured backend
/// workspace of the surrounding proxy.
const DEFAULT_WORKSPACE: usize = 64 * 1024;

/// Scratch space the exchange state is carved out of. Kept as a size,
/// not an arena; exhaustion is what matters to this crate.
pub(crate) const EXCHANGE_FOOTPRINT: usize = 256;

/// A worker thread's context: its logger and a handle to the transport
/// layer it serializes requests with.
pub struct Worker {
    pub log: Logger,
    pub transport: Arc<dyn Transport>,
}

impl Worker {
    pub fn new(log: Option<Logger>, transport: Arc<dyn Transport>) -> Self {
        let log = log.unwrap_or_else(|| {
            Logger::root(slog_stdlog::StdLog.fuse(), o!())
        });
        Worker { log, transport }
    }
}

/// The fixed set of per-transaction byte counters drained into the
/// backend's cumulative statistics at finish.
#[derive(Clone, Copy, Debug, Default)]
pub struct Acct {
    pub bereq_hdrbytes: u64,
    pub bereq_bodybytes: u64,
    pub beresp_hdrbytes: u64,
    pub beresp_bodybytes: u64,
}

/// Bounded per-transaction scratch space.
#[derive(Debug)]
pub struct Workspace {
    remaining: usize,
}

impl Workspace {
    pub fn new(size: usize) -> Self {
        Workspace { remaining: size }
    }

    /// Reserve `bytes` of scratch space. Returns false when exhausted.
    pub fn reserve(&mut self, bytes: usize) -> bool {
        if self.remaining < bytes {
            return false;
        }
        self.remaining -= bytes;
        true
    }
}

/// The connection state attached to a transaction between a successful
/// `get_headers` and the mandatory `finish`.
#[derive(Debug)]
pub struct Exchange {
    pub conn: PooledConnection,
    /// Set when anything happened that makes the connection unsafe to
    /// recycle. `None` at finish means the connection goes back to the
    /// pool.
    pub close: Option<CloseReason>,
    pub first_byte_timeout: Duration,
    pub between_bytes_timeout: Duration,
}

/// One client transaction's backend-facing state.
pub struct Transaction {
    /// Host header carried by the request, if any. The fetch
    /// orchestrator injects the backend's configured override when this
    /// is empty; the concrete backend is not known before then.
    pub host_header: Option<String>,
    /// Whether the request body, if any, can be replayed on a second
    /// attempt. The body-streaming collaborator owns this verdict; a
    /// request without a body is trivially replayable.
    pub body_replay_safe: bool,
    pub connect_timeout: Option<Duration>,
    pub first_byte_timeout: Option<Duration>,
    pub between_bytes_timeout: Option<Duration>,
    /// Request header bytes already read from the client, folded into
    /// the pipe accounting when the session switches to pipe mode.
    pub req_hdrbytes: u64,
    pub acct: Acct,
    pub workspace: Workspace,
    pub exchange: Option<Exchange>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            host_header: None,
            body_replay_safe: true,
            connect_timeout: None,
            first_byte_timeout: None,
            between_bytes_timeout: None,
            req_hdrbytes: 0,
            acct: Acct::default(),
            workspace: Workspace::new(DEFAULT_WORKSPACE),
            exchange: None,
        }
    }

    pub fn body_replay_safe(&self) -> bool {
        self.body_replay_safe
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction::new()
    }
}
