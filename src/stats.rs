// Copyright 2020 Joyent, Inc.

//! The per-backend statistics block.
//!
//! The block exists exactly while the descriptor is warm: it is created
//! on the warm event and destroyed on the cold event. All mutation
//! happens under the descriptor's lock; external metrics sinks read a
//! copy through `Backend::snapshot_stats`.

use crate::transaction::Acct;
use crate::transport::PipeAcct;

#[derive(Clone, Copy, Debug, Default)]
pub struct BackendStats {
    /// Probe happiness bitmap, most recent poll in the low bit.
    pub happy: u64,
    /// Connections currently open (gauge).
    pub conn: u64,
    /// Connections opened since warm-up.
    pub opened: u64,
    /// Requests sent.
    pub req: u64,
    pub bereq_hdrbytes: u64,
    pub bereq_bodybytes: u64,
    pub beresp_hdrbytes: u64,
    pub beresp_bodybytes: u64,
    pub pipe_hdrbytes: u64,
    pub pipe_in: u64,
    pub pipe_out: u64,
    /// Connections returned to the pool for reuse.
    pub reuse: u64,
    /// Connections closed at finish.
    pub close: u64,
    /// Automatic retries after a stale reused connection.
    pub retry: u64,
    pub fail_unhealthy: u64,
    pub fail_busy: u64,
    pub fail_workspace: u64,
    pub fail_acquire: u64,
}

impl BackendStats {
    /// Drain one transaction's byte accounting into the cumulative
    /// counters.
    pub(crate) fn charge(&mut self, acct: &Acct) {
        self.bereq_hdrbytes += acct.bereq_hdrbytes;
        self.bereq_bodybytes += acct.bereq_bodybytes;
        self.beresp_hdrbytes += acct.beresp_hdrbytes;
        self.beresp_bodybytes += acct.beresp_bodybytes;
    }

    pub(crate) fn charge_pipe(&mut self, acct: &PipeAcct) {
        self.pipe_hdrbytes += acct.hdrbytes;
        self.pipe_out += acct.bereq + acct.bytes_out;
        self.pipe_in += acct.bytes_in;
    }
}
