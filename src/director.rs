// Copyright 2020 Joyent, Inc.

//! The director capability contract.
//!
//! Anything a transaction can fetch from implements `Director`. This
//! crate provides the single-backend variant; load-balancing and
//! hashing directors live elsewhere and satisfy the same trait.

use std::io;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::transaction::{Transaction, Worker};
use crate::transport::CloseReason;
use crate::types::ConnectionCount;

/// Configuration lifecycle events delivered through `Director::notify`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// The backend starts serving traffic: statistics come into
    /// existence and the probe, if any, starts.
    Warm,
    /// The backend is quiesced: the probe pauses and statistics are
    /// torn down. The descriptor and its pool handle stay alive.
    Cold,
}

pub trait Director: Send + Sync {
    /// Variant name, e.g. `"backend"`.
    fn name(&self) -> &'static str;

    /// Name the director is reported under in logs and dumps.
    fn display_name(&self) -> &str;

    /// Whether the director would currently accept a fetch. Callable
    /// with no connection open.
    fn healthy(&self, tx: Option<&Transaction>) -> bool;

    /// Health, the time it last changed, and the current load (open
    /// connection count).
    fn uptime(&self) -> (bool, DateTime<Utc>, ConnectionCount);

    /// Acquire a connection, send the transaction's request, and read
    /// the response headers. On success the connection stays attached
    /// to the transaction for body streaming; `finish` must be called
    /// exactly once afterwards. Performs at most one automatic retry,
    /// and only when a reused connection turned out to be stale.
    fn get_headers(
        &self,
        wrk: &Worker,
        tx: &mut Transaction,
    ) -> Result<(), FetchError>;

    /// Peer address of the attached connection. Valid only after a
    /// successful `get_headers`.
    fn get_peer_addr(&self, tx: &Transaction) -> Option<SocketAddr>;

    /// Release the connection acquired by `get_headers`. Mandatory once
    /// the transaction is done with this director; calling it without
    /// an attached connection is a caller defect and aborts.
    fn finish(&self, wrk: &Worker, tx: &mut Transaction);

    /// Run a raw bidirectional passthrough session. Handles the whole
    /// connection lifecycle internally; the caller must not call
    /// `finish`. Pipe connections are never recycled.
    fn pipe(&self, wrk: &Worker, tx: &mut Transaction) -> CloseReason;

    /// Deliver a configuration lifecycle event.
    fn notify(&self, ev: Event);

    /// Best-effort diagnostic serialization for postmortem reporting.
    /// Must not take any lock a faulting thread could hold; reads plain
    /// fields only.
    fn dump(&self, sink: &mut dyn io::Write) -> io::Result<()>;
}
