// Copyright 2020 Joyent, Inc.

//! Consumed interface to the per-backend TCP connection pool.
//!
//! The pool allocator itself lives outside this crate. The descriptor
//! and its probe share one pool handle through an `Arc`; each holder's
//! share of the pool is released when its `Arc` is dropped.

use std::error::Error as StdError;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Reuse state of a pooled connection.
///
/// A connection taken from the idle list comes back `ReusedUnverified`:
/// the origin may have closed its end while the connection sat in the
/// pool, so the peer must prove liveness before a response can be
/// expected on it. The pool flips the tag to `ReusedVerified` once it
/// has. The tag governs retry eligibility in the fetch orchestrator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnTag {
    Fresh,
    ReusedUnverified,
    ReusedVerified,
}

/// A connection checked out of the pool.
#[derive(Debug)]
pub struct PooledConnection {
    pub id: u64,
    pub peer: SocketAddr,
    pub local: SocketAddr,
    pub tag: ConnTag,
}

#[derive(Debug)]
pub enum AcquireError {
    /// No connection could be established within the connect timeout.
    Timeout,
    /// The origin refused the connection.
    Refused(String),
}

impl fmt::Display for AcquireError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AcquireError::Timeout => write!(fmt, "connect timed out"),
            AcquireError::Refused(reason) => reason.fmt(fmt),
        }
    }
}

impl StdError for AcquireError {}

/// Contract of the external connection-pool allocator.
///
/// All blocking calls are bounded by the timeout passed in; none may
/// block indefinitely. A timed-out acquisition leaves no half-opened
/// connection behind.
pub trait ConnectionPool: Send + Sync {
    /// Produce a connection, preferring an idle one unless
    /// `force_fresh` is set (a retry after staleness must not trade one
    /// stale connection for another).
    fn acquire(
        &self,
        timeout: Duration,
        force_fresh: bool,
    ) -> Result<PooledConnection, AcquireError>;

    /// Return a connection to the idle list for reuse.
    fn recycle(&self, conn: PooledConnection);

    /// Close a connection. Mandatory for any connection whose liveness
    /// failed; such a connection must never reach `recycle`.
    fn close(&self, conn: PooledConnection);

    /// Wait, bounded by `timeout`, for the peer of a reused-unverified
    /// connection to prove liveness. On success the pool retags the
    /// connection `ReusedVerified` and returns true; false means the
    /// connection is stale.
    fn wait_live(&self, conn: &mut PooledConnection, timeout: Duration)
        -> bool;
}
