// Copyright 2020 Joyent, Inc.

use std::error::Error as StdError;
use std::fmt;

/// Failure modes of a header fetch, reported to the transaction layer.
///
/// `StaleConnection` is the only variant the orchestrator ever recovers
/// from locally, and it does so at most once per fetch. Everything else
/// surfaces immediately; retrying a sent request risks duplicate side
/// effects on the origin and is left to upstream policy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchError {
    /// The backend is administratively or probe-reported sick.
    Unhealthy,
    /// The backend is at its `max_connections` limit.
    ConnectionLimitReached,
    /// The transaction workspace could not hold the exchange state.
    ResourceExhausted,
    /// The pool could not produce a connection (refused or timed out).
    AcquisitionFailed(String),
    /// A reused connection turned out to be dead after the request was
    /// already on the wire.
    StaleConnection,
    /// The request could not be written to the connection.
    SendFailed(String),
    /// No response arrived within the first-byte/between-bytes budget.
    ReceiveTimeout,
    /// The response preamble could not be parsed.
    ReceiveProtocolError(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FetchError::Unhealthy => write!(fmt, "backend unhealthy"),
            FetchError::ConnectionLimitReached => write!(fmt, "backend busy"),
            FetchError::ResourceExhausted => write!(fmt, "out of workspace"),
            FetchError::AcquisitionFailed(reason) => {
                write!(fmt, "connection acquisition failed: {}", reason)
            }
            FetchError::StaleConnection => {
                write!(fmt, "stale backend connection")
            }
            FetchError::SendFailed(reason) => {
                write!(fmt, "request send failed: {}", reason)
            }
            FetchError::ReceiveTimeout => {
                write!(fmt, "timed out waiting for response headers")
            }
            FetchError::ReceiveProtocolError(reason) => {
                write!(fmt, "bad response preamble: {}", reason)
            }
        }
    }
}

impl StdError for FetchError {}
