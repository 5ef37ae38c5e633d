// Copyright 2020 Joyent, Inc.

//! Consumed interface to the HTTP/1 serialization layer and the pipe
//! byte shovel.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IOError;
use std::time::Duration;

use crate::pool::PooledConnection;
use crate::transaction::Transaction;

/// Why a connection must be closed at finish instead of recycled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseReason {
    /// No response bytes arrived in time, or a reused connection never
    /// proved liveness.
    RxTimeout,
    /// The response preamble was unparseable or truncated.
    RxBad,
    /// The connection carried a pipe session. Pipe connections are
    /// never recycled.
    TxPipe,
    /// The request could not be sent.
    TxError,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CloseReason::RxTimeout => write!(fmt, "rx timeout"),
            CloseReason::RxBad => write!(fmt, "rx bad"),
            CloseReason::TxPipe => write!(fmt, "tx pipe"),
            CloseReason::TxError => write!(fmt, "tx error"),
        }
    }
}

#[derive(Debug)]
pub enum TransportError {
    /// The per-exchange timeout budget ran out.
    Timeout,
    /// The peer closed the connection before the operation completed.
    Closed,
    /// The bytes on the wire did not parse as HTTP/1.
    Protocol(String),
    Io(IOError),
}

impl From<IOError> for TransportError {
    fn from(error: IOError) -> Self {
        TransportError::Io(error)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(fmt, "timeout"),
            TransportError::Closed => write!(fmt, "connection closed"),
            TransportError::Protocol(reason) => reason.fmt(fmt),
            TransportError::Io(io_err) => io_err.fmt(fmt),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TransportError::Io(io_err) => Some(io_err),
            _ => None,
        }
    }
}

/// Byte accounting for one pipe session.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipeAcct {
    /// Request header bytes already read from the client before the
    /// session switched to pipe mode.
    pub hdrbytes: u64,
    /// Request bytes written to the backend.
    pub bereq: u64,
    /// Bytes shovelled backend-to-client.
    pub bytes_in: u64,
    /// Bytes shovelled client-to-backend.
    pub bytes_out: u64,
}

/// Contract of the request/response transport layer.
///
/// All blocking operations are bounded by the timeouts passed in.
pub trait Transport: Send + Sync {
    /// Serialize and write the transaction's request. Returns the
    /// number of header bytes written.
    fn send_request(
        &self,
        conn: &mut PooledConnection,
        tx: &mut Transaction,
    ) -> Result<u64, TransportError>;

    /// Read and parse the response preamble. Returns the number of
    /// header bytes read.
    fn receive_headers(
        &self,
        conn: &mut PooledConnection,
        tx: &mut Transaction,
        first_byte_timeout: Duration,
        between_bytes_timeout: Duration,
    ) -> Result<u64, TransportError>;

    /// Emit a PROXY protocol header ahead of the request. Returns the
    /// number of bytes written.
    fn emit_proxy_header(
        &self,
        conn: &mut PooledConnection,
        version: u8,
    ) -> Result<u64, TransportError>;

    /// Copy bytes bidirectionally between client and backend until
    /// either side closes or an error occurs.
    fn shovel(
        &self,
        conn: &mut PooledConnection,
        tx: &mut Transaction,
    ) -> Result<PipeAcct, TransportError>;
}
