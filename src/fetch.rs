// Copyright 2020 Joyent, Inc.

//! The fetch orchestrator: acquire a connection, send the request, read
//! the response headers, and retry exactly once when a reused
//! connection turns out to be stale.

use slog::{debug, info, warn};

use crate::backend::Backend;
use crate::error::FetchError;
use crate::pool::ConnTag;
use crate::transaction::{Exchange, Transaction, Worker, EXCHANGE_FOOTPRINT};
use crate::transport::{CloseReason, TransportError};
use crate::types::resolve_timeout;

/// Get a connection to the backend.
///
/// Failures here are definitive for the whole fetch; retry applies only
/// to staleness detected after the request is on the wire. Each failure
/// reason is logged and counted distinctly.
pub(crate) fn acquire(
    bp: &Backend,
    wrk: &Worker,
    tx: &mut Transaction,
    force_fresh: bool,
) -> Result<Exchange, FetchError> {
    if !bp.resolved_health().0 {
        warn!(wrk.log, "backend {}: unhealthy", bp.display_name());
        bp.count_failure(|s| s.fail_unhealthy += 1);
        return Err(FetchError::Unhealthy);
    }

    if !bp.reserve_slot() {
        warn!(wrk.log, "backend {}: busy", bp.display_name());
        return Err(FetchError::ConnectionLimitReached);
    }

    if !tx.workspace.reserve(EXCHANGE_FOOTPRINT) {
        warn!(wrk.log, "backend {}: out of workspace", bp.display_name());
        bp.count_failure(|s| s.fail_workspace += 1);
        bp.release_slot();
        return Err(FetchError::ResourceExhausted);
    }

    let connect_timeout = resolve_timeout(
        tx.connect_timeout,
        bp.connect_timeout(),
        bp.params().connect_timeout,
    );
    let mut conn = match bp.pool().acquire(connect_timeout, force_fresh) {
        Ok(conn) => conn,
        Err(e) => {
            warn!(wrk.log, "backend {}: fail: {}", bp.display_name(), e);
            bp.count_failure(|s| s.fail_acquire += 1);
            bp.release_slot();
            return Err(FetchError::AcquisitionFailed(e.to_string()));
        }
    };

    bp.connection_opened();

    // A connection whose PROXY preamble did not fully reach the wire
    // has corrupt framing; it cannot carry this request or any other.
    if bp.proxy_header() != 0 {
        if let Err(e) =
            wrk.transport.emit_proxy_header(&mut conn, bp.proxy_header())
        {
            warn!(
                wrk.log,
                "backend {}: proxy header failed: {}",
                bp.display_name(),
                e
            );
            bp.pool().close(conn);
            bp.connection_done(&tx.acct, false);
            return Err(FetchError::SendFailed(e.to_string()));
        }
    }

    info!(
        wrk.log,
        "backend open {} {} {} {}", conn.id, bp.display_name(), conn.peer,
        conn.local
    );

    Ok(Exchange {
        conn,
        close: None,
        first_byte_timeout: resolve_timeout(
            tx.first_byte_timeout,
            bp.first_byte_timeout(),
            bp.params().first_byte_timeout,
        ),
        between_bytes_timeout: resolve_timeout(
            tx.between_bytes_timeout,
            bp.between_bytes_timeout(),
            bp.params().between_bytes_timeout,
        ),
    })
}

/// The gethdrs entry point behind `Director::get_headers`.
pub(crate) fn get_headers(
    bp: &Backend,
    wrk: &Worker,
    tx: &mut Transaction,
) -> Result<(), FetchError> {
    // Now that the concrete backend is known, a default Host header can
    // be set. This cannot happen earlier because the backend may have
    // been chosen by a load-balancing director.
    if tx.host_header.is_none() {
        if let Some(host) = bp.host_header() {
            tx.host_header = Some(host.to_string());
        }
    }

    // One extra chance applies only while the first attempt ran on a
    // reused, unverified connection: the origin may have closed it
    // while it sat in the pool.
    let mut extrachance = true;
    loop {
        let mut ex = acquire(bp, wrk, tx, !extrachance)?;
        if ex.conn.tag != ConnTag::ReusedUnverified {
            extrachance = false;
        }

        let mut err = None;
        match wrk.transport.send_request(&mut ex.conn, tx) {
            Ok(bytes) => tx.acct.bereq_hdrbytes += bytes,
            Err(e) => {
                ex.close = Some(CloseReason::TxError);
                err = Some(FetchError::SendFailed(e.to_string()));
                extrachance = false;
            }
        }

        // A reused connection must prove liveness before a response can
        // be trusted out of it. A timeout here is staleness, not a
        // genuine fetch error.
        if err.is_none() && ex.conn.tag == ConnTag::ReusedUnverified {
            if !bp.pool().wait_live(&mut ex.conn, ex.first_byte_timeout) {
                ex.close = Some(CloseReason::RxTimeout);
                warn!(
                    wrk.log,
                    "backend {}: timed out reusing backend connection",
                    bp.display_name()
                );
                err = Some(FetchError::StaleConnection);
            }
        }

        if err.is_none() && ex.close.is_none() {
            match wrk.transport.receive_headers(
                &mut ex.conn,
                tx,
                ex.first_byte_timeout,
                ex.between_bytes_timeout,
            ) {
                Ok(bytes) => {
                    tx.acct.beresp_hdrbytes += bytes;
                    tx.exchange = Some(ex);
                    return Ok(());
                }
                Err(TransportError::Timeout) => {
                    ex.close = Some(CloseReason::RxTimeout);
                    err = Some(FetchError::ReceiveTimeout);
                    extrachance = false;
                }
                Err(TransportError::Closed) => {
                    // EOF before headers on a recycled connection means
                    // the origin closed it before our request arrived.
                    ex.close = Some(CloseReason::RxBad);
                    err = Some(if extrachance {
                        FetchError::StaleConnection
                    } else {
                        FetchError::ReceiveProtocolError(
                            "connection closed before response".into(),
                        )
                    });
                }
                Err(e) => {
                    ex.close = Some(CloseReason::RxBad);
                    err = Some(FetchError::ReceiveProtocolError(
                        e.to_string(),
                    ));
                    extrachance = false;
                }
            }
        }

        // Never recycle a connection whose liveness failed.
        release(bp, wrk, tx, ex);

        let e = err.unwrap_or(FetchError::StaleConnection);
        if e != FetchError::StaleConnection || !extrachance {
            return Err(e);
        }
        if !tx.body_replay_safe() {
            debug!(
                wrk.log,
                "backend {}: not retrying, request body cannot be replayed",
                bp.display_name()
            );
            return Err(e);
        }

        bp.count_retry();
        info!(
            wrk.log,
            "backend {}: retrying once on stale connection",
            bp.display_name()
        );
        extrachance = false;
    }
}

/// Disposition of a connection once a transaction is done with it.
/// Closes when anything made the connection unsafe to reuse (including
/// a configured proxy header), recycles otherwise, and settles all
/// counters under one hold of the descriptor lock.
pub(crate) fn release(
    bp: &Backend,
    wrk: &Worker,
    tx: &mut Transaction,
    ex: Exchange,
) {
    let Exchange { conn, close, .. } = ex;
    let recycled = close.is_none() && bp.proxy_header() == 0;
    if recycled {
        info!(wrk.log, "backend reuse {} {}", conn.id, bp.display_name());
        bp.pool().recycle(conn);
    } else {
        info!(wrk.log, "backend close {} {}", conn.id, bp.display_name());
        bp.pool().close(conn);
    }
    bp.connection_done(&tx.acct, recycled);
    tx.acct = Default::default();
}
