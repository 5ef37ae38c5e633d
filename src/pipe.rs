// Copyright 2020 Joyent, Inc.

//! The pipe orchestrator: raw bidirectional passthrough for
//! non-cacheable or streaming requests.

use slog::warn;

use crate::backend::Backend;
use crate::fetch;
use crate::transaction::{Transaction, Worker};
use crate::transport::{CloseReason, PipeAcct};

/// Run a passthrough session against the backend. The connection path
/// has no reuse-retry logic and the connection is never recycled; bytes
/// moved in both directions are charged to the backend's statistics.
pub(crate) fn http1_pipe(
    bp: &Backend,
    wrk: &Worker,
    tx: &mut Transaction,
) -> CloseReason {
    let mut acct = PipeAcct::default();

    // Request header bytes already read from the client belong to the
    // pipe session, not to a fetch.
    acct.hdrbytes = tx.req_hdrbytes;
    tx.req_hdrbytes = 0;

    let retval = match fetch::acquire(bp, wrk, tx, false) {
        Err(e) => {
            warn!(wrk.log, "backend {}: pipe: {}", bp.display_name(), e);
            CloseReason::TxError
        }
        Ok(mut ex) => {
            match wrk.transport.send_request(&mut ex.conn, tx) {
                Ok(bytes) => {
                    acct.bereq += bytes;
                    match wrk.transport.shovel(&mut ex.conn, tx) {
                        Ok(shovelled) => {
                            acct.bytes_in += shovelled.bytes_in;
                            acct.bytes_out += shovelled.bytes_out;
                        }
                        Err(e) => warn!(
                            wrk.log,
                            "backend {}: pipe shovel: {}",
                            bp.display_name(),
                            e
                        ),
                    }
                }
                Err(e) => warn!(
                    wrk.log,
                    "backend {}: pipe send: {}",
                    bp.display_name(),
                    e
                ),
            }
            ex.close = Some(CloseReason::TxPipe);
            fetch::release(bp, wrk, tx, ex);
            CloseReason::TxPipe
        }
    };

    bp.charge_pipe(&acct);
    retval
}
