// Copyright 2020 Joyent, Inc.

//! The lifecycle manager: warm and cooling registries and the periodic
//! reap sweep.
//!
//! A descriptor is in exactly one of the two lists from creation until
//! final reap. The registry lock guards only membership and the backend
//! count; teardown calls into the probe and pool run after it is
//! released to avoid lock-order inversion with those subsystems.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use slog::{info, o, Drain, Logger};

use crate::backend::Backend;
use crate::types::Parameters;

struct Membership {
    warm: Vec<Arc<Backend>>,
    /// Deadline-ordered by insertion: deletion stamps a fixed grace
    /// window, so later deletions always cool later.
    cooling: VecDeque<Arc<Backend>>,
    n_backend: u64,
}

pub struct Registry {
    log: Logger,
    params: Arc<Parameters>,
    inner: Mutex<Membership>,
}

impl Registry {
    pub fn new(log: Option<Logger>, params: Parameters) -> Arc<Registry> {
        let log = log.unwrap_or_else(|| {
            Logger::root(slog_stdlog::StdLog.fuse(), o!())
        });
        Arc::new(Registry {
            log,
            params: Arc::new(params),
            inner: Mutex::new(Membership {
                warm: Vec::new(),
                cooling: VecDeque::new(),
                n_backend: 0,
            }),
        })
    }

    pub(crate) fn params(&self) -> &Arc<Parameters> {
        &self.params
    }

    pub(crate) fn insert(&self, be: Arc<Backend>) {
        let mut inner = self.inner.lock().unwrap();
        inner.warm.push(be);
        inner.n_backend += 1;
    }

    /// Total number of registered backends, warm and cooling.
    pub fn backend_count(&self) -> u64 {
        self.inner.lock().unwrap().n_backend
    }

    /// Number of entries in the warm and cooling lists.
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.warm.len(), inner.cooling.len())
    }

    /// Delete a backend: mark it administratively deleted, stamp its
    /// cooling deadline, and move it from the warm to the cooling list.
    /// Transactions already holding a reference keep working; the
    /// descriptor is only removed from future lookup.
    pub fn delete(&self, be: &Arc<Backend>, now: DateTime<Utc>) {
        be.mark_deleted(now);

        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .warm
            .iter()
            .position(|other| Arc::ptr_eq(other, be))
            .unwrap_or_else(|| {
                panic!(
                    "backend {}: delete of backend not in warm registry",
                    be.display_name()
                )
            });
        let be = inner.warm.remove(idx);
        info!(self.log, "backend {}: cooling", be.display_name());
        inner.cooling.push_back(be);
    }

    /// Reap deleted backends whose grace deadline has passed and that
    /// have no connections left open against them. The cooling list is
    /// deadline-ordered, so the scan stops at the first unexpired
    /// entry; entries with live connections are skipped, not removed.
    /// Never blocks on I/O. Returns the number of backends reaped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let now_us = now.timestamp_micros();
        let mut reaped = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            let mut idx = 0;
            while idx < inner.cooling.len() {
                let be = &inner.cooling[idx];
                if be.cooled_micros() > now_us {
                    break;
                }
                if be.current_connections() > 0 {
                    idx += 1;
                    continue;
                }
                let be = inner.cooling.remove(idx).unwrap();
                inner.n_backend -= 1;
                reaped.push(be);
            }
        }

        // Teardown talks to the probe and (by dropping the last handle)
        // the pool; both happen outside the registry lock.
        let count = reaped.len();
        for be in reaped {
            info!(self.log, "backend {}: reaped", be.display_name());
            be.teardown();
        }
        count
    }
}
