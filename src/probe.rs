// Copyright 2020 Joyent, Inc.

//! Consumed interface to the active health-probe scheduler.

use chrono::{DateTime, Utc};

/// Contract of the probe attached to a backend descriptor.
///
/// The probe holds its own share of the backend's connection-pool
/// handle; probing and fetching draw sockets from the same pool.
pub trait Probe: Send + Sync {
    /// Pause (`false`) or resume (`true`) probing. Driven by the
    /// descriptor's warm/cold lifecycle events.
    fn control(&self, enable: bool);

    /// Permanently detach the probe ahead of descriptor teardown.
    fn remove(&self);

    /// Most recent probe verdict and the time it last changed.
    fn health(&self) -> (bool, DateTime<Utc>);
}
