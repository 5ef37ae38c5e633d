// Copyright 2020 Joyent, Inc.

//! A backend connection director for an HTTP reverse-caching proxy
//!
//! Bankshot is the component that turns a logical origin-server
//! configuration into live, pooled, health-checked connections used to
//! satisfy cache misses. It owns the full lifecycle of a backend
//! descriptor, multiplexes concurrent fetches onto a bounded connection
//! pool, retries exactly once when a pooled connection has gone stale,
//! and accounts per-backend statistics.
//!
//! ## Directors
//!
//! A *director* is anything a transaction can fetch from. The
//! [`Director`](director/trait.Director.html) trait is the capability
//! contract: health query, uptime/load query, header fetch, peer-address
//! query, finish, lifecycle notification, diagnostic dump. The
//! [`Backend`](backend/struct.Backend.html) descriptor is the one
//! concrete director implemented here; load-balancing variants live
//! elsewhere and satisfy the same trait.
//!
//! ## Backends
//!
//! A [`Backend`](backend/struct.Backend.html) is the long-lived record
//! of one configured origin: addresses, timeouts, connection limit,
//! health and administrative state, a shared handle to its connection
//! pool, an optional health probe, and live counters. Descriptors are
//! registered with a [`Registry`](registry/struct.Registry.html) on
//! creation and move through a `warm -> cooling -> reaped` lifecycle.
//! Deleting a backend never invalidates references held by in-flight
//! transactions; the descriptor is parked on a cooling list and only
//! reaped by a periodic sweep once its grace deadline has passed and no
//! connections remain open against it.
//!
//! ## Fetching
//!
//! [`Director::get_headers`](director/trait.Director.html) acquires a
//! connection from the pool, sends the request, and reads the response
//! headers. A connection handed back by the pool in the
//! *reused-unverified* state must prove liveness before it is trusted;
//! if it turns out the origin closed it while it sat in the pool, the
//! orchestrator closes it and retries one time, provided the request
//! body can safely be replayed. All other failures surface immediately.
//! The connection stays attached to the transaction for body streaming
//! until [`Director::finish`](director/trait.Director.html) releases it
//! back to the pool (or closes it, if anything went wrong).
//!
//! ## Collaborators
//!
//! The connection pool, the health probe scheduler, and the HTTP/1
//! transport are external to this crate and consumed through the
//! [`ConnectionPool`](pool/trait.ConnectionPool.html),
//! [`Probe`](probe/trait.Probe.html), and
//! [`Transport`](transport/trait.Transport.html) traits.
//!
//! ## Locking
//!
//! Two lock scopes, neither ever held across blocking I/O:
//!
//! * the per-descriptor lock guards the live connection count and the
//!   statistics block; it is held only for O(1) field updates.
//! * the registry lock guards membership in the warm and cooling lists
//!   and the backend count; teardown calls into the probe and pool run
//!   after it is released.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use bankshot::backend::Backend;
//! use bankshot::director::{Director, Event};
//! use bankshot::registry::Registry;
//! use bankshot::transaction::{Transaction, Worker};
//! use bankshot::types::{BackendOptions, Parameters};
//!
//! let registry = Registry::new(None, Parameters::default());
//! let backend = Backend::new(
//!     &registry,
//!     BackendOptions::new("origin0", "8080", Some(addr), None),
//!     pool,        // Arc<dyn ConnectionPool>
//!     Some(probe), // Arc<dyn Probe>
//! );
//! backend.notify(Event::Warm);
//!
//! let wrk = Worker::new(None, transport);
//! let mut tx = Transaction::new();
//! backend.get_headers(&wrk, &mut tx)?;
//! // ... stream the body ...
//! backend.finish(&wrk, &mut tx);
//! ```

#![allow(missing_docs)]

pub mod backend;
pub mod director;
pub mod error;
mod fetch;
mod pipe;
pub mod pool;
pub mod probe;
pub mod registry;
pub mod stats;
pub mod transaction;
pub mod transport;
pub mod types;
