// Copyright 2020 Joyent, Inc.

use std::net::SocketAddr;
use std::time::Duration;

use derive_more::{Add, AddAssign, Display, From, Into, Sub, SubAssign};

/// The number of connections currently open against a backend. This is
/// the "load" reported by `Director::uptime`.
#[derive(
    Add, AddAssign, Clone, Copy, Debug, Default, Display, Eq, From, Into,
    Ord, PartialOrd, PartialEq, Sub, SubAssign,
)]
pub struct ConnectionCount(u32);

/// Process-wide defaults. These sit at the bottom of the three-level
/// timeout resolution: a per-request value wins over a per-backend
/// value, which wins over the value here.
#[derive(Clone, Debug)]
pub struct Parameters {
    pub connect_timeout: Duration,
    pub first_byte_timeout: Duration,
    pub between_bytes_timeout: Duration,
    /// Grace period between deletion of a backend and its earliest
    /// possible reap.
    pub backend_cool_grace: Duration,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            connect_timeout: Duration::from_millis(3500),
            first_byte_timeout: Duration::from_secs(60),
            between_bytes_timeout: Duration::from_secs(60),
            backend_cool_grace: Duration::from_secs(60),
        }
    }
}

/// Static configuration for one backend descriptor.
#[derive(Clone, Debug)]
pub struct BackendOptions {
    /// Name the backend is reported under in logs and dumps.
    pub display_name: String,
    /// Host header injected into requests that carry none.
    pub host_header: Option<String>,
    pub ipv4: Option<SocketAddr>,
    pub ipv6: Option<SocketAddr>,
    pub port: String,
    /// Maximum concurrent connections. Zero means unbounded.
    pub max_connections: u32,
    pub connect_timeout: Option<Duration>,
    pub first_byte_timeout: Option<Duration>,
    pub between_bytes_timeout: Option<Duration>,
    /// PROXY protocol version emitted ahead of each request. Zero means
    /// off. A connection that carried a proxy header is never recycled.
    pub proxy_header: u8,
}

impl BackendOptions {
    pub fn new(
        display_name: &str,
        port: &str,
        ipv4: Option<SocketAddr>,
        ipv6: Option<SocketAddr>,
    ) -> Self {
        BackendOptions {
            display_name: display_name.into(),
            host_header: None,
            ipv4,
            ipv6,
            port: port.into(),
            max_connections: 0,
            connect_timeout: None,
            first_byte_timeout: None,
            between_bytes_timeout: None,
            proxy_header: 0,
        }
    }
}

/// Three-level timeout resolution: request over backend over the
/// process default. `None` means "not set at this level".
pub fn resolve_timeout(
    request: Option<Duration>,
    backend: Option<Duration>,
    default: Duration,
) -> Duration {
    request.or(backend).unwrap_or(default)
}
