//! Listener configuration.
//!
//! [`ListenerConfig`] can be built in code through the
//! [`ListenerBuilder`](crate::listener::ListenerBuilder) or deserialized as part of an
//! application configuration file, every field is optional:
//!
//! ```toml
//! [scgi]
//! address = "127.0.0.1"
//! port = 8090
//! pool_size = 16
//! queue_capacity = 64
//! read_timeout_ms = 30000
//! shutdown_grace_ms = 5000
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_POOL_SIZE: usize = 16;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind, all interfaces by default
    pub address: IpAddr,
    /// Port to bind, `0` picks an ephemeral port
    pub port: u16,
    /// Number of workers serving connections
    pub pool_size: usize,
    /// Connections that may wait for a worker, twice the pool size when unset
    pub queue_capacity: Option<usize>,
    /// Milliseconds a connection may stay silent while the envelope or body is read, `0` waits forever
    pub read_timeout_ms: u64,
    /// Milliseconds a request in progress may keep running once shutdown is requested
    pub shutdown_grace_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl ListenerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// The effective queue capacity, never below one.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.pool_size.saturating_mul(2)).max(1)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
