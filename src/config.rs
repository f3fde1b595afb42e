//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// How long [`Server::stop`](crate::Server::stop) waits for in-flight
/// requests before closing their connections.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default listen address, `0.0.0.0:8080`.
pub const DEFAULT_ADDR: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);

/// Settings for a [`Server`](crate::Server).
///
/// ```rust
/// use std::time::Duration;
/// use waypost::ServerConfig;
///
/// let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
///     .grace_period(Duration::from_secs(2));
/// assert_eq!(config.grace_period, Duration::from_secs(2));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind. Port `0` picks a free port.
    pub addr: SocketAddr,
    /// Upper bound on the drain phase of a shutdown.
    pub grace_period: Duration,
}

impl ServerConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, grace_period: DEFAULT_GRACE_PERIOD }
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDR)
    }
}
