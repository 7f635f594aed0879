//! Network configuration types for the `Tollgate` server.

use std::net::SocketAddr;
use std::time::Duration;

/// Listener and transport-level settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address of the call transport.
    pub rpc_addr: SocketAddr,
    /// Bind address of the monitoring router (health, readiness, metrics).
    pub monitoring_addr: SocketAddr,
    /// Upper bound on one HTTP exchange, enforced by the transport.
    ///
    /// Per-call deadlines are the call pipeline's job; this only stops
    /// stuck connections from living forever.
    pub request_timeout: Duration,
    /// Maximum time to wait for in-flight calls once shutdown starts.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            monitoring_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            request_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
        }
    }
}
