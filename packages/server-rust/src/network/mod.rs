//! Networking: listeners, HTTP handlers, transport middleware, server
//! lifecycle, and a client for remote health reports.

pub mod config;
pub mod handlers;
pub mod health_client;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::NetworkConfig;
pub use handlers::{MonitoringState, RpcState};
pub use health_client::HealthClient;
pub use module::{monitoring_router, rpc_router, BoundAddrs, NetworkModule, ServeDeps};
pub use shutdown::{InFlightGuard, LifecycleState, ShutdownController};
