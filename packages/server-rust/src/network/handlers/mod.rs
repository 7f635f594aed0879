//! HTTP handler definitions for the `Tollgate` server.
//!
//! Two routers share these: the monitoring router (health, readiness,
//! metrics) and the call transport. Each gets its own state struct so
//! neither carries what it does not use.

pub mod health;
pub mod rpc;

pub use health::{healthcheck_handler, metrics_handler, readiness_handler, root_handler};
pub use rpc::{rpc_handler, status_for};

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tollgate_core::HealthChecker;

use super::ShutdownController;
use crate::service::CallPipeline;

/// State of the monitoring router.
#[derive(Clone)]
pub struct MonitoringState {
    /// Runs every registered check on `GET /healthcheck`.
    pub checker: Arc<HealthChecker>,
    /// Readiness follows the lifecycle state.
    pub shutdown: Arc<ShutdownController>,
    /// Renders the exposition text for `GET /metrics`.
    pub metrics: PrometheusHandle,
}

/// State of the call transport.
#[derive(Clone)]
pub struct RpcState {
    /// The fully composed call pipeline, router included.
    pub pipeline: CallPipeline,
    /// Tracks in-flight calls for graceful drain.
    pub shutdown: Arc<ShutdownController>,
}
