//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder};
use tracing::Span;

use super::entry::EntryLayer;
use super::entry_logs::EntryLogsLayer;
use super::geoip::GeoIpLayer;
use super::logging::LoggingLayer;
use super::metrics::{MetricsLayer, RpcMetrics};
use super::recovery::RecoveryLayer;
use super::timeout::TimeoutLayer;
use crate::service::call::{Call, Reply};
use crate::service::config::PipelineConfig;
use crate::service::geoip::GeoIpLookup;
use crate::service::outcome::RpcError;

/// The fully composed, type-erased call pipeline.
pub type CallPipeline = BoxCloneSyncService<Call, Reply, RpcError>;

/// Process-lifetime collaborators shared by every call.
#[derive(Clone)]
pub struct PipelineDeps {
    /// Parent of every call's logger span.
    pub base_logger: Span,
    pub metrics: RpcMetrics,
    pub geoip: Option<Arc<dyn GeoIpLookup>>,
}

/// Wraps `handler` with every pipeline stage.
///
/// Layer order (outermost to innermost):
/// 1. `RecoveryLayer` -- nothing above it can crash uncaught
/// 2. `LoggingLayer` -- attach the call logger
/// 3. `EntryLayer` -- build request identity before anything reads it
/// 4. `GeoIpLayer` -- resolve the caller's location
/// 5. `EntryLogsLayer` -- the completion record covers metrics and timeout handling
/// 6. `MetricsLayer` -- in-flight, total and latency
/// 7. `TimeoutLayer` -- race the handler against the deadline in its own task
/// 8. `RecoveryLayer` -- contain faults inside the timeout stage's task
#[must_use]
pub fn build_call_pipeline<H>(handler: H, config: &PipelineConfig, deps: PipelineDeps) -> CallPipeline
where
    H: Service<Call, Response = Reply, Error = RpcError> + Clone + Send + Sync + 'static,
    H::Future: Send + 'static,
{
    let stack = ServiceBuilder::new()
        .layer(RecoveryLayer)
        .layer(LoggingLayer::new(deps.base_logger))
        .layer(EntryLayer::new(config.entry))
        .layer(GeoIpLayer::new(deps.geoip))
        .layer(EntryLogsLayer::new(config.entry_logs))
        .layer(MetricsLayer::new(deps.metrics))
        .layer(TimeoutLayer::new(config.call_timeout))
        .layer(RecoveryLayer)
        .service(handler);
    BoxCloneSyncService::new(stack)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
