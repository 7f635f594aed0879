//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates the shared lifecycle controller, `start()` binds both
//! listeners, and `serve()` runs the call transport and the monitoring
//! router until shutdown. The split lets `main` wire the health checker to
//! the controller before anything is listening.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tollgate_core::HealthChecker;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    healthcheck_handler, metrics_handler, readiness_handler, root_handler, rpc_handler,
    MonitoringState, RpcState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::CallPipeline;

/// Addresses actually bound by [`NetworkModule::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub rpc: SocketAddr,
    pub monitoring: SocketAddr,
}

/// Everything the two routers serve.
#[derive(Clone)]
pub struct ServeDeps {
    pub pipeline: CallPipeline,
    pub checker: Arc<HealthChecker>,
    pub metrics: PrometheusHandle,
}

/// Call transport routes:
/// - `POST /{service}/{method}` -- one call through the pipeline
pub fn rpc_router(state: RpcState, config: &NetworkConfig) -> Router {
    Router::new()
        .route("/{service}/{method}", post(rpc_handler))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Monitoring routes:
/// - `GET /` -- redirect to `/healthcheck`
/// - `GET /healthcheck` -- run every check, always 200
/// - `GET /ready` -- 200 while serving, 503 otherwise
/// - `GET /metrics` -- Prometheus text
pub fn monitoring_router(state: MonitoringState, config: &NetworkConfig) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/healthcheck", get(healthcheck_handler))
        .route("/ready", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Owns both listeners and the server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    rpc_listener: Option<TcpListener>,
    monitoring_listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            rpc_listener: None,
            monitoring_listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Shared lifecycle controller: readiness, the daemon-serving check and
    /// signal handlers all use it.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds both listeners.
    ///
    /// Port 0 picks an ephemeral port; the returned addresses are the real ones.
    ///
    /// # Errors
    ///
    /// Returns an error if either address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<BoundAddrs> {
        let rpc = TcpListener::bind(self.config.rpc_addr)
            .await
            .with_context(|| format!("cannot bind call transport to {}", self.config.rpc_addr))?;
        let monitoring = TcpListener::bind(self.config.monitoring_addr)
            .await
            .with_context(|| format!("cannot bind monitoring to {}", self.config.monitoring_addr))?;

        let bound = BoundAddrs {
            rpc: rpc.local_addr()?,
            monitoring: monitoring.local_addr()?,
        };
        info!(rpc_addr = %bound.rpc, monitoring_addr = %bound.monitoring, "Listeners bound");

        self.rpc_listener = Some(rpc);
        self.monitoring_listener = Some(monitoring);
        Ok(bound)
    }

    /// Serves until `shutdown` resolves or the controller is told to stop.
    ///
    /// Shutdown sequence:
    /// 1. lifecycle moves to `Draining` (readiness turns 503)
    /// 2. the call transport stops accepting and finishes open exchanges
    /// 3. in-flight calls get up to `drain_timeout` to complete
    /// 4. the monitoring router stops last
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or a server fails.
    pub async fn serve(
        mut self,
        deps: ServeDeps,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let rpc_listener = self
            .rpc_listener
            .take()
            .context("start() must be called before serve()")?;
        let monitoring_listener = self
            .monitoring_listener
            .take()
            .context("start() must be called before serve()")?;

        let rpc = rpc_router(
            RpcState {
                pipeline: deps.pipeline,
                shutdown: Arc::clone(&self.shutdown),
            },
            &self.config,
        );
        let monitoring = monitoring_router(
            MonitoringState {
                checker: deps.checker,
                shutdown: Arc::clone(&self.shutdown),
                metrics: deps.metrics,
            },
            &self.config,
        );

        let stop_monitoring = CancellationToken::new();
        let monitoring_task = {
            let stop = stop_monitoring.clone();
            tokio::spawn(async move {
                axum::serve(monitoring_listener, monitoring)
                    .with_graceful_shutdown(async move { stop.cancelled().await })
                    .await
            })
        };

        {
            let ctrl = Arc::clone(&self.shutdown);
            tokio::spawn(async move {
                shutdown.await;
                ctrl.trigger_shutdown();
            });
        }

        self.shutdown.set_ready();
        info!("Serving calls");

        let ctrl = Arc::clone(&self.shutdown);
        let served = axum::serve(
            rpc_listener,
            rpc.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { ctrl.shutdown_requested().await })
        .await;

        // The transport may have failed rather than been asked to stop.
        self.shutdown.trigger_shutdown();
        if self.shutdown.wait_for_drain(self.config.drain_timeout).await {
            info!("All in-flight calls drained");
        } else {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "Drain timeout expired with calls still in flight"
            );
        }

        stop_monitoring.cancel();
        let monitored = monitoring_task.await.context("monitoring server task failed")?;

        served.context("call transport failed")?;
        monitored.context("monitoring server failed")?;
        Ok(())
    }
}
