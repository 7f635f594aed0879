//! `tollgate-server`: serves the sample echo service through the full call
//! pipeline, with health, readiness and metrics on a separate listener.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tollgate_core::health::daemon_serving_check;
use tollgate_core::{install_panic_capture, HealthChecker};
use tollgate_server::config::ServerConfig;
use tollgate_server::network::{NetworkModule, ServeDeps};
use tollgate_server::observability::{init_logging, prometheus_metrics};
use tollgate_server::service::domain::default_router;
use tollgate_server::service::{build_call_pipeline, PipelineDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level, config.log_format)?;
    install_panic_capture();

    tracing::info!(
        service = %config.service,
        environment = %config.environment,
        version = %config.service_version,
        server_listen_addr = %config.server_listen_addr,
        monitoring_listen_addr = %config.monitoring_listen_addr,
        "Configuration loaded"
    );

    let (metrics, metrics_handle) = prometheus_metrics()?;
    let base_logger = tracing::info_span!(
        "service",
        service = %config.service,
        environment = %config.environment,
        host = config.hostname.as_deref(),
    );
    let pipeline = build_call_pipeline(
        default_router(),
        &config.pipeline_config(),
        PipelineDeps {
            base_logger,
            metrics,
            geoip: None,
        },
    );

    let mut network = NetworkModule::new(config.network_config());
    let lifecycle = network.shutdown_controller();

    let mut checker = HealthChecker::new(config.health_config());
    checker.add_check("http server", daemon_serving_check(lifecycle));

    network.start().await?;
    network
        .serve(
            ServeDeps {
                pipeline,
                checker: Arc::new(checker),
                metrics: metrics_handle,
            },
            shutdown_signal(),
        )
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining");
}
