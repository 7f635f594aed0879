//! Health, readiness and metrics endpoint handlers.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use tokio_util::sync::CancellationToken;
use tollgate_core::health::Daemon;
use tollgate_core::HealthReportBody;

use super::MonitoringState;

/// Runs every check and returns the report.
///
/// Always 200: the body carries the verdict, so a monitor can tell a
/// degraded service from one that is not answering at all. Each run is
/// also logged.
pub async fn healthcheck_handler(State(state): State<MonitoringState>) -> Json<HealthReportBody> {
    // Dropping this handler (client gone) cancels the checks still running.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let report = state.checker.run_checks(&cancel).await;
    let checks = serde_json::to_string(report.checks()).unwrap_or_default();
    tracing::info!(
        state = %report.overall_state(),
        total_duration_seconds = report.duration().as_secs_f64(),
        checks = %checks,
        "Healthcheck"
    );

    Json(HealthReportBody::from(report))
}

/// 200 while the server is serving, 503 while starting or shutting down.
pub async fn readiness_handler(State(state): State<MonitoringState>) -> StatusCode {
    if state.shutdown.serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus text exposition.
pub async fn metrics_handler(State(state): State<MonitoringState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub async fn root_handler() -> Redirect {
    Redirect::temporary("/healthcheck")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::header::LOCATION;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tollgate_core::health::daemon_serving_check;
    use tollgate_core::{check_fn, CheckResult, CheckState, HealthChecker, HealthCheckerConfig};
    use tower::ServiceExt;

    use super::*;
    use crate::network::ShutdownController;
    use crate::test_support::{field, CapturedLogs};

    fn test_state() -> MonitoringState {
        let shutdown = Arc::new(ShutdownController::new());
        let mut checker = HealthChecker::new(HealthCheckerConfig {
            service: "monitoring-test".to_string(),
            environment: "test".to_string(),
            ..HealthCheckerConfig::default()
        });
        checker.add_check("http server", daemon_serving_check(shutdown.clone()));
        checker.add_check("cache", check_fn(|_cancel| async { Ok(CheckResult::degraded("slow")) }));

        MonitoringState {
            checker: Arc::new(checker),
            shutdown,
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    fn app(state: MonitoringState) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/healthcheck", get(healthcheck_handler))
            .route("/ready", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    async fn get_path(app: Router, path: &str) -> axum::response::Response {
        app.oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn healthcheck_is_200_even_when_unhealthy() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let response = get_path(app(test_state()), "/healthcheck").await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: HealthReportBody = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.is_healthy);
        assert!(body.is_degraded);
        assert_eq!(body.report.checks().len(), 2);
        assert_eq!(body.report.checks()[0].name, "http server");
        assert_eq!(body.report.checks()[0].state, CheckState::Unhealthy);
        assert_eq!(body.report.runtime().service, "monitoring-test");

        let records = logs.with_message("Healthcheck");
        assert_eq!(records.len(), 1);
        assert_eq!(field(&records[0], "state").unwrap(), "unhealthy");
        assert!(records[0]["total_duration_seconds"].is_number());
        assert!(field(&records[0], "checks").unwrap().as_str().unwrap().contains("http server"));
    }

    #[tokio::test]
    async fn healthcheck_reflects_serving_state() {
        let state = test_state();
        state.shutdown.set_ready();

        let response = get_path(app(state), "/healthcheck").await;
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: HealthReportBody = serde_json::from_slice(&bytes).unwrap();
        assert!(body.is_healthy);
        assert_eq!(body.report.checks()[0].state, CheckState::Healthy);
    }

    #[tokio::test]
    async fn readiness_follows_lifecycle() {
        let state = test_state();
        assert_eq!(get_path(app(state.clone()), "/ready").await.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.shutdown.set_ready();
        assert_eq!(get_path(app(state.clone()), "/ready").await.status(), StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(get_path(app(state), "/ready").await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_are_prometheus_text() {
        let response = get_path(app(test_state()), "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; version=0.0.4");
    }

    #[tokio::test]
    async fn root_redirects_to_healthcheck() {
        let response = get_path(app(test_state()), "/").await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], "/healthcheck");
    }
}
