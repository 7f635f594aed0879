//! Client for another service's `GET /healthcheck` report.

use tokio_util::sync::CancellationToken;
use tollgate_core::CheckReport;

#[derive(Debug, thiserror::Error)]
pub enum HealthClientError {
    #[error("failed to get a response from the target '{url}': {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response status HTTP {status}")]
    Status { status: u16 },
    #[error("failed to read the response from the target '{url}': {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode the response from the target '{url}': {body}")]
    Decode { url: String, body: String },
    #[error("health request canceled by caller")]
    Canceled,
}

/// Fetches and decodes the health report served at `url`.
#[derive(Debug, Clone)]
pub struct HealthClient {
    url: String,
    http: reqwest::Client,
}

impl HealthClient {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(url, reqwest::Client::new())
    }

    /// Uses a preconfigured `reqwest` client (timeouts, proxies, TLS).
    #[must_use]
    pub fn with_client(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self { url: url.into(), http }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the remote report. Non-2xx answers and bodies that are not a
    /// report are errors; an unhealthy report is not.
    ///
    /// # Errors
    ///
    /// See [`HealthClientError`].
    pub async fn check(&self, cancel: &CancellationToken) -> Result<CheckReport, HealthClientError> {
        tokio::select! {
            biased;

            () = cancel.cancelled() => Err(HealthClientError::Canceled),
            report = self.fetch() => report,
        }
    }

    async fn fetch(&self) -> Result<CheckReport, HealthClientError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|source| HealthClientError::Request {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HealthClientError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| HealthClientError::Body {
            url: self.url.clone(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|_| HealthClientError::Decode {
            url: self.url.clone(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tokio::net::TcpListener;
    use tollgate_core::{check_fn, CheckResult, CheckState, HealthChecker, HealthCheckerConfig};

    use super::*;
    use crate::network::handlers::{healthcheck_handler, MonitoringState};
    use crate::network::ShutdownController;

    async fn spawn_server(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn monitoring_app() -> Router {
        let mut checker = HealthChecker::new(HealthCheckerConfig {
            service: "remote".to_string(),
            ..HealthCheckerConfig::default()
        });
        checker.add_check("db", check_fn(|_cancel| async { Ok(CheckResult::healthy("ok")) }));
        checker.add_check("queue", check_fn(|_cancel| async { Ok(CheckResult::unhealthy("down")) }));

        Router::new()
            .route("/healthcheck", get(healthcheck_handler))
            .with_state(MonitoringState {
                checker: Arc::new(checker),
                shutdown: Arc::new(ShutdownController::new()),
                metrics: PrometheusBuilder::new().build_recorder().handle(),
            })
    }

    #[tokio::test]
    async fn decodes_remote_report() {
        let addr = spawn_server(monitoring_app()).await;
        let client = HealthClient::new(format!("http://{addr}/healthcheck"));

        let report = client.check(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.checks().len(), 2);
        assert_eq!(report.checks()[1].name, "queue");
        assert_eq!(report.checks()[1].state, CheckState::Unhealthy);
        assert_eq!(report.runtime().service, "remote");
        assert_eq!(report.overall_state(), CheckState::Unhealthy);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let addr = spawn_server(Router::new().route(
            "/healthcheck",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;
        let client = HealthClient::new(format!("http://{addr}/healthcheck"));

        let err = client.check(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, HealthClientError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn undecodable_body_is_an_error() {
        let addr = spawn_server(Router::new().route("/healthcheck", get(|| async { "not a report" }))).await;
        let client = HealthClient::new(format!("http://{addr}/healthcheck"));

        let err = client.check(&CancellationToken::new()).await.unwrap_err();
        match err {
            HealthClientError::Decode { body, .. } => assert_eq!(body, "not a report"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn canceled_before_answer() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = HealthClient::new("http://127.0.0.1:9/healthcheck");
        assert!(matches!(client.check(&cancel).await, Err(HealthClientError::Canceled)));
    }
}
