//! Metrics middleware for calls.
//!
//! Tracks, per lower-cased `{grpc_service, grpc_method}`:
//! - `grpc_unary_requests_in_flight` (gauge)
//! - `grpc_unary_requests_total` (counter, plus `grpc_code`)
//! - `grpc_unary_requests_duration_seconds` (histogram)
//!
//! Values go to an injected [`metrics::Recorder`] rather than the global one,
//! so tests and embedders control where they land.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use metrics::{Gauge, Key, Label, Level, Metadata, Recorder, Unit};
use tower::{Layer, Service};

use super::CallFuture;
use crate::service::call::{Call, MethodName, Reply};
use crate::service::outcome::{OutcomeCode, RpcError};

pub const IN_FLIGHT: &str = "grpc_unary_requests_in_flight";
pub const TOTAL: &str = "grpc_unary_requests_total";
pub const DURATION_SECONDS: &str = "grpc_unary_requests_duration_seconds";

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

// ---------------------------------------------------------------------------
// RpcMetrics
// ---------------------------------------------------------------------------

/// Handle to the recorder the call metrics are written to.
///
/// Build one per process and clone it into every pipeline; clones share the
/// recorder.
#[derive(Clone)]
pub struct RpcMetrics {
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl RpcMetrics {
    /// Wraps `recorder` and registers the metric descriptions with it.
    #[must_use]
    pub fn new(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        recorder.describe_gauge(
            IN_FLIGHT.into(),
            None,
            "The current number of unary requests being served.".into(),
        );
        recorder.describe_counter(
            TOTAL.into(),
            None,
            "Total number of unary requests made and responded.".into(),
        );
        recorder.describe_histogram(
            DURATION_SECONDS.into(),
            Some(Unit::Seconds),
            "The unary request latencies in seconds.".into(),
        );
        Self { recorder }
    }

    /// Starts tracking one call: bumps the in-flight gauge until the reporter is dropped.
    #[must_use]
    pub fn start(&self, method: &MethodName) -> RpcReporter {
        let labels = vec![
            Label::new("grpc_service", method.service().to_lowercase()),
            Label::new("grpc_method", method.method().to_lowercase()),
        ];
        let in_flight = self
            .recorder
            .register_gauge(&Key::from_parts(IN_FLIGHT, labels.clone()), &metadata());
        in_flight.increment(1.0);

        RpcReporter {
            recorder: Arc::clone(&self.recorder),
            labels,
            in_flight,
            started: Instant::now(),
        }
    }
}

impl fmt::Debug for RpcMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcMetrics").finish_non_exhaustive()
    }
}

/// Reports one call. Dropping it, handled or not, releases the in-flight slot.
pub struct RpcReporter {
    recorder: Arc<dyn Recorder + Send + Sync>,
    labels: Vec<Label>,
    in_flight: Gauge,
    started: Instant,
}

impl RpcReporter {
    /// Records the outcome and latency of the call.
    pub fn handled(self, code: OutcomeCode) {
        let mut labels = self.labels.clone();
        labels.push(Label::new("grpc_code", code.label()));
        self.recorder
            .register_counter(&Key::from_parts(TOTAL, labels), &metadata())
            .increment(1);
        self.recorder
            .register_histogram(&Key::from_parts(DURATION_SECONDS, self.labels.clone()), &metadata())
            .record(self.started.elapsed().as_secs_f64());
    }
}

impl Drop for RpcReporter {
    fn drop(&mut self) {
        self.in_flight.decrement(1.0);
    }
}

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that records call metrics.
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    metrics: RpcMetrics,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(metrics: RpcMetrics) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: RpcMetrics,
}

impl<S> Service<Call> for MetricsService<S>
where
    S: Service<Call, Response = Reply, Error = RpcError> + Send,
    S::Future: Send + 'static,
{
    type Response = Reply;
    type Error = RpcError;
    type Future = CallFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let reporter = self.metrics.start(call.method());
        let fut = self.inner.call(call);

        Box::pin(async move {
            let result = fut.await;
            reporter.handled(OutcomeCode::of(&result));
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn local_metrics() -> (RpcMetrics, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (RpcMetrics::new(Arc::new(recorder)), handle)
    }

    fn call() -> Call {
        Call::new(MethodName::parse("/Pkg.Echo/UnaryEcho"), Value::Null)
    }

    #[tokio::test]
    async fn counts_outcomes_with_lowercased_labels() {
        let (metrics, handle) = local_metrics();
        let layer = MetricsLayer::new(metrics);

        let ok = layer.layer(tower::service_fn(|_call: Call| async {
            Ok::<_, RpcError>(Reply::new(Value::Null))
        }));
        ok.clone().oneshot(call()).await.unwrap();
        ok.oneshot(call()).await.unwrap();

        let failing = layer.layer(tower::service_fn(|_call: Call| async {
            Err::<Reply, _>(RpcError::DeadlineExceeded)
        }));
        failing.oneshot(call()).await.unwrap_err();

        let text = handle.render();
        assert!(
            text.contains(r#"grpc_unary_requests_total{grpc_service="pkg.echo",grpc_method="unaryecho",grpc_code="ok"} 2"#),
            "{text}"
        );
        assert!(
            text.contains(r#"grpc_code="deadline_exceeded"} 1"#),
            "{text}"
        );
        assert!(text.contains("grpc_unary_requests_duration_seconds"), "{text}");
        assert!(
            text.contains(r#"grpc_unary_requests_in_flight{grpc_service="pkg.echo",grpc_method="unaryecho"} 0"#),
            "{text}"
        );
    }

    #[tokio::test]
    async fn in_flight_gauge_tracks_running_calls() {
        let (metrics, handle) = local_metrics();
        let svc = MetricsLayer::new(metrics).layer(tower::service_fn(|_call: Call| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, RpcError>(Reply::new(Value::Null))
        }));

        let running = tokio::spawn(svc.oneshot(call()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle
            .render()
            .contains(r#"grpc_unary_requests_in_flight{grpc_service="pkg.echo",grpc_method="unaryecho"} 1"#));

        running.await.unwrap().unwrap();
        assert!(handle
            .render()
            .contains(r#"grpc_unary_requests_in_flight{grpc_service="pkg.echo",grpc_method="unaryecho"} 0"#));
    }

    #[test]
    fn dropped_reporter_releases_in_flight() {
        let (metrics, handle) = local_metrics();
        drop(metrics.start(&MethodName::parse("/a/b")));
        assert!(handle
            .render()
            .contains(r#"grpc_unary_requests_in_flight{grpc_service="a",grpc_method="b"} 0"#));
    }
}
