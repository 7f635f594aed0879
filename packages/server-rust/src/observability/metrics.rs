//! Prometheus recorder construction.

use std::sync::Arc;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::service::middleware::metrics::DURATION_SECONDS;
use crate::service::RpcMetrics;

/// Latency buckets, in seconds, for the call duration histogram.
pub const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Builds a Prometheus recorder for the call pipeline.
///
/// The recorder is not installed globally: it is handed to [`RpcMetrics`]
/// and the returned handle renders the exposition text for `GET /metrics`.
///
/// # Errors
///
/// Returns an error if the bucket configuration is rejected.
pub fn prometheus_metrics() -> anyhow::Result<(RpcMetrics, PrometheusHandle)> {
    let recorder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_SECONDS.to_string()), &DEFAULT_BUCKETS)?
        .build_recorder();
    let handle = recorder.handle();
    Ok((RpcMetrics::new(Arc::new(recorder)), handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MethodName, OutcomeCode};

    #[test]
    fn renders_histogram_with_default_buckets() {
        let (metrics, handle) = prometheus_metrics().unwrap();
        let reporter = metrics.start(&MethodName::parse("/Pkg.Svc/Do"));
        reporter.handled(OutcomeCode::Ok);

        let text = handle.render();
        assert!(text.contains("grpc_unary_requests_duration_seconds_bucket"));
        assert!(text.contains(r#"le="0.005""#));
        assert!(text.contains(r#"grpc_service="pkg.svc""#));
    }
}
