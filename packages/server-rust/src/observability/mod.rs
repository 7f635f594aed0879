//! Process-wide observability setup: the `tracing` subscriber and the
//! Prometheus recorder behind [`RpcMetrics`](crate::service::RpcMetrics).

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{prometheus_metrics, DEFAULT_BUCKETS};
