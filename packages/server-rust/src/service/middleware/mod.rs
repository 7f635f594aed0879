//! Tower middleware layers for the call pipeline.
//!
//! - [`recovery`]: Converts faults into `Internal` errors
//! - [`logging`]: Attaches the per-call logger span
//! - [`entry`]: Builds the request identity
//! - [`geoip`]: Resolves the caller's location
//! - [`entry_logs`]: Emits the single completion record
//! - [`metrics`]: In-flight, total and latency metrics
//! - [`timeout`]: Races the handler against the call deadline
//! - [`pipeline`]: Composes all layers into a single service stack

use std::future::Future;
use std::pin::Pin;

use crate::service::call::Reply;
use crate::service::outcome::RpcError;

pub mod entry;
pub mod entry_logs;
pub mod geoip;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod recovery;
pub mod timeout;

/// Future returned by every pipeline stage.
pub type CallFuture = Pin<Box<dyn Future<Output = Result<Reply, RpcError>> + Send>>;

pub use entry::EntryLayer;
pub use entry_logs::EntryLogsLayer;
pub use geoip::GeoIpLayer;
pub use logging::LoggingLayer;
pub use metrics::{MetricsLayer, RpcMetrics};
pub use pipeline::{build_call_pipeline, CallPipeline, PipelineDeps};
pub use recovery::RecoveryLayer;
pub use timeout::TimeoutLayer;
