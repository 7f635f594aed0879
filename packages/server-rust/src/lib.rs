//! `Tollgate` Server: unary call interceptor pipeline, monitoring endpoints,
//! and a JSON-over-HTTP call transport on axum.

pub mod config;
pub mod network;
pub mod observability;
pub mod service;

pub use config::ServerConfig;
pub use network::{NetworkConfig, NetworkModule, ShutdownController};
pub use service::{build_call_pipeline, Call, CallPipeline, MethodRouter, PipelineConfig, PipelineDeps, Reply, RpcError};

#[cfg(test)]
mod test_support;
