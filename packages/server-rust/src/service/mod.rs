//! Call processing framework.
//!
//! This module implements the interceptor pipeline every inbound call runs through:
//!
//! 1. **Call model** (`call`, `request_context`, `entry_fields`, `geoip`): the call and its typed state
//! 2. **Middleware** (`middleware`): Tower layers (recovery, logging, entry, geoip, completion logs, metrics, timeout)
//! 3. **Routing** (`router`): Dispatch to handlers by full method name
//! 4. **Domain services** (`domain`): The business handlers

pub mod call;
pub mod config;
pub mod domain;
pub mod entry_fields;
pub mod geoip;
pub mod middleware;
pub mod outcome;
pub mod request_context;
pub mod router;

// Re-export key types for convenient access.
pub use call::{Call, CallContext, MethodName, Reply};
pub use config::{EntryConfig, EntryLogsConfig, PipelineConfig};
pub use entry_fields::{EntryFields, EntryFieldsError, RESERVED_FIELDS};
pub use geoip::{GeoIpLookup, GeoIpResult, Location};
pub use middleware::{build_call_pipeline, CallPipeline, PipelineDeps, RpcMetrics};
pub use outcome::{OutcomeCode, RpcError};
pub use request_context::{metadata_keys, RequestContext};
pub use router::MethodRouter;
