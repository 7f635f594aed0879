//! The unit of work flowing through the call pipeline.
//!
//! A [`Call`] carries the inbound request plus a [`CallContext`]: the typed,
//! call-scoped state that pipeline stages fill in on the way down and read
//! on the way back up. Every accessor documents what it returns when the
//! owning stage was not chained.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use super::config::EntryConfig;
use super::entry_fields::{EntryFields, EntryFieldsError};
use super::geoip::GeoIpResult;
use super::request_context::{metadata_keys, remote_addr, RequestContext};

/// Service name used when a full method name has no `/` separator.
pub const UNKNOWN_SERVICE: &str = "unknown";

// ---------------------------------------------------------------------------
// MethodName
// ---------------------------------------------------------------------------

/// A full RPC method name, `/package.Service/Method`, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodName {
    service: String,
    method: String,
}

impl MethodName {
    #[must_use]
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    /// Splits at the first `/` after the optional leading slash.
    ///
    /// Without a separator the whole name is the method and the service is
    /// [`UNKNOWN_SERVICE`].
    #[must_use]
    pub fn parse(full: &str) -> Self {
        let trimmed = full.strip_prefix('/').unwrap_or(full);
        match trimmed.split_once('/') {
            Some((service, method)) => Self::new(service, method),
            None => Self::new(UNKNOWN_SERVICE, trimmed),
        }
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The canonical `/service/method` form, used as the routing key.
    #[must_use]
    pub fn full(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Call-scoped state threaded through every pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
    logger: Option<Span>,
    request: Option<Arc<RequestContext>>,
    entry_fields: Option<EntryFields>,
    geoip: Option<Arc<GeoIpResult>>,
    outgoing: HeaderMap,
    response_metadata: Arc<Mutex<HeaderMap>>,
}

impl CallContext {
    #[must_use]
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            ..Self::default()
        }
    }

    /// Cancelled when the caller goes away.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The call's logger span; [`Span::none`] before the logging stage ran.
    #[must_use]
    pub fn logger(&self) -> Span {
        self.logger.clone().unwrap_or_else(Span::none)
    }

    pub fn set_logger(&mut self, span: Span) {
        self.logger = Some(span);
    }

    /// The request identity, if the entry stage ran.
    ///
    /// See [`Call::request_context`] for the variant that never fails.
    #[must_use]
    pub fn request_context(&self) -> Option<&Arc<RequestContext>> {
        self.request.as_ref()
    }

    pub fn set_request_context(&mut self, request: Arc<RequestContext>) {
        self.request = Some(request);
    }

    /// The completion record's extra-field set.
    ///
    /// # Errors
    ///
    /// Returns [`EntryFieldsError::NotInScope`] if the entry logs stage did not run.
    pub fn entry_fields(&self) -> Result<&EntryFields, EntryFieldsError> {
        self.entry_fields.as_ref().ok_or(EntryFieldsError::NotInScope)
    }

    pub fn set_entry_fields(&mut self, fields: EntryFields) {
        self.entry_fields = Some(fields);
    }

    /// Appends one field to the completion record.
    ///
    /// # Errors
    ///
    /// [`EntryFieldsError::NotInScope`] outside an entry logs scope, or
    /// [`EntryFieldsError::ReservedField`] for a reserved key.
    pub fn append_field(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), EntryFieldsError> {
        self.entry_fields()?.insert(key, value)
    }

    /// Appends several fields to the completion record, all or none.
    ///
    /// # Errors
    ///
    /// Same as [`append_field`](Self::append_field).
    pub fn append_fields<I, K, V>(&self, fields: I) -> Result<(), EntryFieldsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.entry_fields()?.extend(fields)
    }

    /// The geoip result, if the geoip stage ran.
    ///
    /// See [`Call::geoip`] for the variant that never fails.
    #[must_use]
    pub fn geoip(&self) -> Option<&Arc<GeoIpResult>> {
        self.geoip.as_ref()
    }

    pub fn set_geoip(&mut self, result: GeoIpResult) {
        self.geoip = Some(Arc::new(result));
    }

    /// Metadata to attach to calls this handler makes to other services.
    #[must_use]
    pub fn outgoing_metadata(&self) -> &HeaderMap {
        &self.outgoing
    }

    pub fn outgoing_metadata_mut(&mut self) -> &mut HeaderMap {
        &mut self.outgoing
    }

    /// Trace id propagated to outgoing calls; empty if none was set.
    #[must_use]
    pub fn outgoing_trace_id(&self) -> &str {
        self.outgoing
            .get(metadata_keys::TRACE_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// Sets a header on the response. Survives error returns.
    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response_metadata.lock().insert(name, value);
    }

    /// Copy of the headers set for the response so far.
    #[must_use]
    pub fn response_metadata(&self) -> HeaderMap {
        self.response_metadata.lock().clone()
    }

    /// Shared handle to the response headers, for the transport to read after the call.
    #[must_use]
    pub fn response_metadata_handle(&self) -> Arc<Mutex<HeaderMap>> {
        Arc::clone(&self.response_metadata)
    }
}

// ---------------------------------------------------------------------------
// Call / Reply
// ---------------------------------------------------------------------------

/// One inbound call.
#[derive(Debug, Clone)]
pub struct Call {
    method: MethodName,
    metadata: HeaderMap,
    peer: Option<SocketAddr>,
    payload: Value,
    ctx: CallContext,
}

impl Call {
    #[must_use]
    pub fn new(method: MethodName, payload: Value) -> Self {
        Self {
            method,
            metadata: HeaderMap::new(),
            peer: None,
            payload,
            ctx: CallContext::default(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: HeaderMap) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    #[must_use]
    pub fn with_context(mut self, ctx: CallContext) -> Self {
        self.ctx = ctx;
        self
    }

    #[must_use]
    pub fn method(&self) -> &MethodName {
        &self.method
    }

    /// Inbound metadata; lookups are case-insensitive.
    #[must_use]
    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    #[must_use]
    pub fn ctx(&self) -> &CallContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut CallContext {
        &mut self.ctx
    }

    /// The request identity set by the entry stage, or one built from this
    /// call's metadata with default (untrusting) config.
    #[must_use]
    pub fn request_context(&self) -> Arc<RequestContext> {
        match self.ctx.request_context() {
            Some(request) => Arc::clone(request),
            None => Arc::new(RequestContext::build(
                &self.metadata,
                self.peer,
                &self.method,
                &EntryConfig::default(),
            )),
        }
    }

    /// The geoip result set by the geoip stage, or an error result.
    #[must_use]
    pub fn geoip(&self) -> Arc<GeoIpResult> {
        match self.ctx.geoip() {
            Some(result) => Arc::clone(result),
            None => Arc::new(GeoIpResult::failed(
                remote_addr(&self.metadata, self.peer),
                "cannot find geoip data in the call context",
            )),
        }
    }
}

/// A successful call result.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub payload: Value,
}

impl Reply {
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}
