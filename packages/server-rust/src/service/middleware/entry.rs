//! Request identity middleware.
//!
//! Builds the [`RequestContext`] for the call, enriches the call logger with
//! it, propagates the trace id to outgoing metadata, and optionally echoes
//! the request id back to the caller.

use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::{HeaderName, HeaderValue};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use super::CallFuture;
use crate::service::call::{Call, Reply};
use crate::service::config::EntryConfig;
use crate::service::outcome::RpcError;
use crate::service::request_context::{metadata_keys, RequestContext};

// ---------------------------------------------------------------------------
// EntryLayer
// ---------------------------------------------------------------------------

/// Tower layer that builds per-call identity.
#[derive(Debug, Clone, Default)]
pub struct EntryLayer {
    config: EntryConfig,
}

impl EntryLayer {
    #[must_use]
    pub fn new(config: EntryConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for EntryLayer {
    type Service = EntryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EntryService {
            inner,
            config: self.config,
        }
    }
}

// ---------------------------------------------------------------------------
// EntryService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EntryService<S> {
    inner: S,
    config: EntryConfig,
}

impl<S> Service<Call> for EntryService<S>
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

    fn call(&mut self, mut call: Call) -> Self::Future {
        let request = Arc::new(RequestContext::build(
            call.metadata(),
            call.peer(),
            call.method(),
            &self.config,
        ));

        let span = info_span!(
            parent: &call.ctx().logger(),
            "request",
            request_id = request.request_id(),
            trace_id = request.trace_id(),
            remote_addr = request.remote_addr(),
            user_agent = request.user_agent(),
            grpc_service = request.grpc_service(),
            grpc_method = request.grpc_method(),
        );

        let ctx = call.ctx_mut();
        if self.config.return_request_id_in_header {
            if let Ok(value) = HeaderValue::from_str(request.request_id()) {
                ctx.set_response_header(HeaderName::from_static(metadata_keys::REQUEST_ID), value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(request.trace_id()) {
            ctx.outgoing_metadata_mut()
                .insert(HeaderName::from_static(metadata_keys::TRACE_ID), value);
        }
        ctx.set_logger(span.clone());
        ctx.set_request_context(request);

        Box::pin(self.inner.call(call).instrument(span))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
