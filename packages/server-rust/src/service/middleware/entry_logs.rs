//! Completion record middleware.
//!
//! Opens the call's extra-field set on the way in and emits exactly one
//! record on the way out: `Request completed` at info, or `Request
//! completed with error` at error. Kept apart from the entry stage so that
//! stages running between the two can contribute fields to the record.

use std::task::{Context, Poll};

use serde_json::{Map, Value};
use tower::{Layer, Service};

use super::CallFuture;
use crate::service::call::{Call, Reply};
use crate::service::config::EntryLogsConfig;
use crate::service::entry_fields::EntryFields;
use crate::service::outcome::{OutcomeCode, RpcError};

// ---------------------------------------------------------------------------
// EntryLogsLayer
// ---------------------------------------------------------------------------

/// Tower layer that logs one record per completed call.
#[derive(Debug, Clone, Default)]
pub struct EntryLogsLayer {
    config: EntryLogsConfig,
}

impl EntryLogsLayer {
    #[must_use]
    pub fn new(config: EntryLogsConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for EntryLogsLayer {
    type Service = EntryLogsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EntryLogsService {
            inner,
            config: self.config,
        }
    }
}

// ---------------------------------------------------------------------------
// EntryLogsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EntryLogsService<S> {
    inner: S,
    config: EntryLogsConfig,
}

impl<S> Service<Call> for EntryLogsService<S>
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
        let mut seed = Map::new();
        if let Some(geoip) = call.ctx().geoip() {
            seed.insert("geoip".into(), Value::Object(geoip.fields()));
        }
        let fields = EntryFields::from_map(seed);
        call.ctx_mut().set_entry_fields(fields.clone());

        let request = call.request_context();
        let logger = call.ctx().logger();
        let request_object = self
            .config
            .log_request
            .then(|| serde_json::to_string(call.payload()).unwrap_or_default());
        let log_response = self.config.log_response;

        let fut = self.inner.call(call);

        Box::pin(async move {
            let result = fut.await;

            let code = OutcomeCode::of(&result);
            let extra = fields.snapshot();
            let extra_fields = (!extra.is_empty()).then(|| Value::Object(extra).to_string());
            let response_object = match (&result, log_response) {
                (Ok(reply), true) => Some(serde_json::to_string(&reply.payload).unwrap_or_default()),
                (Err(_), true) => Some("null".to_string()),
                (_, false) => None,
            };

            logger.in_scope(|| match &result {
                Ok(_) => tracing::info!(
                    duration = request.since().as_secs_f64(),
                    response_status = code.value(),
                    response_status_string = code.name(),
                    extra_fields,
                    request_object,
                    response_object,
                    "Request completed"
                ),
                Err(err) => tracing::error!(
                    duration = request.since().as_secs_f64(),
                    response_status = code.value(),
                    response_status_string = code.name(),
                    extra_fields,
                    request_object,
                    response_object,
                    error = %err,
                    "Request completed with error"
                ),
            });

            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
