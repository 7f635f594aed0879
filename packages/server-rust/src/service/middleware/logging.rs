//! Logger propagation middleware.
//!
//! Installs a per-call child of a configured base span as the call's logger.
//! Later stages replace it with enriched children; everything the call logs
//! happens inside it.

use std::task::{Context, Poll};

use tower::{Layer, Service};
use tracing::{info_span, Instrument, Span};

use super::CallFuture;
use crate::service::call::{Call, Reply};
use crate::service::outcome::RpcError;

/// Tower layer that attaches the call logger.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    base: Span,
}

impl LoggingLayer {
    /// `base` carries process-wide fields such as service name and environment.
    #[must_use]
    pub fn new(base: Span) -> Self {
        Self { base }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            base: self.base.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
    base: Span,
}

impl<S> Service<Call> for LoggingService<S>
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
        let span = info_span!(parent: &self.base, "call");
        call.ctx_mut().set_logger(span.clone());
        Box::pin(self.inner.call(call).instrument(span))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::service::call::MethodName;
    use crate::test_support::{field, CapturedLogs};

    #[tokio::test]
    async fn handler_logs_carry_base_fields() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let base = info_span!("service", service = "echo", env = "test");
        let svc = LoggingLayer::new(base).layer(tower::service_fn(|call: Call| async move {
            call.ctx().logger().in_scope(|| tracing::info!("inside handler"));
            Ok::<_, RpcError>(Reply::new(Value::Null))
        }));

        svc.oneshot(Call::new(MethodName::parse("/svc/M"), Value::Null))
            .await
            .unwrap();

        let records = logs.with_message("inside handler");
        assert_eq!(records.len(), 1);
        assert_eq!(field(&records[0], "service").unwrap(), "echo");
        assert_eq!(field(&records[0], "env").unwrap(), "test");
    }

    #[test]
    fn logger_falls_back_to_disabled_span() {
        let call = Call::new(MethodName::parse("/svc/M"), Value::Null);
        assert!(call.ctx().logger().is_none());
    }
}
