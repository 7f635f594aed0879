//! Fault recovery middleware.
//!
//! Traps panics raised while building or polling the inner future, and
//! faults re-raised by an inner stage as [`RpcError::Fault`]. Either way the
//! fault is logged with its stack trace and the caller gets a bare
//! `Internal` error; the fault value never reaches the client.

use std::task::{Context, Poll};

use tollgate_core::{catch_fault, catch_fault_sync, Fault};
use tower::{Layer, Service};
use tracing::Span;

use super::CallFuture;
use crate::service::call::{Call, Reply};
use crate::service::outcome::RpcError;

// ---------------------------------------------------------------------------
// RecoveryLayer
// ---------------------------------------------------------------------------

/// Tower layer that contains faults raised below it.
#[derive(Debug, Clone, Default)]
pub struct RecoveryLayer;

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService { inner }
    }
}

// ---------------------------------------------------------------------------
// RecoveryService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecoveryService<S> {
    inner: S,
}

impl<S> Service<Call> for RecoveryService<S>
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
        let logger = call.ctx().logger();
        let inner = &mut self.inner;

        let fut = match catch_fault_sync(|| inner.call(call)) {
            Ok(fut) => fut,
            Err(fault) => {
                return Box::pin(async move { Err(recover(&logger, &fault)) });
            }
        };

        Box::pin(async move {
            match catch_fault(fut).await {
                Ok(Err(RpcError::Fault(fault))) | Err(fault) => Err(recover(&logger, &fault)),
                Ok(result) => result,
            }
        })
    }
}

fn recover(logger: &Span, fault: &Fault) -> RpcError {
    logger.in_scope(|| {
        tracing::error!(
            stacktrace = fault.stacktrace(),
            error = fault.message(),
            "Caught panic in request"
        );
    });
    RpcError::Internal
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
