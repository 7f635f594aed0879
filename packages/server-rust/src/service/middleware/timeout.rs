//! Timeout middleware for calls.
//!
//! The inner call runs in its own task, raced against the call deadline and
//! the caller's cancellation. Whichever finishes first decides the result:
//!
//! - handler done: its result is returned unchanged
//! - handler panicked: the fault is returned as [`RpcError::Fault`] for an
//!   enclosing recovery stage to report
//! - deadline fired: `Canceled` if the caller had already gone away,
//!   otherwise `DeadlineExceeded`
//!
//! A task that loses the race is detached, not aborted. It keeps running in
//! the background until it finishes on its own and its result is dropped.
//! There is no cleanup hook for it.

use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tollgate_core::{catch_fault, Fault};
use tower::{Layer, Service};
use tracing::{Instrument, Span};

use super::CallFuture;
use crate::service::call::{Call, Reply};
use crate::service::outcome::RpcError;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that enforces the per-call deadline.
#[derive(Debug, Clone)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    /// A zero `timeout` runs the inner call directly, without a deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout: self.timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<Call> for TimeoutService<S>
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
        let cancellation = call.ctx().cancellation().clone();
        let timeout = self.timeout;

        if cancellation.is_cancelled() {
            logger.in_scope(|| {
                tracing::warn!(error = "context canceled", "Caught canceled before processing the request");
            });
            return Box::pin(async { Err(RpcError::Canceled) });
        }

        if timeout.is_zero() {
            return Box::pin(self.inner.call(call));
        }

        let started = Instant::now();
        let fut = self.inner.call(call);

        Box::pin(async move {
            let mut handle = tokio::spawn(catch_fault(fut).instrument(logger.clone()));

            tokio::select! {
                biased;

                joined = &mut handle => match joined {
                    Ok(Ok(result)) => result,
                    Ok(Err(fault)) => Err(RpcError::Fault(fault)),
                    Err(err) if err.is_panic() => Err(RpcError::Fault(Fault::from_panic(err.into_panic()))),
                    Err(_) => Err(RpcError::Internal),
                },
                () = cancellation.cancelled() => {
                    warn_elapsed(&logger, "context canceled", "Caught canceled while processing the request", timeout, started);
                    Err(RpcError::Canceled)
                }
                () = tokio::time::sleep(timeout) => {
                    if cancellation.is_cancelled() {
                        warn_elapsed(&logger, "context canceled", "Caught canceled while processing the request", timeout, started);
                        Err(RpcError::Canceled)
                    } else {
                        warn_elapsed(&logger, "context deadline exceeded", "Caught timeout while processing the request", timeout, started);
                        Err(RpcError::DeadlineExceeded)
                    }
                }
            }
        })
    }
}

fn warn_elapsed(logger: &Span, error: &str, message: &str, timeout: Duration, started: Instant) {
    let duration = started.elapsed().as_secs_f64();
    logger.in_scope(|| {
        tracing::warn!(error, timeout = timeout.as_secs_f64(), duration, "{message}");
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
