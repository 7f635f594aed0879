//! Caller geo location middleware.
//!
//! Looks up the request's remote address and stores the [`GeoIpResult`] in
//! the call context. A missing lookup, an unparsable address, or a failed
//! lookup all produce an error result; the call always proceeds.

use std::net::IpAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::Value;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use super::CallFuture;
use crate::service::call::{Call, Reply};
use crate::service::geoip::{GeoIpLookup, GeoIpResult};
use crate::service::outcome::RpcError;

// ---------------------------------------------------------------------------
// GeoIpLayer
// ---------------------------------------------------------------------------

/// Tower layer that resolves the caller's location.
#[derive(Clone, Default)]
pub struct GeoIpLayer {
    lookup: Option<Arc<dyn GeoIpLookup>>,
}

impl GeoIpLayer {
    /// `None` records "geoip database is not configured" for every call.
    #[must_use]
    pub fn new(lookup: Option<Arc<dyn GeoIpLookup>>) -> Self {
        Self { lookup }
    }
}

impl std::fmt::Debug for GeoIpLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoIpLayer")
            .field("configured", &self.lookup.is_some())
            .finish()
    }
}

impl<S> Layer<S> for GeoIpLayer {
    type Service = GeoIpService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GeoIpService {
            inner,
            lookup: self.lookup.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// GeoIpService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct GeoIpService<S> {
    inner: S,
    lookup: Option<Arc<dyn GeoIpLookup>>,
}

impl<S> Service<Call> for GeoIpService<S>
where
    S: Service<Call, Response = Reply, Error = RpcError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Reply;
    type Error = RpcError;
    type Future = CallFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut call: Call) -> Self::Future {
        // The ready clone stays with this call; the fresh clone waits for the next poll_ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let lookup = self.lookup.clone();

        Box::pin(async move {
            let remote_addr = call.request_context().remote_addr().to_string();
            let result = resolve(lookup.as_deref(), remote_addr).await;

            let fields = Value::Object(result.fields());
            let span = info_span!(
                parent: &call.ctx().logger(),
                "geoip",
                geoip = %fields,
            );

            let ctx = call.ctx_mut();
            ctx.set_geoip(result);
            ctx.set_logger(span.clone());

            inner.call(call).instrument(span).await
        })
    }
}

async fn resolve(lookup: Option<&dyn GeoIpLookup>, remote_addr: String) -> GeoIpResult {
    let Some(lookup) = lookup else {
        return GeoIpResult::failed(remote_addr, "geoip database is not configured");
    };
    let ip = match remote_addr.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(err) => {
            return GeoIpResult::failed(remote_addr, format!("invalid remote address: {err}"));
        }
    };
    match lookup.lookup(ip).await {
        Ok(location) => GeoIpResult::found(remote_addr, location),
        Err(err) => GeoIpResult::failed(remote_addr, format!("{err:#}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
