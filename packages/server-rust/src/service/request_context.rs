//! Per-call identity derived from inbound metadata.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use http::HeaderMap;
use uuid::Uuid;

use super::call::MethodName;
use super::config::EntryConfig;

/// Metadata keys read from and written to calls. Lookups are case-insensitive.
pub mod metadata_keys {
    /// Caller-supplied trace id; also propagated on outgoing calls.
    pub const TRACE_ID: &str = "trace-id";
    /// Generated request id, optionally echoed back in the response.
    pub const REQUEST_ID: &str = "request-id";
    pub const USER_AGENT: &str = "user-agent";
    pub const FORWARDED_FOR: &str = "x-forwarded-for";
    pub const REAL_IP: &str = "x-real-ip";
}

/// Identity of one call. Immutable once built.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    trace_id: String,
    remote_addr: String,
    user_agent: String,
    grpc_service: String,
    grpc_method: String,
    started_at: Instant,
}

impl RequestContext {
    /// Builds the identity for a call arriving now.
    ///
    /// The request id is always fresh. The trace id is the caller's only if
    /// `config` trusts caller trace ids and the supplied value is a valid
    /// UUID; otherwise it equals the request id.
    #[must_use]
    pub fn build(
        metadata: &HeaderMap,
        peer: Option<SocketAddr>,
        method: &MethodName,
        config: &EntryConfig,
    ) -> Self {
        let request_id = Uuid::new_v4().to_string();
        let trace_id = trace_id_from_metadata(metadata, config.allow_trace_id_from_request)
            .unwrap_or_else(|| request_id.clone());

        Self {
            trace_id,
            request_id,
            remote_addr: remote_addr(metadata, peer),
            user_agent: header_str(metadata, metadata_keys::USER_AGENT)
                .unwrap_or_default()
                .to_string(),
            grpc_service: method.service().to_string(),
            grpc_method: method.method().to_string(),
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Best-effort caller IP; empty when nothing parsed.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn grpc_service(&self) -> &str {
        &self.grpc_service
    }

    #[must_use]
    pub fn grpc_method(&self) -> &str {
        &self.grpc_method
    }

    /// Time elapsed since the call arrived.
    #[must_use]
    pub fn since(&self) -> Duration {
        self.started_at.elapsed()
    }
}

fn trace_id_from_metadata(metadata: &HeaderMap, trusted: bool) -> Option<String> {
    if !trusted {
        return None;
    }
    let candidate = header_str(metadata, metadata_keys::TRACE_ID)?;
    Uuid::parse_str(candidate).ok()?;
    Some(candidate.to_string())
}

/// Resolves the caller IP.
///
/// Order: first entry of `x-forwarded-for`, first entry of `x-real-ip`, then
/// the transport peer with its port stripped. The first candidate that
/// parses as an IP wins; an empty string when none does.
#[must_use]
pub fn remote_addr(metadata: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for key in [metadata_keys::FORWARDED_FOR, metadata_keys::REAL_IP] {
        let first = header_str(metadata, key).and_then(|v| v.split(',').next());
        if let Some(ip) = first.and_then(parse_ip) {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_canonical().to_string())
        .unwrap_or_default()
}

/// Parses a bare IP or an `ip:port` / `[ip]:port` pair.
fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .or_else(|_| raw.parse::<SocketAddr>().map(|addr| addr.ip()))
        .ok()
        .map(|ip| ip.to_canonical())
}

fn header_str<'a>(metadata: &'a HeaderMap, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
