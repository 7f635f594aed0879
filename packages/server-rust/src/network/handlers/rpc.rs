//! JSON-over-HTTP call transport.
//!
//! `POST /{service}/{method}` with a JSON body becomes one [`Call`] through
//! the call pipeline. Request headers become inbound metadata and the
//! socket peer becomes the call's peer address.
//!
//! The call runs on its own task. If the client disconnects, axum drops the
//! handler future, which cancels the call's token; the task still finishes
//! the call so the pipeline reports it as `Canceled`.

use std::net::SocketAddr;

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use super::RpcState;
use crate::network::LifecycleState;
use crate::service::{Call, CallContext, MethodName, OutcomeCode, RpcError};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Non-standard status used by proxies for "client closed request".
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Body of every non-200 transport response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Snake-case outcome code, e.g. `invalid_argument`.
    pub code: String,
    pub message: String,
}

/// HTTP status reported for a call outcome.
#[must_use]
pub fn status_for(code: OutcomeCode) -> StatusCode {
    match code {
        OutcomeCode::Ok => StatusCode::OK,
        OutcomeCode::Canceled => {
            StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
        }
        OutcomeCode::InvalidArgument | OutcomeCode::FailedPrecondition | OutcomeCode::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        OutcomeCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        OutcomeCode::NotFound => StatusCode::NOT_FOUND,
        OutcomeCode::AlreadyExists | OutcomeCode::Aborted => StatusCode::CONFLICT,
        OutcomeCode::PermissionDenied => StatusCode::FORBIDDEN,
        OutcomeCode::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        OutcomeCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        OutcomeCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        OutcomeCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        OutcomeCode::Unknown | OutcomeCode::Internal | OutcomeCode::DataLoss => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: &RpcError, headers: HeaderMap) -> Response {
    let code = err.code();
    let body = ErrorBody {
        code: code.label().to_string(),
        message: err.to_string(),
    };
    (status_for(code), headers, Json(body)).into_response()
}

fn decode_payload(bytes: &[u8]) -> Result<Value, RpcError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(bytes)
        .map_err(|err| RpcError::InvalidArgument(format!("invalid JSON payload: {err}")))
}

/// Runs one call through the pipeline.
pub async fn rpc_handler(
    State(state): State<RpcState>,
    Path((service, method)): Path<(String, String)>,
    request: Request,
) -> Response {
    if matches!(state.shutdown.state(), LifecycleState::Draining | LifecycleState::Stopped) {
        return error_response(
            &RpcError::Unavailable("server is shutting down".to_string()),
            HeaderMap::new(),
        );
    }
    let in_flight = state.shutdown.in_flight_guard();

    let (parts, body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let payload = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => decode_payload(&bytes),
        Err(err) => Err(RpcError::InvalidArgument(format!("cannot read request body: {err}"))),
    };
    let payload = match payload {
        Ok(payload) => payload,
        Err(err) => return error_response(&err, HeaderMap::new()),
    };

    let token = CancellationToken::new();
    let cancel_on_disconnect = token.clone().drop_guard();
    let ctx = CallContext::new(token);
    let response_headers = ctx.response_metadata_handle();

    let mut call = Call::new(MethodName::new(service, method), payload)
        .with_metadata(parts.headers)
        .with_context(ctx);
    if let Some(peer) = peer {
        call = call.with_peer(peer);
    }

    let pipeline = state.pipeline;
    let call_task = tokio::spawn(async move {
        let _in_flight = in_flight;
        pipeline.oneshot(call).await
    });
    // Faults are contained by the pipeline; a join error means the runtime is going away.
    let result = call_task.await.unwrap_or_else(|_| Err(RpcError::Internal));
    cancel_on_disconnect.disarm();

    let headers = response_headers.lock().clone();
    match result {
        Ok(reply) => (StatusCode::OK, headers, Json(reply.payload)).into_response(),
        Err(err) => error_response(&err, headers),
    }
}
