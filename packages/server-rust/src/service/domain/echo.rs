//! Echo service: replies with the message it was sent.

use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::Service;

use crate::service::call::{Call, MethodName, Reply};
use crate::service::middleware::CallFuture;
use crate::service::outcome::RpcError;
use crate::service::router::MethodRouter;

/// Full method name of the unary echo call.
pub const UNARY_ECHO: &str = "/grpc.examples.echo.Echo/UnaryEcho";

/// Messages this long or longer are rejected.
pub const MAX_MESSAGE_LENGTH: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoMessage {
    #[serde(default)]
    pub message: String,
}

/// Handles [`UNARY_ECHO`].
#[derive(Debug, Clone, Default)]
pub struct EchoService;

impl EchoService {
    fn unary_echo(call: &Call) -> Result<EchoMessage, RpcError> {
        let request = EchoMessage::deserialize(call.payload())
            .map_err(|err| RpcError::InvalidArgument(format!("invalid echo request: {err}")))?;

        let length = request.message.chars().count();
        if length >= MAX_MESSAGE_LENGTH {
            return Err(RpcError::InvalidArgument("Message is too long".to_string()));
        }

        if let Err(err) = call.ctx().append_field("message_length", length) {
            call.ctx()
                .logger()
                .in_scope(|| tracing::debug!(error = %err, "message length not recorded"));
        }

        Ok(request)
    }
}

impl Service<Call> for EchoService {
    type Response = Reply;
    type Error = RpcError;
    type Future = CallFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let result = Self::unary_echo(&call).and_then(|reply| {
            serde_json::to_value(reply)
                .map(Reply::new)
                .map_err(|err| RpcError::Other(err.into()))
        });
        Box::pin(async move { result })
    }
}

/// Registers the echo methods on `router`.
#[must_use]
pub fn register(router: MethodRouter) -> MethodRouter {
    router.route(&MethodName::parse(UNARY_ECHO), EchoService)
}

/// Convenience for tests and clients: an echo request payload.
#[must_use]
pub fn echo_request(message: &str) -> Value {
    serde_json::json!({ "message": message })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::service::entry_fields::EntryFields;

    fn call(payload: Value) -> Call {
        Call::new(MethodName::parse(UNARY_ECHO), payload)
    }

    #[tokio::test]
    async fn echoes_the_message() {
        let reply = EchoService.oneshot(call(echo_request("hello"))).await.unwrap();
        assert_eq!(reply.payload, json!({"message": "hello"}));
    }

    #[tokio::test]
    async fn rejects_long_messages() {
        let long = "x".repeat(MAX_MESSAGE_LENGTH);
        let err = EchoService.oneshot(call(echo_request(&long))).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidArgument(ref m) if m == "Message is too long"));

        let just_fits = "x".repeat(MAX_MESSAGE_LENGTH - 1);
        assert!(EchoService.oneshot(call(echo_request(&just_fits))).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_non_string_messages() {
        let err = EchoService.oneshot(call(json!({"message": 42}))).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn missing_message_echoes_empty() {
        let reply = EchoService.oneshot(call(json!({}))).await.unwrap();
        assert_eq!(reply.payload, json!({"message": ""}));
    }

    #[tokio::test]
    async fn records_message_length_when_in_scope() {
        let fields = EntryFields::new();
        let mut call = call(echo_request("four"));
        call.ctx_mut().set_entry_fields(fields.clone());

        EchoService.oneshot(call).await.unwrap();
        assert_eq!(fields.snapshot()["message_length"], 4);
    }
}
