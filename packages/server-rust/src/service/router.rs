//! Method routing: dispatches a `Call` to its handler by full method name.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

use super::call::{Call, MethodName, Reply};
use super::middleware::CallFuture;
use super::outcome::{OutcomeCode, RpcError};

/// A type-erased handler for one method.
pub type MethodHandler = BoxCloneSyncService<Call, Reply, RpcError>;

// ---------------------------------------------------------------------------
// MethodRouter
// ---------------------------------------------------------------------------

/// Routes calls to handlers keyed by `/service/method`.
///
/// Cloning is cheap; clones share the route table. Calls to unregistered
/// methods fail with `Unimplemented`.
#[derive(Clone, Default)]
pub struct MethodRouter {
    routes: Arc<HashMap<String, MethodHandler>>,
}

impl MethodRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method`, replacing any earlier registration.
    #[must_use]
    pub fn route<S>(mut self, method: &MethodName, handler: S) -> Self
    where
        S: Service<Call, Response = Reply, Error = RpcError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Arc::make_mut(&mut self.routes).insert(method.full(), BoxCloneSyncService::new(handler));
        self
    }

    /// Registers an async function as the handler for `method`.
    #[must_use]
    pub fn route_fn<F, Fut>(self, method: &MethodName, f: F) -> Self
    where
        F: Fn(Call) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, RpcError>> + Send + 'static,
    {
        self.route(method, tower::service_fn(f))
    }

    /// Registered methods, in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, method: &MethodName) -> bool {
        self.routes.contains_key(&method.full())
    }
}

impl std::fmt::Debug for MethodRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRouter")
            .field("methods", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Service<Call> for MethodRouter {
    type Response = Reply;
    type Error = RpcError;
    type Future = CallFuture;

    // Handlers are driven to readiness per call in `call`.
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let full = call.method().full();
        match self.routes.get(&full) {
            Some(handler) => Box::pin(handler.clone().oneshot(call)),
            None => Box::pin(async move {
                Err(RpcError::status(
                    OutcomeCode::Unimplemented,
                    format!("unknown method {full}"),
                ))
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    /// A simple stub service that replies with its own name.
    #[derive(Clone)]
    struct StubService {
        name: &'static str,
    }

    impl Service<Call> for StubService {
        type Response = Reply;
        type Error = RpcError;
        type Future = CallFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _call: Call) -> Self::Future {
            let name = self.name;
            Box::pin(async move { Ok(Reply::new(json!(name))) })
        }
    }

    fn call(method: &str) -> Call {
        Call::new(MethodName::parse(method), Value::Null)
    }

    #[tokio::test]
    async fn routes_to_registered_service() {
        let router = MethodRouter::new()
            .route(&MethodName::parse("/a.Svc/One"), StubService { name: "one" })
            .route(&MethodName::parse("/a.Svc/Two"), StubService { name: "two" });

        let reply = router.clone().oneshot(call("/a.Svc/Two")).await.unwrap();
        assert_eq!(reply.payload, json!("two"));
        let reply = router.oneshot(call("a.Svc/One")).await.unwrap();
        assert_eq!(reply.payload, json!("one"));
    }

    #[tokio::test]
    async fn async_fn_handlers_are_supported() {
        let router = MethodRouter::new().route_fn(&MethodName::parse("/a.Svc/Echo"), |call: Call| async move {
            Ok(Reply::new(call.payload().clone()))
        });
        let reply = router
            .oneshot(Call::new(MethodName::parse("/a.Svc/Echo"), json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(reply.payload, json!({"x": 1}));
    }

    #[tokio::test]
    async fn unknown_method_is_unimplemented() {
        let router = MethodRouter::new().route(&MethodName::parse("/a.Svc/One"), StubService { name: "one" });
        assert!(router.contains(&MethodName::parse("/a.Svc/One")));
        assert_eq!(router.methods().count(), 1);

        let err = router.oneshot(call("/a.Svc/Nope")).await.unwrap_err();
        assert_eq!(err.code(), OutcomeCode::Unimplemented);
        assert_eq!(err.to_string(), "unknown method /a.Svc/Nope");
    }
}
