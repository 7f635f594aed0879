//! Business services served through the call pipeline.

pub mod echo;

pub use echo::{EchoService, UNARY_ECHO};

use crate::service::router::MethodRouter;

/// Router with every built-in service registered.
#[must_use]
pub fn default_router() -> MethodRouter {
    echo::register(MethodRouter::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::call::MethodName;

    #[test]
    fn default_router_serves_echo() {
        let router = default_router();
        assert!(router.contains(&MethodName::parse(UNARY_ECHO)));
    }
}
