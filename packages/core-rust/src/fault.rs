//! Fault capture: turns panics into values that can cross task boundaries.
//!
//! A process-wide panic hook records a backtrace at the panic site into a
//! thread-local slot. [`catch_fault`] and [`catch_fault_sync`] trap the unwind,
//! then pair the panic payload with that backtrace. Because the hook runs
//! before unwinding starts, the recorded trace points at the code that
//! panicked rather than at the trap.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures_util::FutureExt;

thread_local! {
    static LAST_PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_CAPTURE: Once = Once::new();

/// Installs the backtrace-recording panic hook. Idempotent.
///
/// The previously installed hook is chained, so default panic reporting
/// keeps working.
pub fn install_panic_capture() {
    PANIC_CAPTURE.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            LAST_PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

// ---------------------------------------------------------------------------
// Fault
// ---------------------------------------------------------------------------

/// An unhandled panic, captured as a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Fault {
    message: String,
    stacktrace: String,
}

impl Fault {
    /// Builds a fault from a panic payload, taking the backtrace recorded by
    /// the panic hook on this thread.
    ///
    /// Falls back to a backtrace of the current stack if the hook did not
    /// record one (hook not installed, or the payload came from another thread).
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        let stacktrace = LAST_PANIC_TRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| Backtrace::force_capture().to_string());
        Self {
            message,
            stacktrace,
        }
    }

    /// The panic value rendered as text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backtrace captured when the panic was raised.
    #[must_use]
    pub fn stacktrace(&self) -> &str {
        &self.stacktrace
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

// ---------------------------------------------------------------------------
// Traps
// ---------------------------------------------------------------------------

/// Polls `fut` to completion, converting a panic into `Err(Fault)`.
///
/// # Errors
///
/// Returns the captured [`Fault`] if polling the future panicked.
pub async fn catch_fault<F: Future>(fut: F) -> Result<F::Output, Fault> {
    install_panic_capture();
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(Fault::from_panic)
}

/// Runs `f`, converting a panic into `Err(Fault)`.
///
/// # Errors
///
/// Returns the captured [`Fault`] if `f` panicked.
pub fn catch_fault_sync<R>(f: impl FnOnce() -> R) -> Result<R, Fault> {
    install_panic_capture();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Fault::from_panic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explode(message: &str) {
        panic!("{}", message.to_string());
    }

    #[test]
    fn sync_trap_passes_through_values() {
        let value = catch_fault_sync(|| 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn sync_trap_captures_string_payload() {
        let fault = catch_fault_sync(|| explode("boom")).unwrap_err();
        assert_eq!(fault.message(), "boom");
        assert!(!fault.stacktrace().is_empty());
    }

    #[test]
    fn static_str_payload_is_rendered() {
        let fault = catch_fault_sync(|| std::panic::panic_any("static")).unwrap_err();
        assert_eq!(fault.message(), "static");
    }

    #[test]
    fn opaque_payload_is_rendered_generically() {
        let fault = catch_fault_sync(|| std::panic::panic_any(42_u32)).unwrap_err();
        assert_eq!(fault.message(), "Box<dyn Any>");
    }

    #[tokio::test]
    async fn async_trap_captures_panic_inside_future() {
        let result = catch_fault(async {
            tokio::task::yield_now().await;
            explode("later");
        })
        .await;

        let fault = result.unwrap_err();
        assert_eq!(fault.to_string(), "later");
        assert!(!fault.stacktrace().is_empty());
    }

    #[tokio::test]
    async fn async_trap_passes_through_output() {
        let result = catch_fault(async { "done" }).await;
        assert_eq!(result.unwrap(), "done");
    }

    #[test]
    fn recorded_trace_is_consumed_once() {
        let _ = catch_fault_sync(|| explode("first"));
        let slot_empty = LAST_PANIC_TRACE.with(|slot| slot.borrow().is_none());
        assert!(slot_empty);
    }
}
