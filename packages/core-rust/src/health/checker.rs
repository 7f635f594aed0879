//! Concurrent health-check runner.
//!
//! Every registered check runs in its own task under its own timeout and
//! fault trap. A slow, failing, or panicking check only affects its own
//! entry in the report.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use super::report::{CheckOutcome, CheckReport, RuntimeInfo};
use super::state::CheckResult;
use crate::fault::catch_fault;

/// Per-check timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// HealthCheck
// ---------------------------------------------------------------------------

/// One independent health probe.
///
/// The token is cancelled when the check's own timeout fires or the caller
/// of the run goes away; long-running checks should watch it.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, cancel: CancellationToken) -> anyhow::Result<CheckResult>;
}

/// Adapter turning an async closure into a [`HealthCheck`].
pub struct FnCheck<F>(F);

#[async_trait]
impl<F, Fut> HealthCheck for FnCheck<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CheckResult>> + Send + 'static,
{
    async fn check(&self, cancel: CancellationToken) -> anyhow::Result<CheckResult> {
        (self.0)(cancel).await
    }
}

/// Wraps an async closure as a check.
pub fn check_fn<F, Fut>(f: F) -> FnCheck<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CheckResult>> + Send + 'static,
{
    FnCheck(f)
}

// ---------------------------------------------------------------------------
// HealthChecker
// ---------------------------------------------------------------------------

/// Settings for a [`HealthChecker`].
#[derive(Debug, Clone, Default)]
pub struct HealthCheckerConfig {
    /// Host name reported in the runtime block. `None` reads `HOSTNAME`.
    pub host: Option<String>,
    /// Per-check timeout. Zero means [`DEFAULT_TIMEOUT`].
    pub timeout: Duration,
    pub service: String,
    pub environment: String,
    pub version: String,
}

struct NamedCheck {
    name: String,
    check: Arc<dyn HealthCheck>,
}

/// Holds a named, ordered set of checks and runs them concurrently.
pub struct HealthChecker {
    timeout: Duration,
    runtime: RuntimeInfo,
    checks: Vec<NamedCheck>,
}

impl HealthChecker {
    #[must_use]
    pub fn new(config: HealthCheckerConfig) -> Self {
        let timeout = if config.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            config.timeout
        };

        Self {
            timeout,
            runtime: RuntimeInfo {
                host: config
                    .host
                    .unwrap_or_else(|| std::env::var("HOSTNAME").unwrap_or_default()),
                rust_version: env!("TOLLGATE_RUSTC_VERSION").to_string(),
                service: config.service,
                environment: config.environment,
                version: config.version,
            },
            checks: Vec::new(),
        }
    }

    /// Registers a check. Checks are reported in registration order.
    pub fn add_check(&mut self, name: impl Into<String>, check: impl HealthCheck + 'static) {
        self.checks.push(NamedCheck {
            name: name.into(),
            check: Arc::new(check),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn runtime(&self) -> &RuntimeInfo {
        &self.runtime
    }

    /// Runs every check concurrently and waits for each to report or time out.
    ///
    /// `cancel` is the caller's token. Checks still running when this returns
    /// (timed out) are detached, not aborted; their tokens are cancelled.
    pub async fn run_checks(&self, cancel: &CancellationToken) -> CheckReport {
        if self.checks.is_empty() {
            return CheckReport::new(Vec::new(), Duration::ZERO, self.runtime.clone());
        }

        let started = Instant::now();
        let scope = cancel.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let runs = self
            .checks
            .iter()
            .map(|named| run_named(named, self.timeout, &scope));
        let checks = join_all(runs).await;

        CheckReport::new(checks, started.elapsed(), self.runtime.clone())
    }
}

async fn run_named(named: &NamedCheck, timeout: Duration, parent: &CancellationToken) -> CheckOutcome {
    let started = Instant::now();
    let result = run_check(Arc::clone(&named.check), timeout, parent).await;

    CheckOutcome {
        state: result.state,
        output: result.output,
        name: named.name.clone(),
        duration: started.elapsed(),
    }
}

/// Runs one check in its own task, racing it against `timeout` and `parent`.
async fn run_check(
    check: Arc<dyn HealthCheck>,
    timeout: Duration,
    parent: &CancellationToken,
) -> CheckResult {
    let token = parent.child_token();
    let _guard = token.clone().drop_guard();

    let check_token = token.clone();
    let mut handle = tokio::spawn(catch_fault(async move { check.check(check_token).await }));

    tokio::select! {
        biased;

        joined = &mut handle => match joined {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(err))) => CheckResult::unhealthy(format!("checking failed: {err:#}")),
            Ok(Err(fault)) => CheckResult::unhealthy(format!(
                "checking panicked: {}, stacktrace: {}",
                fault.message(),
                fault.stacktrace()
            )),
            Err(err) => CheckResult::unhealthy(format!("checking aborted: {err}")),
        },
        () = parent.cancelled() => CheckResult::unknown("checking canceled by caller"),
        () = tokio::time::sleep(timeout) => {
            if parent.is_cancelled() {
                CheckResult::unknown("checking canceled by caller")
            } else {
                CheckResult::unknown("checking timeout: deadline has elapsed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::health::state::CheckState;

    fn checker(timeout: Duration) -> HealthChecker {
        HealthChecker::new(HealthCheckerConfig {
            host: Some("box-1".to_string()),
            timeout,
            service: "svc".to_string(),
            environment: "test".to_string(),
            version: "1.2.3".to_string(),
        })
    }

    fn healthy() -> impl HealthCheck {
        check_fn(|_| async { Ok(CheckResult::healthy("OK")) })
    }

    fn sleeping(d: Duration) -> impl HealthCheck {
        check_fn(move |_| async move {
            tokio::time::sleep(d).await;
            Ok(CheckResult::healthy("woke up"))
        })
    }

    #[test]
    fn zero_timeout_uses_default() {
        assert_eq!(checker(Duration::ZERO).timeout(), DEFAULT_TIMEOUT);
        assert_eq!(checker(Duration::from_secs(1)).timeout(), Duration::from_secs(1));
    }

    #[test]
    fn runtime_carries_config() {
        let c = checker(Duration::ZERO);
        assert_eq!(c.runtime().host, "box-1");
        assert_eq!(c.runtime().service, "svc");
        assert_eq!(c.runtime().environment, "test");
        assert_eq!(c.runtime().version, "1.2.3");
    }

    #[tokio::test]
    async fn no_checks_is_unhealthy() {
        let report = checker(Duration::ZERO).run_checks(&CancellationToken::new()).await;
        assert!(report.checks().is_empty());
        assert!(!report.is_healthy());
        assert_eq!(report.overall_state(), CheckState::Unhealthy);
        assert_eq!(report.runtime().service, "svc");
    }

    #[tokio::test]
    async fn slow_check_times_out_without_delaying_the_run() {
        let mut c = checker(Duration::from_millis(100));
        c.add_check("A", healthy());
        c.add_check("B", sleeping(Duration::from_secs(5)));

        let started = Instant::now();
        let report = c.run_checks(&CancellationToken::new()).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2), "run took {elapsed:?}");

        let checks = report.checks();
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].name, "A");
        assert_eq!(checks[0].state, CheckState::Healthy);
        assert_eq!(checks[1].name, "B");
        assert_eq!(checks[1].state, CheckState::Unknown);
        assert!(checks[1].output.starts_with("checking timeout"));
        assert!(checks[0].duration < checks[1].duration);
    }

    #[tokio::test]
    async fn results_keep_registration_order() {
        let mut c = checker(Duration::from_secs(1));
        c.add_check("slowest", sleeping(Duration::from_millis(60)));
        c.add_check("slow", sleeping(Duration::from_millis(30)));
        c.add_check("fast", healthy());

        let report = c.run_checks(&CancellationToken::new()).await;
        let names: Vec<_> = report.checks().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["slowest", "slow", "fast"]);
        assert_eq!(report.overall_state(), CheckState::Healthy);
    }

    #[tokio::test]
    async fn panicking_check_is_unhealthy_and_isolated() {
        let mut c = checker(Duration::from_secs(1));
        c.add_check("ok", healthy());
        c.add_check(
            "boom",
            check_fn(|_| async {
                if true {
                    panic!("check exploded");
                }
                Ok(CheckResult::healthy("unreachable"))
            }),
        );

        let report = c.run_checks(&CancellationToken::new()).await;
        assert_eq!(report.checks()[0].state, CheckState::Healthy);
        let boom = &report.checks()[1];
        assert_eq!(boom.state, CheckState::Unhealthy);
        assert!(boom.output.starts_with("checking panicked: check exploded"));
        assert!(boom.output.contains("stacktrace: "));
    }

    #[tokio::test]
    async fn failing_check_reports_error() {
        let mut c = checker(Duration::from_secs(1));
        c.add_check(
            "db",
            check_fn(|_| async { Err(anyhow::anyhow!("connection refused")) }),
        );

        let report = c.run_checks(&CancellationToken::new()).await;
        assert_eq!(report.checks()[0].state, CheckState::Unhealthy);
        assert_eq!(report.checks()[0].output, "checking failed: connection refused");
    }

    #[tokio::test]
    async fn caller_cancellation_is_distinguished_from_timeout() {
        let mut c = checker(Duration::from_secs(5));
        c.add_check("stuck", sleeping(Duration::from_secs(30)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let report = c.run_checks(&cancel).await;
        assert_eq!(report.checks()[0].state, CheckState::Unknown);
        assert_eq!(report.checks()[0].output, "checking canceled by caller");
    }

    #[tokio::test]
    async fn timed_out_check_sees_cancellation() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);

        let mut c = checker(Duration::from_millis(20));
        c.add_check(
            "cooperative",
            check_fn(move |cancel: CancellationToken| {
                let flag = Arc::clone(&flag);
                async move {
                    cancel.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(CheckResult::healthy("stopped"))
                }
            }),
        );

        let report = c.run_checks(&CancellationToken::new()).await;
        assert_eq!(report.checks()[0].state, CheckState::Unknown);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(observed.load(Ordering::SeqCst));
    }
}
