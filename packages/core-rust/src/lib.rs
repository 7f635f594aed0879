//! `Tollgate` Core: fault capture and the concurrent health-check aggregator.

pub mod fault;
pub mod health;

pub use fault::{catch_fault, catch_fault_sync, install_panic_capture, Fault};
pub use health::{
    check_fn, CheckOutcome, CheckReport, CheckResult, CheckState, HealthCheck, HealthChecker,
    HealthCheckerConfig, HealthReportBody, RuntimeInfo,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
