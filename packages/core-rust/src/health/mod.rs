//! Concurrent health-check aggregation.
//!
//! - [`state`]: per-check states and results
//! - [`report`]: the aggregate report and its rollups
//! - [`checker`]: registers checks and runs them concurrently
//! - [`checks`]: ready-made checks (daemon serving, ping)

pub mod checker;
pub mod checks;
pub mod report;
pub mod state;

pub use checker::{check_fn, FnCheck, HealthCheck, HealthChecker, HealthCheckerConfig, DEFAULT_TIMEOUT};
pub use checks::{
    daemon_serving_check, ping_check, Daemon, DaemonServingCheck, PingCheck, Pinger, DEFAULT_ACCEPTABLE_PING,
};
pub use report::{CheckOutcome, CheckReport, HealthReportBody, RuntimeInfo};
pub use state::{CheckResult, CheckState};
