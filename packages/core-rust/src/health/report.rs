//! Aggregate report produced by one run of the health checker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::state::CheckState;

/// Outcome of one named check within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub state: CheckState,
    pub output: String,
    pub name: String,
    /// Time spent on this check alone, serialized in nanoseconds.
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
}

/// Describes the process that produced a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub host: String,
    pub rust_version: String,
    pub service: String,
    pub environment: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// CheckReport
// ---------------------------------------------------------------------------

/// Results of every registered check, in registration order.
///
/// Immutable once built; the rollups below derive overall health from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    checks: Vec<CheckOutcome>,
    #[serde(with = "duration_nanos")]
    duration: Duration,
    runtime: RuntimeInfo,
}

impl CheckReport {
    #[must_use]
    pub fn new(checks: Vec<CheckOutcome>, duration: Duration, runtime: RuntimeInfo) -> Self {
        Self {
            checks,
            duration,
            runtime,
        }
    }

    #[must_use]
    pub fn checks(&self) -> &[CheckOutcome] {
        &self.checks
    }

    /// Wall-clock time of the whole run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn runtime(&self) -> &RuntimeInfo {
        &self.runtime
    }

    /// True iff there is at least one check and every check is healthy or degraded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.checks.is_empty()
            && self
                .checks
                .iter()
                .all(|c| matches!(c.state, CheckState::Healthy | CheckState::Degraded))
    }

    /// True iff at least one check is degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.checks.iter().any(|c| c.state == CheckState::Degraded)
    }

    /// Overall state: healthy only if every check is exactly healthy,
    /// degraded if every check is healthy or degraded, unhealthy otherwise.
    ///
    /// An empty report is unhealthy. This is deliberately a separate
    /// computation from [`is_healthy`](Self::is_healthy) and
    /// [`is_degraded`](Self::is_degraded); the three are not mutually exclusive.
    #[must_use]
    pub fn overall_state(&self) -> CheckState {
        if self.checks.is_empty() {
            return CheckState::Unhealthy;
        }

        let mut healthy = true;
        let mut degraded = true;
        for check in &self.checks {
            healthy &= check.state == CheckState::Healthy;
            degraded &= matches!(check.state, CheckState::Healthy | CheckState::Degraded);
        }

        if healthy {
            CheckState::Healthy
        } else if degraded {
            CheckState::Degraded
        } else {
            CheckState::Unhealthy
        }
    }
}

// ---------------------------------------------------------------------------
// HealthReportBody
// ---------------------------------------------------------------------------

/// JSON body served by health endpoints: the report plus human-friendly rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReportBody {
    #[serde(flatten)]
    pub report: CheckReport,
    pub duration_in_seconds: f64,
    pub is_healthy: bool,
    pub is_degraded: bool,
}

impl From<CheckReport> for HealthReportBody {
    fn from(report: CheckReport) -> Self {
        Self {
            duration_in_seconds: report.duration().as_secs_f64(),
            is_healthy: report.is_healthy(),
            is_degraded: report.is_degraded(),
            report,
        }
    }
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}
