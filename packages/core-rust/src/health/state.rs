//! Check states and the result a single check produces.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Health of one check, or of a whole report after rollup.
///
/// Serialized as its lower-case name. Deserializing an unrecognized name
/// yields [`CheckState::Unknown`] rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    /// Working as expected.
    Healthy,
    /// Working, but not very well (e.g. slow).
    Degraded,
    /// Not working.
    Unhealthy,
    /// The check did not finish: it timed out or the caller went away.
    #[default]
    #[serde(other)]
    Unknown,
}

impl CheckState {
    /// All states, in declaration order.
    pub const ALL: [CheckState; 4] = [
        CheckState::Healthy,
        CheckState::Degraded,
        CheckState::Unhealthy,
        CheckState::Unknown,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CheckState::Healthy => "healthy",
            CheckState::Degraded => "degraded",
            CheckState::Unhealthy => "unhealthy",
            CheckState::Unknown => "unknown",
        }
    }

    /// Parses a state name. Anything unrecognized is `Unknown`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "healthy" => CheckState::Healthy,
            "degraded" => CheckState::Degraded,
            "unhealthy" => CheckState::Unhealthy,
            _ => CheckState::Unknown,
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckState {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

// ---------------------------------------------------------------------------
// CheckResult
// ---------------------------------------------------------------------------

/// What a check function reports: a state plus human-readable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub state: CheckState,
    /// Extra output for further debugging.
    pub output: String,
}

impl CheckResult {
    #[must_use]
    pub fn new(state: CheckState, output: impl Into<String>) -> Self {
        Self {
            state,
            output: output.into(),
        }
    }

    #[must_use]
    pub fn healthy(output: impl Into<String>) -> Self {
        Self::new(CheckState::Healthy, output)
    }

    #[must_use]
    pub fn degraded(output: impl Into<String>) -> Self {
        Self::new(CheckState::Degraded, output)
    }

    #[must_use]
    pub fn unhealthy(output: impl Into<String>) -> Self {
        Self::new(CheckState::Unhealthy, output)
    }

    #[must_use]
    pub fn unknown(output: impl Into<String>) -> Self {
        Self::new(CheckState::Unknown, output)
    }
}
