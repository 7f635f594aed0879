//! Ready-made checks for common dependencies.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::checker::HealthCheck;
use super::state::CheckResult;

/// Ping latency above which a successful ping is reported as degraded.
pub const DEFAULT_ACCEPTABLE_PING: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Daemon serving
// ---------------------------------------------------------------------------

/// Something that can report whether it is currently serving.
pub trait Daemon: Send + Sync {
    fn serving(&self) -> bool;
}

/// Healthy while the daemon reports serving, unhealthy otherwise.
pub struct DaemonServingCheck {
    daemon: Arc<dyn Daemon>,
}

#[must_use]
pub fn daemon_serving_check(daemon: Arc<dyn Daemon>) -> DaemonServingCheck {
    DaemonServingCheck { daemon }
}

#[async_trait]
impl HealthCheck for DaemonServingCheck {
    async fn check(&self, _cancel: CancellationToken) -> anyhow::Result<CheckResult> {
        if self.daemon.serving() {
            Ok(CheckResult::healthy("Daemon is serving"))
        } else {
            Ok(CheckResult::unhealthy("Daemon is not serving"))
        }
    }
}

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

/// A dependency that can be pinged to check its connection.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, cancel: &CancellationToken) -> anyhow::Result<()>;
}

/// Pings a dependency; degraded when the ping takes at least the acceptable latency.
pub struct PingCheck {
    pinger: Arc<dyn Pinger>,
    acceptable: Duration,
}

impl PingCheck {
    #[must_use]
    pub fn new(pinger: Arc<dyn Pinger>) -> Self {
        Self {
            pinger,
            acceptable: DEFAULT_ACCEPTABLE_PING,
        }
    }

    #[must_use]
    pub fn with_acceptable_ping(mut self, acceptable: Duration) -> Self {
        self.acceptable = acceptable;
        self
    }
}

/// Pings `pinger` with the default acceptable latency.
#[must_use]
pub fn ping_check(pinger: Arc<dyn Pinger>) -> PingCheck {
    PingCheck::new(pinger)
}

#[async_trait]
impl HealthCheck for PingCheck {
    async fn check(&self, cancel: CancellationToken) -> anyhow::Result<CheckResult> {
        let started = Instant::now();
        self.pinger.ping(&cancel).await.context("failed to ping")?;

        let elapsed = started.elapsed();
        if elapsed >= self.acceptable {
            return Ok(CheckResult::degraded(format!(
                "OK, but response time was over {:.2} seconds",
                elapsed.as_secs_f64()
            )));
        }
        Ok(CheckResult::healthy("OK"))
    }
}
