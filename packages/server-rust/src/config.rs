//! Process configuration, read from flags or the environment.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tollgate_core::health::DEFAULT_TIMEOUT;
use tollgate_core::HealthCheckerConfig;

use crate::network::NetworkConfig;
use crate::observability::LogFormat;
use crate::service::{EntryConfig, EntryLogsConfig, PipelineConfig};

/// Time the transport allows beyond the longest deadline it fronts, so the
/// call pipeline and health checker always report their own timeouts.
pub const TRANSPORT_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Settings of the `tollgate-server` process. Every flag can also be set
/// through the environment variable named next to it.
#[derive(Debug, Clone, Parser)]
#[command(name = "tollgate-server", version, about = "Unary call server with an interceptor pipeline")]
pub struct ServerConfig {
    /// Host name reported in logs and health reports.
    #[arg(long, env = "HOSTNAME")]
    pub hostname: Option<String>,

    /// Deployment environment.
    #[arg(long = "env", env = "ENV", default_value = "dev")]
    pub environment: String,

    /// Service name reported in logs and health reports.
    #[arg(long, env = "SERVICE", default_value = "tollgate-service")]
    pub service: String,

    /// Service version reported in health reports.
    #[arg(long, env = "SERVICE_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub service_version: String,

    /// Log level, used when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Call transport listen address.
    #[arg(long, env = "SERVER_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub server_listen_addr: SocketAddr,

    /// Monitoring (health, readiness, metrics) listen address.
    #[arg(long, env = "MONITORING_LISTEN_ADDR", default_value = "0.0.0.0:8081")]
    pub monitoring_listen_addr: SocketAddr,

    /// Per-call timeout in milliseconds; 0 disables it.
    #[arg(long, env = "RPC_TIMEOUT_MS", default_value_t = 5000)]
    pub rpc_timeout_ms: u64,

    /// Per-check health timeout in milliseconds; 0 means the checker default.
    #[arg(long, env = "HEALTHCHECK_TIMEOUT_MS", default_value_t = 10_000)]
    pub healthcheck_timeout_ms: u64,

    /// Reuse a caller-supplied `trace-id` when it is a valid UUID.
    #[arg(long, env = "ALLOW_TRACE_ID_FROM_REQUEST", default_value_t = true, action = ArgAction::Set)]
    pub allow_trace_id_from_request: bool,

    /// Send the generated request id back as a `request-id` response header.
    #[arg(long, env = "RETURN_REQUEST_ID_IN_HEADER", default_value_t = false, action = ArgAction::Set)]
    pub return_request_id_in_header: bool,

    /// Include request payloads in completion records.
    #[arg(long, env = "LOG_REQUEST_OBJECTS", default_value_t = false, action = ArgAction::Set)]
    pub log_request_objects: bool,

    /// Include response payloads in completion records.
    #[arg(long, env = "LOG_RESPONSE_OBJECTS", default_value_t = false, action = ArgAction::Set)]
    pub log_response_objects: bool,

    /// Seconds to wait for in-flight calls on shutdown.
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,
}

impl ServerConfig {
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            call_timeout: Duration::from_millis(self.rpc_timeout_ms),
            entry: EntryConfig {
                allow_trace_id_from_request: self.allow_trace_id_from_request,
                return_request_id_in_header: self.return_request_id_in_header,
            },
            entry_logs: EntryLogsConfig {
                log_request: self.log_request_objects,
                log_response: self.log_response_objects,
            },
        }
    }

    #[must_use]
    pub fn health_config(&self) -> HealthCheckerConfig {
        HealthCheckerConfig {
            host: self.hostname.clone(),
            timeout: Duration::from_millis(self.healthcheck_timeout_ms),
            service: self.service.clone(),
            environment: self.environment.clone(),
            version: self.service_version.clone(),
        }
    }

    /// Upper bound on one HTTP exchange.
    ///
    /// Longer than both the call timeout and the per-check health timeout by
    /// [`TRANSPORT_TIMEOUT_MARGIN`], and never below the transport default.
    /// A zero call timeout leaves calls bounded by this value alone.
    #[must_use]
    pub fn transport_timeout(&self) -> Duration {
        let health = match Duration::from_millis(self.healthcheck_timeout_ms) {
            zero if zero.is_zero() => DEFAULT_TIMEOUT,
            timeout => timeout,
        };
        let longest = Duration::from_millis(self.rpc_timeout_ms).max(health);
        (longest + TRANSPORT_TIMEOUT_MARGIN).max(NetworkConfig::default().request_timeout)
    }

    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            rpc_addr: self.server_listen_addr,
            monitoring_addr: self.monitoring_listen_addr,
            request_timeout: self.transport_timeout(),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerConfig {
        ServerConfig::try_parse_from(std::iter::once("tollgate-server").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let config = parse(&[
            "--service",
            "echo",
            "--env",
            "prod",
            "--log-format",
            "text",
            "--rpc-timeout-ms",
            "250",
            "--allow-trace-id-from-request",
            "false",
            "--return-request-id-in-header",
            "true",
            "--log-request-objects",
            "true",
            "--server-listen-addr",
            "127.0.0.1:9000",
        ]);

        assert_eq!(config.log_format, LogFormat::Text);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.call_timeout, Duration::from_millis(250));
        assert!(!pipeline.entry.allow_trace_id_from_request);
        assert!(pipeline.entry.return_request_id_in_header);
        assert!(pipeline.entry_logs.log_request);
        assert!(!pipeline.entry_logs.log_response);

        let health = config.health_config();
        assert_eq!(health.service, "echo");
        assert_eq!(health.environment, "prod");
        assert_eq!(health.timeout, Duration::from_secs(10));

        assert_eq!(config.network_config().rpc_addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn rejects_bad_addresses_and_formats() {
        let bad_addr = ServerConfig::try_parse_from(["tollgate-server", "--server-listen-addr", "nowhere"]);
        assert!(bad_addr.is_err());
        let bad_format = ServerConfig::try_parse_from(["tollgate-server", "--log-format", "xml"]);
        assert!(bad_format.is_err());
    }

    #[test]
    fn transport_timeout_outlasts_call_and_health_deadlines() {
        let defaults = parse(&[]);
        assert_eq!(defaults.network_config().request_timeout, Duration::from_secs(30));

        let slow_calls = parse(&["--rpc-timeout-ms", "60000"]);
        assert_eq!(slow_calls.network_config().request_timeout, Duration::from_secs(65));

        let slow_checks = parse(&["--healthcheck-timeout-ms", "45000", "--rpc-timeout-ms", "1000"]);
        assert_eq!(slow_checks.network_config().request_timeout, Duration::from_secs(50));

        let unbounded_calls = parse(&["--rpc-timeout-ms", "0", "--healthcheck-timeout-ms", "0"]);
        assert_eq!(unbounded_calls.network_config().request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn hostname_flag_reaches_health_reports() {
        let config = parse(&["--hostname", "node-7"]);
        assert_eq!(config.health_config().host.as_deref(), Some("node-7"));
    }

    #[test]
    fn zero_timeout_disables_the_deadline() {
        let config = parse(&["--rpc-timeout-ms", "0"]);
        assert!(config.pipeline_config().call_timeout.is_zero());
    }
}
