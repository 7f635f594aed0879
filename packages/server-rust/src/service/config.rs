use std::time::Duration;

/// Default per-call timeout enforced by the timeout stage.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// How the entry stage builds request identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryConfig {
    /// Use the caller's `trace-id` when it is a valid UUID.
    ///
    /// A static, per-deployment choice: leave off for public-facing services,
    /// where callers must not be able to choose trace ids.
    pub allow_trace_id_from_request: bool,
    /// Echo the generated request id back in the `request-id` response header.
    pub return_request_id_in_header: bool,
}

/// Which payloads the completion record serializes. Both off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryLogsConfig {
    pub log_request: bool,
    pub log_response: bool,
}

/// Settings for the whole call pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Per-call timeout. Zero disables the timeout stage's racing.
    pub call_timeout: Duration,
    pub entry: EntryConfig,
    pub entry_logs: EntryLogsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            entry: EntryConfig::default(),
            entry_logs: EntryLogsConfig::default(),
        }
    }
}
