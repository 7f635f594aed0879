//! Outcome codes and the error type shared by every pipeline stage.

use std::fmt;

use tollgate_core::Fault;

// ---------------------------------------------------------------------------
// OutcomeCode
// ---------------------------------------------------------------------------

/// How a call ended. Mirrors the gRPC status code set.
///
/// One value is produced per completed call and used both in the completion
/// log record and as a metrics label. The set is fixed, so it never inflates
/// label cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OutcomeCode {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl OutcomeCode {
    /// Numeric wire value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Display name, e.g. `DeadlineExceeded`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OutcomeCode::Ok => "OK",
            OutcomeCode::Canceled => "Canceled",
            OutcomeCode::Unknown => "Unknown",
            OutcomeCode::InvalidArgument => "InvalidArgument",
            OutcomeCode::DeadlineExceeded => "DeadlineExceeded",
            OutcomeCode::NotFound => "NotFound",
            OutcomeCode::AlreadyExists => "AlreadyExists",
            OutcomeCode::PermissionDenied => "PermissionDenied",
            OutcomeCode::ResourceExhausted => "ResourceExhausted",
            OutcomeCode::FailedPrecondition => "FailedPrecondition",
            OutcomeCode::Aborted => "Aborted",
            OutcomeCode::OutOfRange => "OutOfRange",
            OutcomeCode::Unimplemented => "Unimplemented",
            OutcomeCode::Internal => "Internal",
            OutcomeCode::Unavailable => "Unavailable",
            OutcomeCode::DataLoss => "DataLoss",
            OutcomeCode::Unauthenticated => "Unauthenticated",
        }
    }

    /// Metrics label, e.g. `deadline_exceeded`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            OutcomeCode::Ok => "ok",
            OutcomeCode::Canceled => "canceled",
            OutcomeCode::Unknown => "unknown",
            OutcomeCode::InvalidArgument => "invalid_argument",
            OutcomeCode::DeadlineExceeded => "deadline_exceeded",
            OutcomeCode::NotFound => "not_found",
            OutcomeCode::AlreadyExists => "already_exists",
            OutcomeCode::PermissionDenied => "permission_denied",
            OutcomeCode::ResourceExhausted => "resource_exhausted",
            OutcomeCode::FailedPrecondition => "failed_precondition",
            OutcomeCode::Aborted => "aborted",
            OutcomeCode::OutOfRange => "out_of_range",
            OutcomeCode::Unimplemented => "unimplemented",
            OutcomeCode::Internal => "internal",
            OutcomeCode::Unavailable => "unavailable",
            OutcomeCode::DataLoss => "data_loss",
            OutcomeCode::Unauthenticated => "unauthenticated",
        }
    }

    /// Classifies a pipeline result.
    #[must_use]
    pub fn of<T>(result: &Result<T, RpcError>) -> Self {
        match result {
            Ok(_) => OutcomeCode::Ok,
            Err(err) => err.code(),
        }
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// RpcError
// ---------------------------------------------------------------------------

/// Errors returned by handlers and pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The caller went away, or its context ended.
    #[error("Canceled by caller")]
    Canceled,
    /// The server-side timeout fired while the caller was still waiting.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    #[error("{0}")]
    InvalidArgument(String),
    /// A downstream dependency is unreachable.
    #[error("{0}")]
    Unavailable(String),
    /// Generic failure; never carries details about the cause.
    #[error("InternalServerError")]
    Internal,
    #[error("{message}")]
    Status { code: OutcomeCode, message: String },
    /// A fault re-raised across a task boundary, on its way to a recovery stage.
    #[error("handler panicked: {0}")]
    Fault(Fault),
    /// Any business error not otherwise classified.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RpcError {
    #[must_use]
    pub fn status(code: OutcomeCode, message: impl Into<String>) -> Self {
        RpcError::Status {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> OutcomeCode {
        match self {
            RpcError::Canceled => OutcomeCode::Canceled,
            RpcError::DeadlineExceeded => OutcomeCode::DeadlineExceeded,
            RpcError::InvalidArgument(_) => OutcomeCode::InvalidArgument,
            RpcError::Unavailable(_) => OutcomeCode::Unavailable,
            RpcError::Internal | RpcError::Fault(_) | RpcError::Other(_) => OutcomeCode::Internal,
            RpcError::Status { code, .. } => *code,
        }
    }
}
