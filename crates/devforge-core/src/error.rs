//! The core error taxonomy (spec §7). Each variant maps to a recovery
//! strategy documented on the variant itself; callers should match on
//! `kind()` rather than format the error when deciding whether to retry.

use thiserror::Error;

/// A single field-level validation failure reported by [`InvalidInput`](CoreError::InvalidInput).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// The core error taxonomy. Variant names match spec §7's table exactly so
/// that `kind()` can be used as the wire-safe error string.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoreError {
    /// A name collision at registration time.
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    /// `register` was called after `initialize_all` (registration is
    /// bootstrap-only).
    #[error("registry already initialized; cannot register {kind} {name}")]
    AlreadyInitialized { kind: &'static str, name: String },

    /// `lookup`/`invoke` referenced a name that was never registered.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// `lookup` was called before `initialize_all` completed.
    #[error("registry has not been initialized yet")]
    NotInitialized,

    /// `invoke` addressed a tool name with no matching registration.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Input failed schema validation. Never retried.
    #[error("invalid input: {0:?}")]
    InvalidInput(Vec<FieldError>),

    /// Output failed schema validation. Counted against tool reliability.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// The tool body did not return before its descriptor's timeout elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The operation was cancelled (parent cancellation, or shutdown).
    #[error("operation was cancelled")]
    Cancelled,

    /// A pooled resource could not be acquired/created. Retried within the
    /// descriptor's retry budget.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A transient I/O failure signaled by the tool body. Retried within
    /// budget.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// The storage backend failed to persist a trace. Logged, never
    /// surfaced to the invocation caller (spec §7).
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The registry has been shut down; no further invocations are
    /// accepted (spec §8 invariant).
    #[error("server is shutting down")]
    ShuttingDown,

    /// A generic internal error. Never carries stack detail across the
    /// wire (spec §7); `trace_id` lets an operator correlate with logs.
    #[error("internal error (trace {trace_id})")]
    Internal { trace_id: String, source: anyhow::Error },
}

impl CoreError {
    /// The wire-safe taxonomy tag for this error (spec §7's `Kind` column),
    /// suitable for inclusion in a response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::DuplicateName { .. } => "DuplicateName",
            CoreError::AlreadyInitialized { .. } => "AlreadyInitialized",
            CoreError::NotFound { .. } => "NotFound",
            CoreError::NotInitialized => "NotInitialized",
            CoreError::ToolNotFound(_) => "ToolNotFound",
            CoreError::InvalidInput(_) => "InvalidInput",
            CoreError::InvalidOutput(_) => "InvalidOutput",
            CoreError::Timeout => "Timeout",
            CoreError::Cancelled => "Cancelled",
            CoreError::ResourceUnavailable(_) => "ResourceUnavailable",
            CoreError::TransientIo(_) => "TransientIO",
            CoreError::StorageFailure(_) => "StorageFailure",
            CoreError::ShuttingDown => "ShuttingDown",
            CoreError::Internal { .. } => "Internal",
        }
    }

    /// Whether this error category is eligible for the invoker's retry loop
    /// (spec §4.3, §7: `ResourceUnavailable`/`TransientIO` retry within
    /// budget, everything else does not).
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::ResourceUnavailable(_) | CoreError::TransientIo(_))
    }

    /// A display string safe to put on the wire: no paths, stack frames, or
    /// connection identifiers (spec §7).
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Internal { trace_id, .. } => {
                format!("internal error (trace {trace_id})")
            }
            other => other.to_string(),
        }
    }
}

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
