//! [`TraceNode`] and the small value types that hang off it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A structured description of a failed operation, attached to a [`TraceNode`]
/// when its outcome is unsuccessful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Error taxonomy tag (spec §7), e.g. `"InvalidInput"`, `"Timeout"`.
    pub kind: String,
    /// Human-readable, wire-safe message. Never contains internal paths,
    /// stack frames, or connection identifiers (spec §7).
    pub message: String,
}

impl ErrorDescriptor {
    /// Construct a new descriptor from a taxonomy kind and message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// The result of closing a node: either success with an optional result
/// payload, or failure with an [`ErrorDescriptor`].
#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<ErrorDescriptor>,
}

impl Outcome {
    /// A successful outcome carrying an optional result payload.
    pub fn success(result: Option<Value>) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    /// A failed outcome carrying an [`ErrorDescriptor`].
    pub fn failure(error: ErrorDescriptor) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

/// One node in a request's execution tree.
///
/// Invariants (enforced by [`crate::trace::Tracer`], never by this type
/// alone): `end >= start` once closed; every non-root node's parent is
/// already open at creation time; a parent's `[start, end]` interval
/// contains every child's interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Tool/operation label, e.g. the tool name or `"pool.acquire"`.
    pub label: String,
    /// Caller-supplied category: `"tool"`, `"context7"`, `"cache"`, etc.
    pub phase: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Derived: `(end - start)` in milliseconds, set at close.
    pub duration_ms: Option<i64>,
    /// Bounded, redacted-on-close input parameters.
    pub input: Option<Value>,
    /// Bounded, redacted-on-close result payload.
    pub result: Option<Value>,
    pub success: Option<bool>,
    pub error: Option<ErrorDescriptor>,
    pub children: Vec<Uuid>,
}

impl TraceNode {
    pub(crate) fn open(id: Uuid, parent_id: Option<Uuid>, label: String, phase: String, input: Option<Value>) -> Self {
        Self {
            id,
            parent_id,
            label,
            phase,
            start: Utc::now(),
            end: None,
            duration_ms: None,
            input,
            result: None,
            success: None,
            error: None,
            children: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// A non-tree sample attached to a trace: a cache operation, a performance
/// sample, or a user-pattern observation (spec §4.4 `recordSidecar`, §9 Open
/// Questions — cache hits are modeled here, not as trace nodes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    pub kind: SidecarKind,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

/// The category of a [`Sidecar`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SidecarKind {
    CacheOp,
    PerformanceSample,
    UserPattern,
}
