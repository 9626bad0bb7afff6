//! Error types for trace construction.

use thiserror::Error;

/// Errors produced while building or closing a [`crate::Tracer`](crate::trace::Tracer) tree.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TracerError {
    /// `start_child` was called with a parent handle that does not belong to this trace.
    #[error("unknown parent node {0}")]
    UnknownParent(uuid::Uuid),

    /// A node was closed that does not exist in this trace (or was already closed twice).
    #[error("unknown or already-closed node {0}")]
    UnknownNode(uuid::Uuid),

    /// `close` was called on a parent whose children are not all closed yet.
    #[error("node {0} has open children and cannot be closed")]
    ChildrenStillOpen(uuid::Uuid),

    /// `finish` was called before the root node (or a descendant) was closed.
    #[error("trace is not complete: root or a descendant is still open")]
    Incomplete,

    /// `start_root` was called twice on the same trace.
    #[error("trace already has a root node")]
    RootAlreadyStarted,
}

/// Result alias for tracer operations.
pub type Result<T> = std::result::Result<T, TracerError>;
