//! Per-request execution trace tree.
//!
//! A [`Tracer`] is a mutable, thread-safe handle to the call tree built while
//! a request is in flight (root + child spans, push/pop semantics). Once the
//! root and every descendant are closed, [`Tracer::finish`] consumes it into
//! an immutable [`FinishedTrace`] that is handed off to the analytics
//! pipeline.

pub mod error;
pub mod node;
pub mod redaction;
pub mod trace;

pub use error::{Result, TracerError};
pub use node::{ErrorDescriptor, Outcome, Sidecar, SidecarKind, TraceNode};
pub use redaction::RedactionPolicy;
pub use trace::{FinishedTrace, NodeHandle, Tracer, TraceLimits, DEFAULT_MAX_BYTES, DEFAULT_MAX_NODES};
