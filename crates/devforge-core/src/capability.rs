//! The "capability record" pattern (spec §9 Design Notes): instead of an
//! inheritance chain of `MCPTool`/`MCPResource`/`MCPPrompt` base classes,
//! each registry entry carries a descriptor plus a small, object-safe
//! trait — a function-pointer set for {initialize, invoke, health_check,
//! cleanup} — that the registry dispatches through polymorphically.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;

/// Per-invocation context passed into a tool body: the request's trace
/// handle, a cancellation signal, and a dispatch capability for composing
/// into other registry entries.
#[derive(Clone)]
pub struct InvocationContext {
    pub request_id: Uuid,
    pub tracer: devforge_tracer::Tracer,
    pub cancellation: CancellationToken,
    pub trace_handle: devforge_tracer::NodeHandle,
}

impl InvocationContext {
    /// A cheap check a cooperative tool body should poll at I/O boundaries
    /// (spec §5 Cancellation).
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// The capability contract a registered tool's implementation satisfies.
#[async_trait]
pub trait ToolBody: Send + Sync {
    /// Execute the tool. Implementations should poll
    /// `ctx.is_cancelled()`/`ctx.cancellation.cancelled()` at I/O boundaries
    /// and return [`CoreError::Cancelled`] promptly when it fires.
    ///
    /// Returning [`CoreError::ResourceUnavailable`] or
    /// [`CoreError::TransientIo`] signals the invoker that this failure is
    /// eligible for retry (spec §4.3); any other error is terminal.
    async fn invoke(&self, input: Value, ctx: InvocationContext) -> Result<Value>;
}

/// A resource's liveness classification (spec §4.2 Lifecycle manager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// An opaque handle to one pooled connection. The resource body interprets
/// `id`; the pool manager only ever moves it between `pool` and `active`.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub resource_name: String,
}

/// The capability contract a registered resource's implementation
/// satisfies: bootstrap lifecycle, health probing, and connection
/// factory/teardown. The pool (C2) owns *placement* of connections; the
/// resource body owns their *creation and liveness*.
#[async_trait]
pub trait ResourceBody: Send + Sync {
    /// Run once, in registration order, during `Registry::initialize_all`.
    async fn initialize(&self) -> Result<()>;

    /// Create a brand new connection. Failures bubble to the caller (spec
    /// §4.2 Failure handling).
    async fn create_connection(&self) -> Result<ConnectionHandle>;

    /// Cheap liveness check for an existing connection.
    async fn probe(&self, handle: &ConnectionHandle) -> bool;

    /// Close a connection (idle eviction, broken-connection teardown, or
    /// release beyond pool capacity).
    async fn close_connection(&self, handle: &ConnectionHandle);

    /// Aggregate health metrics for the lifecycle manager (spec §4.2):
    /// error rate in `[0,1]`, average response time, and a memory-usage
    /// fraction of the configured max.
    async fn health_check(&self) -> HealthStatus;

    /// Run during `Registry::shutdown`, in reverse registration order.
    async fn cleanup(&self) -> Result<()>;
}

/// The capability contract for a registered prompt: optional custom
/// rendering logic beyond the default `{{variable}}` substitution (spec
/// §3 `PromptDescriptor`). Most prompts use
/// [`crate::prompt::render_default`] and never need a custom body.
#[async_trait]
pub trait PromptBody: Send + Sync {
    async fn render(&self, variables: &Value, context: Option<&Value>) -> Result<String>;
}

/// Convenience wrapper so closures can implement [`ToolBody`] without a
/// boilerplate struct — grounded in the registry tests, not meant for
/// production tool bodies with real I/O.
pub struct FnToolBody<F>(pub F);

#[async_trait]
impl<F> ToolBody for FnToolBody<F>
where
    F: Fn(Value, InvocationContext) -> Result<Value> + Send + Sync,
{
    async fn invoke(&self, input: Value, ctx: InvocationContext) -> Result<Value> {
        (self.0)(input, ctx)
    }
}
