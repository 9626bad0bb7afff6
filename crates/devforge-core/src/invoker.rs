//! C3 Tool Invoker (spec §4.3): the seven-step invocation pipeline —
//! lookup, input validation, trace open, dispatch with timeout/retry,
//! output validation, trace close, result.

use std::sync::Arc;
use std::time::Duration;

use jsonschema::JSONSchema;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use devforge_tracer::{ErrorDescriptor, NodeHandle, Outcome, Tracer};

use crate::capability::InvocationContext;
use crate::entry::EntryKind;
use crate::error::{CoreError, FieldError, Result};
use crate::registry::Registry;
use crate::retry::Backoff;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRIES: u32 = 0;

/// Drives one tool invocation end to end against a [`Registry`], applying
/// schema validation, tracing, timeout enforcement, and retry-on-transient
/// (spec §4.3).
pub struct ToolInvoker {
    registry: Arc<Registry>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Invoke `tool_name` with `input`, recording the invocation as a root
    /// trace node. Returns the validated output and the finished trace's
    /// tracer handle so the caller can call `.finish()` once siblings (if
    /// any) are also closed.
    pub async fn invoke(
        &self,
        tool_name: &str,
        input: Value,
        tracer: Tracer,
        cancellation: CancellationToken,
    ) -> Result<Value> {
        if self.registry.is_shutting_down() {
            return Err(CoreError::ShuttingDown);
        }

        // Step 1: lookup.
        let entry = self.registry.lookup(EntryKind::Tool, tool_name)?;
        let (descriptor, body) = entry
            .as_tool()
            .expect("registry.lookup(EntryKind::Tool, ..) always returns a Tool entry");

        // Step 2: validate input against the descriptor's JSON Schema.
        validate_against_schema(&descriptor.input_schema, &input, "input")?;

        // Step 3: open a trace node for this invocation.
        let root = tracer.start_root(tool_name.to_string(), "tool".to_string(), Some(input.clone()))?;

        let timeout = descriptor.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let max_attempts = descriptor.retries.unwrap_or(DEFAULT_RETRIES) + 1;

        // Step 4: dispatch, with timeout and retry-on-transient (spec §4.3:
        // only `ResourceUnavailable`/`TransientIO` failures are retried).
        let outcome = self
            .dispatch_with_retry(body.clone(), input, &tracer, root, &cancellation, timeout, max_attempts)
            .await;

        match outcome {
            Ok(output) => {
                // Step 5: validate output against the descriptor's schema.
                match validate_against_schema(&descriptor.output_schema, &output, "output") {
                    Ok(()) => {
                        tracer.close(root, Outcome::success(Some(output.clone())))?;
                        info!(tool = tool_name, "invocation succeeded");
                        Ok(output)
                    }
                    Err(err) => {
                        tracer.close(
                            root,
                            Outcome::failure(ErrorDescriptor::new(err.kind(), err.public_message())),
                        )?;
                        Err(err)
                    }
                }
            }
            Err(err) => {
                tracer.close(
                    root,
                    Outcome::failure(ErrorDescriptor::new(err.kind(), err.public_message())),
                )?;
                warn!(tool = tool_name, error = %err, "invocation failed");
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_with_retry(
        &self,
        body: Arc<dyn crate::capability::ToolBody>,
        input: Value,
        tracer: &Tracer,
        root: NodeHandle,
        cancellation: &CancellationToken,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Value> {
        let mut backoff = Backoff::new(max_attempts.saturating_sub(1));
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let ctx = InvocationContext {
                request_id: tracer.request_id(),
                tracer: tracer.clone(),
                cancellation: cancellation.clone(),
                trace_handle: root,
            };

            let call = body.invoke(input.clone(), ctx);
            let result = tokio::select! {
                biased;
                _ = cancellation.cancelled() => Err(CoreError::Cancelled),
                outcome = tokio::time::timeout(timeout, call) => match outcome {
                    Ok(inner) => inner,
                    Err(_) => Err(CoreError::Timeout),
                },
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    if let Some(delay) = backoff.next() {
                        warn!(attempt, error = %err, "retrying transient tool failure");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Generate a fresh request id for a new invocation (used by the server
    /// when no caller-supplied id is present).
    pub fn new_request_id() -> Uuid {
        Uuid::new_v4()
    }
}

fn validate_against_schema(schema: &Value, instance: &Value, kind: &'static str) -> Result<()> {
    let compiled = JSONSchema::compile(schema).map_err(|err| {
        CoreError::InvalidInput(vec![FieldError {
            field: "$schema".to_string(),
            message: format!("{kind} schema does not compile: {err}"),
        }])
    })?;

    let result = compiled.validate(instance);
    if let Err(errors) = result {
        let fields: Vec<FieldError> = errors
            .map(|e| FieldError { field: e.instance_path.to_string(), message: e.to_string() })
            .collect();
        return if kind == "input" {
            Err(CoreError::InvalidInput(fields))
        } else {
            Err(CoreError::InvalidOutput(
                fields.into_iter().map(|f| format!("{}: {}", f.field, f.message)).collect::<Vec<_>>().join("; "),
            ))
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::capability::ToolBody;
    use crate::descriptor::ToolDescriptor;
    use devforge_tracer::{RedactionPolicy, TraceLimits};

    fn echo_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "msg": { "type": "string" } },
            "required": ["msg"]
        })
    }

    struct Echo;

    #[async_trait]
    impl ToolBody for Echo {
        async fn invoke(&self, input: Value, _ctx: InvocationContext) -> Result<Value> {
            Ok(input)
        }
    }

    struct FlakyThenOk {
        calls: AtomicU32,
        fail_until: u32,
    }

    #[async_trait]
    impl ToolBody for FlakyThenOk {
        async fn invoke(&self, input: Value, _ctx: InvocationContext) -> Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_until {
                Err(CoreError::TransientIo("not yet".into()))
            } else {
                Ok(input)
            }
        }
    }

    fn tracer() -> Tracer {
        Tracer::new(Uuid::new_v4(), None, None, TraceLimits::default(), RedactionPolicy::default())
    }

    #[tokio::test]
    async fn successful_invocation_round_trips_and_closes_trace() {
        let registry = Arc::new(Registry::new());
        let descriptor = ToolDescriptor::new("echo", semver::Version::new(1, 0, 0), "echoes input", echo_schema(), echo_schema());
        registry.register_tool(descriptor, Arc::new(Echo)).unwrap();
        registry.initialize_all().await.unwrap();

        let invoker = ToolInvoker::new(registry);
        let t = tracer();
        let output = invoker
            .invoke("echo", json!({"msg": "hi"}), t.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, json!({"msg": "hi"}));

        let finished = t.finish().unwrap();
        assert!(finished.succeeded());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_dispatch() {
        let registry = Arc::new(Registry::new());
        let descriptor = ToolDescriptor::new("echo", semver::Version::new(1, 0, 0), "echoes input", echo_schema(), echo_schema());
        registry.register_tool(descriptor, Arc::new(Echo)).unwrap();
        registry.initialize_all().await.unwrap();

        let invoker = ToolInvoker::new(registry);
        let t = tracer();
        let err = invoker
            .invoke("echo", json!({"wrong": 1}), t, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[tokio::test]
    async fn unknown_tool_name_is_tool_not_found() {
        let registry = Arc::new(Registry::new());
        registry.initialize_all().await.unwrap();
        let invoker = ToolInvoker::new(registry);
        let t = tracer();
        let err = invoker
            .invoke("missing", json!({}), t, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ToolNotFound");
    }

    #[tokio::test]
    async fn transient_failure_is_retried_within_budget() {
        let registry = Arc::new(Registry::new());
        let descriptor = ToolDescriptor::new("echo", semver::Version::new(1, 0, 0), "echoes input", echo_schema(), echo_schema())
            .with_retries(3);
        registry
            .register_tool(descriptor, Arc::new(FlakyThenOk { calls: AtomicU32::new(0), fail_until: 2 }))
            .unwrap();
        registry.initialize_all().await.unwrap();

        let invoker = ToolInvoker::new(registry);
        let t = tracer();
        let output = invoker
            .invoke("echo", json!({"msg": "hi"}), t, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, json!({"msg": "hi"}));
    }

    #[tokio::test]
    async fn exhausting_retry_budget_surfaces_transient_error() {
        let registry = Arc::new(Registry::new());
        let descriptor = ToolDescriptor::new("echo", semver::Version::new(1, 0, 0), "echoes input", echo_schema(), echo_schema())
            .with_retries(1);
        registry
            .register_tool(descriptor, Arc::new(FlakyThenOk { calls: AtomicU32::new(0), fail_until: 5 }))
            .unwrap();
        registry.initialize_all().await.unwrap();

        let invoker = ToolInvoker::new(registry);
        let t = tracer();
        let err = invoker
            .invoke("echo", json!({"msg": "hi"}), t, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TransientIO");
    }

    #[tokio::test]
    async fn cancellation_token_short_circuits_dispatch() {
        let registry = Arc::new(Registry::new());
        let descriptor = ToolDescriptor::new("echo", semver::Version::new(1, 0, 0), "echoes input", echo_schema(), echo_schema());
        registry.register_tool(descriptor, Arc::new(Echo)).unwrap();
        registry.initialize_all().await.unwrap();

        let invoker = ToolInvoker::new(registry);
        let t = tracer();
        let token = CancellationToken::new();
        token.cancel();
        let err = invoker.invoke("echo", json!({"msg": "hi"}), t, token).await.unwrap_err();
        assert_eq!(err.kind(), "Cancelled");
    }

    #[tokio::test]
    async fn shutting_down_registry_rejects_invocations() {
        let registry = Arc::new(Registry::new());
        registry.initialize_all().await.unwrap();
        registry.shutdown().await;

        let invoker = ToolInvoker::new(registry);
        let t = tracer();
        let err = invoker
            .invoke("echo", json!({}), t, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ShuttingDown");
    }
}
