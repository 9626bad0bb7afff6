//! The JSON-over-stdio protocol (spec §6): one request/response pair per
//! line.

use std::sync::Arc;

use chrono::Utc;
use devforge_core::{EntryKind, Registry, ToolInvoker};
use devforge_tracer::{RedactionPolicy, TraceLimits, Tracer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use devforge_analytics::AnalyticsPipeline;

#[derive(Debug, Deserialize)]
struct Request {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    success: bool,
    data: Option<Value>,
    error: Option<String>,
    timestamp: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[serde(rename = "isError")]
    is_error: bool,
}

impl Response {
    fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None, timestamp: Utc::now().to_rfc3339(), is_error: false }
    }

    fn err(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()), timestamp: Utc::now().to_rfc3339(), is_error: true }
    }
}

/// Read one request per line from `input`, dispatch it, and write one
/// response per line to `output`. Returns once `input` reaches EOF.
pub async fn serve_stdio<R, W>(
    input: R,
    mut output: W,
    registry: Arc<Registry>,
    invoker: Arc<ToolInvoker>,
    analytics: Arc<AnalyticsPipeline>,
    shutdown: CancellationToken,
) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&line, &registry, &invoker, &analytics, &shutdown).await;
        let mut serialized = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
        serialized.push(b'\n');
        output.write_all(&serialized).await?;
        output.flush().await?;
    }

    Ok(())
}

async fn handle_line(
    line: &str,
    registry: &Arc<Registry>,
    invoker: &Arc<ToolInvoker>,
    analytics: &Arc<AnalyticsPipeline>,
    shutdown: &CancellationToken,
) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(err) => return Response::err(format!("malformed request: {err}")),
    };

    if request.name == "list-tools" {
        let tools: Vec<Value> = registry
            .list(EntryKind::Tool)
            .into_iter()
            .filter_map(|name| registry.lookup(EntryKind::Tool, &name).ok())
            .filter_map(|entry| entry.as_tool().map(|(d, _)| d.clone()))
            .map(|descriptor| {
                serde_json::json!({
                    "name": descriptor.name,
                    "description": descriptor.description,
                    "inputSchema": descriptor.input_schema,
                })
            })
            .collect();
        return Response::ok(serde_json::json!({ "tools": tools }));
    }

    debug!(tool = %request.name, "dispatching stdio invocation");

    let request_id = Uuid::new_v4();
    let tracer = Tracer::new(request_id, None, None, TraceLimits::default(), RedactionPolicy::default());
    let cancellation = shutdown.child_token();

    match invoker.invoke(&request.name, request.arguments, tracer.clone(), cancellation).await {
        Ok(output) => {
            if let Ok(finished) = tracer.finish() {
                analytics.submit(finished).await;
            }
            Response::ok(output)
        }
        Err(err) => {
            warn!(tool = %request.name, error = %err, "stdio invocation failed");
            if let Ok(finished) = tracer.finish() {
                analytics.submit(finished).await;
            }
            Response::err(err.public_message())
        }
    }
}
