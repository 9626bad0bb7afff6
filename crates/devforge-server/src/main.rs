//! Runtime binary: wires the registry (C1), resource pools (C2), tool
//! invoker (C3), execution tracer (C4), analytics pipeline (C5), and
//! broadcast fabric (C6) into one process, then serves the stdio protocol,
//! HTTP health/metrics endpoints, and the WebSocket fabric concurrently
//! (spec §2, §6).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use devforge_analytics::AnalyticsPipeline;
use devforge_broadcast::BroadcastHub;
use devforge_core::{Registry, ResourcePool, ToolInvoker};
use devforge_server::health::AppState;
use devforge_server::{health, health_monitor, protocol, ws, ServerConfig, ServerError};
use devforge_storage::{MemoryStorage, SqliteStorage};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();
    init_tracing(&config.log_level);

    match run(config).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::error!(error = %err, "server exited with an error");
            std::process::exit(err.exit_code());
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: ServerConfig) -> Result<(), ServerError> {
    info!(?config, "starting devforge runtime");

    let storage = build_storage(&config).map_err(ServerError::Startup)?;

    let registry = Arc::new(Registry::new());
    register_builtin_tools(&registry);

    registry
        .initialize_all()
        .await
        .map_err(|err| ServerError::Startup(anyhow::anyhow!(err)))?;

    let pools: Arc<Vec<Arc<ResourcePool>>> = Arc::new(Vec::new());
    let invoker = Arc::new(ToolInvoker::new(registry.clone()));

    let (analytics, analytics_handle) = AnalyticsPipeline::spawn(storage);
    let analytics = Arc::new(analytics);

    let (broadcast, broadcast_handles) = BroadcastHub::spawn(analytics.clone());
    let broadcast = Arc::new(broadcast);

    let shutdown = CancellationToken::new();
    let heartbeat = Arc::new(AtomicI64::new(Utc::now().timestamp_millis()));

    let health_monitor_handle = tokio::spawn(health_monitor::run(
        pools.clone(),
        analytics.clone(),
        heartbeat.clone(),
        shutdown.clone(),
    ));

    let app_state = AppState {
        registry: registry.clone(),
        analytics: analytics.clone(),
        broadcast: broadcast.clone(),
        pools: pools.clone(),
        started_at: std::time::Instant::now(),
        last_ingest_heartbeat_millis: heartbeat,
        version: env!("CARGO_PKG_VERSION"),
    };

    let health_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.health_port))
        .await
        .map_err(|err| ServerError::Startup(err.into()))?;
    let ws_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.ws_port))
        .await
        .map_err(|err| ServerError::Startup(err.into()))?;

    info!(port = config.health_port, "health/metrics listener bound");
    info!(port = config.ws_port, "websocket listener bound");

    let health_shutdown = shutdown.clone();
    let health_server = tokio::spawn(async move {
        axum::serve(health_listener, health::router(app_state))
            .with_graceful_shutdown(health_shutdown.cancelled_owned())
            .await
    });

    let ws_shutdown = shutdown.clone();
    let ws_server = tokio::spawn(async move {
        axum::serve(ws_listener, ws::router(broadcast.clone()))
            .with_graceful_shutdown(ws_shutdown.cancelled_owned())
            .await
    });

    let stdio_shutdown = shutdown.clone();
    let stdio_registry = registry.clone();
    let stdio_invoker = invoker.clone();
    let stdio_analytics = analytics.clone();
    let stdio_server = tokio::spawn(async move {
        protocol::serve_stdio(
            tokio::io::stdin(),
            tokio::io::stdout(),
            stdio_registry,
            stdio_invoker,
            stdio_analytics,
            stdio_shutdown,
        )
        .await
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining in-flight work");
    shutdown.cancel();

    let _ = stdio_server.await;
    let _ = health_server.await;
    let _ = ws_server.await;
    health_monitor_handle.abort();
    for handle in broadcast_handles {
        handle.abort();
    }

    let errors = registry.shutdown().await;
    if !errors.is_empty() {
        for err in &errors {
            warn!(error = %err, "resource cleanup failed during shutdown");
        }
    }

    // `BroadcastHub` holds its own `Arc<AnalyticsPipeline>` clone (for
    // initial-snapshot delivery); the ingest worker only exits once every
    // clone — ours and the hub's — is dropped, so the hub must go first.
    drop(broadcast);
    drop(analytics);
    let _ = analytics_handle.await;

    if errors.is_empty() {
        info!("clean shutdown complete");
        Ok(())
    } else {
        Err(ServerError::Fatal(anyhow::anyhow!(
            "{} resource(s) failed to clean up during shutdown",
            errors.len()
        )))
    }
}

fn build_storage(config: &ServerConfig) -> anyhow::Result<Arc<dyn devforge_analytics::StorageBackend>> {
    if let Some(path) = config.storage_backend_url.strip_prefix("sqlite://") {
        info!(path, "using sqlite storage backend");
        return Ok(Arc::new(SqliteStorage::open(path)?));
    }
    if config.storage_backend_url != "memory://" {
        warn!(
            url = %config.storage_backend_url,
            "unrecognized STORAGE_BACKEND_URL, falling back to in-memory storage"
        );
    } else {
        info!("using in-memory storage backend");
    }
    Ok(Arc::new(MemoryStorage::new()))
}

/// The runtime's one built-in tool: an identity echo used to exercise the
/// invoker/tracer/pipeline path end to end before any tool-body collaborator
/// is registered (spec §8 scenario 1). Concrete tool bodies (project
/// templates, planning heuristics, code generation, quality scoring) are an
/// external collaborator's concern, not the core's (spec §1).
fn register_builtin_tools(registry: &Registry) {
    use devforge_core::ToolDescriptor;
    use serde_json::json;

    let schema = json!({ "type": "object" });
    let descriptor = ToolDescriptor::new(
        "echo",
        semver::Version::new(1, 0, 0),
        "returns its input unchanged; used for liveness checks",
        schema.clone(),
        schema,
    );
    let body = Arc::new(devforge_core::FnToolBody(|input, _ctx| Ok(input)));
    registry
        .register_tool(descriptor, body)
        .expect("the built-in echo tool name cannot collide at bootstrap");
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
