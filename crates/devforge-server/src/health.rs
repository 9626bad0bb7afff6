//! HTTP health/metrics endpoints (spec §6), served on a listener separate
//! from the stdio protocol and the WebSocket fabric.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use devforge_analytics::AnalyticsPipeline;
use devforge_broadcast::BroadcastHub;
use devforge_core::{HealthStatus, Registry, ResourcePool};
use serde_json::json;

use crate::health_monitor;
use crate::metrics_prom;

/// The heartbeat only advances once per health-monitor tick, so the
/// staleness check must tolerate at least one full tick interval (plus
/// slack for a delayed tick) rather than some sub-tick window.
const HEARTBEAT_STALE_AFTER: std::time::Duration = Duration::from_secs(health_monitor::TICK_INTERVAL.as_secs() * 2);

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub analytics: Arc<AnalyticsPipeline>,
    pub broadcast: Arc<BroadcastHub>,
    pub pools: Arc<Vec<Arc<ResourcePool>>>,
    pub started_at: Instant,
    pub last_ingest_heartbeat_millis: Arc<AtomicI64>,
    pub version: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_json))
        .route("/alerts", get(alerts))
        .route("/performance", get(performance))
        .route("/metrics/prom", get(metrics_prometheus))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let heartbeat_age_ms = Utc::now().timestamp_millis() - state.last_ingest_heartbeat_millis.load(Ordering::Relaxed);
    let healthy = state.registry.is_initialized() && heartbeat_age_ms < HEARTBEAT_STALE_AFTER.as_millis() as i64;

    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "timestamp": Utc::now().to_rfc3339(),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "memory": read_memory_usage_fraction(),
        "version": state.version,
    });

    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let mut all_ready = true;
    for pool in state.pools.iter() {
        if matches!(pool.health_check().await, HealthStatus::Unhealthy) {
            all_ready = false;
            break;
        }
    }

    let status = if all_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = json!({
        "status": if all_ready { "ready" } else { "not-ready" },
        "timestamp": Utc::now().to_rfc3339(),
    });
    (status, Json(body))
}

async fn metrics_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "live": *state.analytics.live_metrics(),
        "trends": *state.analytics.trends(),
    }))
}

async fn alerts(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "alerts": state.analytics.active_alerts() }))
}

async fn performance(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.analytics.live_metrics();
    let pool_stats: Vec<_> = state
        .pools
        .iter()
        .map(|p| {
            let s = p.stats();
            json!({ "active": s.active, "idle": s.idle, "createdTotal": s.created_total, "acquiredTotal": s.acquired_total })
        })
        .collect();
    Json(json!({
        "window": "rolling-60s",
        "metrics": *metrics,
        "pools": pool_stats,
        "traceDroppedTotal": state.analytics.trace_dropped_total(),
        "broadcastSubscribers": state.broadcast.subscriber_count(),
    }))
}

async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.analytics.live_metrics();
    match metrics_prom::render(&metrics) {
        Ok(body) => (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// `VmRSS / total system memory` on Linux; `0.0` elsewhere. Used only for
/// the `/health` body's informational `memory` field, not for alerting
/// (the health-score formula's memory term is set by the health monitor).
fn read_memory_usage_fraction() -> f64 {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| {
                status.lines().find_map(|line| {
                    line.strip_prefix("VmRSS:").map(|rest| rest.trim().trim_end_matches(" kB").trim().to_string())
                })
            })
            .and_then(|kb| kb.parse::<f64>().ok())
            .map(|kb| (kb * 1024.0) / total_memory_bytes())
            .unwrap_or(0.0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        0.0
    }
}

#[cfg(target_os = "linux")]
fn total_memory_bytes() -> f64 {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|info| {
            info.lines()
                .find_map(|line| line.strip_prefix("MemTotal:").map(|rest| rest.trim().trim_end_matches(" kB").trim().to_string()))
        })
        .and_then(|kb| kb.parse::<f64>().ok())
        .map(|kb| kb * 1024.0)
        .unwrap_or(1.0)
}
