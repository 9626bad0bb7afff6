//! The lifecycle/health supervisor (spec §4.2, §9 "reified `setInterval`
//! loops"): a single ticker task owns idle-connection eviction, system
//! telemetry sampling, and the ingest-heartbeat timestamp the `/health`
//! endpoint reads.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use devforge_analytics::AnalyticsPipeline;
use devforge_core::ResourcePool;
use tracing::debug;

pub const TICK_INTERVAL: Duration = Duration::from_secs(15);

/// Run the health monitor's periodic tick until `shutdown` fires.
pub async fn run(
    pools: Arc<Vec<Arc<ResourcePool>>>,
    analytics: Arc<AnalyticsPipeline>,
    heartbeat: Arc<AtomicI64>,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        for pool in pools.iter() {
            pool.cleanup_idle().await;
        }

        let memory = read_memory_usage_fraction();
        analytics.set_system_usage(memory, 0.0);
        heartbeat.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        debug!("health monitor tick complete");
    }
}

#[cfg(target_os = "linux")]
fn read_memory_usage_fraction() -> f64 {
    let rss_kb = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| s.lines().find_map(|l| l.strip_prefix("VmRSS:").map(|r| r.trim().trim_end_matches(" kB").trim().to_string())))
        .and_then(|v| v.parse::<f64>().ok());
    let total_kb = std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|s| s.lines().find_map(|l| l.strip_prefix("MemTotal:").map(|r| r.trim().trim_end_matches(" kB").trim().to_string())))
        .and_then(|v| v.parse::<f64>().ok());
    match (rss_kb, total_kb) {
        (Some(rss), Some(total)) if total > 0.0 => rss / total,
        _ => 0.0,
    }
}

#[cfg(not(target_os = "linux"))]
fn read_memory_usage_fraction() -> f64 {
    0.0
}
