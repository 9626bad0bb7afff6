//! The Analytics Pipeline (C5, spec §4.5): a single-writer ingest worker
//! that folds each finished trace into rolling metrics, trend series,
//! alerts, and usage patterns, then hands it to the storage backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use devforge_tracer::FinishedTrace;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, warn};

use crate::alert::{Alert, AlertSeverity, AlertType};
use crate::metrics::{LiveMetrics, TrendSeriesSet, CPU, ERROR_RATE, MEMORY, RESPONSE_TIME, THROUGHPUT};
use crate::pattern::{PatternCategory, PatternDetector, UsagePattern};
use crate::storage::StorageBackend;

/// Default ring-buffer capacity for completed traces (spec §4.5).
pub const DEFAULT_RING_CAPACITY: usize = 10_000;
/// Bound on the hand-off queue from invoker to pipeline worker (spec §5:
/// bounded queue with a short backpressure deadline before dropping).
const SUBMIT_QUEUE_CAPACITY: usize = 4_096;
/// How long `submit` waits for queue space before dropping the trace.
const SUBMIT_BACKPRESSURE_DEADLINE: std::time::Duration = std::time::Duration::from_millis(50);
/// Window used for the rolling request-rate / avg-response-time figures.
const ROLLING_WINDOW: ChronoDuration = ChronoDuration::seconds(60);
/// Reservoir size for percentile computation.
const RESERVOIR_CAPACITY: usize = 500;
/// Bound on active alerts retained (spec §7).
const MAX_ALERTS: usize = 500;

/// Events the pipeline publishes for the broadcast fabric to fan out.
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    MetricsUpdated(Arc<LiveMetrics>),
    TrendsUpdated(Arc<TrendSeriesSet>),
    AlertRaised(Alert),
    PatternObserved(UsagePattern),
}

struct RecentSample {
    at: DateTime<Utc>,
    duration_ms: i64,
    success: bool,
}

struct SharedState {
    live_metrics: RwLock<Arc<LiveMetrics>>,
    trends: RwLock<Arc<TrendSeriesSet>>,
    alerts: RwLock<Vec<Alert>>,
    ring: Mutex<VecDeque<FinishedTrace>>,
    recent: Mutex<VecDeque<RecentSample>>,
    reservoir: Mutex<VecDeque<i64>>,
    patterns: Mutex<PatternDetector>,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    trace_dropped_total: AtomicU64,
    ingest_alive: AtomicU64,
}

/// Handle to the running pipeline: submit traces, read snapshots, subscribe
/// to published events.
pub struct AnalyticsPipeline {
    shared: Arc<SharedState>,
    submit_tx: mpsc::Sender<FinishedTrace>,
    events_tx: broadcast::Sender<AnalyticsEvent>,
}

impl AnalyticsPipeline {
    /// Spawn the ingest worker and return a handle plus its `JoinHandle`.
    /// The worker runs until every `AnalyticsPipeline`/`submit_tx` clone is
    /// dropped.
    pub fn spawn(storage: Arc<dyn StorageBackend>) -> (Self, tokio::task::JoinHandle<()>) {
        let (submit_tx, submit_rx) = mpsc::channel(SUBMIT_QUEUE_CAPACITY);
        let (events_tx, _) = broadcast::channel(1_024);

        let shared = Arc::new(SharedState {
            live_metrics: RwLock::new(Arc::new(LiveMetrics::default())),
            trends: RwLock::new(Arc::new(TrendSeriesSet::default())),
            alerts: RwLock::new(Vec::new()),
            ring: Mutex::new(VecDeque::with_capacity(DEFAULT_RING_CAPACITY)),
            recent: Mutex::new(VecDeque::new()),
            reservoir: Mutex::new(VecDeque::with_capacity(RESERVOIR_CAPACITY)),
            patterns: Mutex::new(PatternDetector::new()),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            trace_dropped_total: AtomicU64::new(0),
            ingest_alive: AtomicU64::new(1),
        });

        let worker_shared = shared.clone();
        let worker_events = events_tx.clone();
        let handle = tokio::spawn(worker_loop(submit_rx, worker_shared, worker_events, storage));

        (Self { shared, submit_tx, events_tx }, handle)
    }

    /// Hand off a finished trace to the ingest worker. Waits up to a short
    /// deadline for queue space; on timeout the trace is dropped and the
    /// `trace-dropped` counter increments, never blocking the caller's
    /// invocation result (spec §5).
    pub async fn submit(&self, trace: FinishedTrace) -> bool {
        match tokio::time::timeout(SUBMIT_BACKPRESSURE_DEADLINE, self.submit_tx.send(trace)).await {
            Ok(Ok(())) => true,
            _ => {
                self.shared.trace_dropped_total.fetch_add(1, Ordering::Relaxed);
                warn!("analytics queue saturated; dropping trace");
                false
            }
        }
    }

    pub fn live_metrics(&self) -> Arc<LiveMetrics> {
        self.shared.live_metrics.read().clone()
    }

    pub fn trends(&self) -> Arc<TrendSeriesSet> {
        self.shared.trends.read().clone()
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.shared.alerts.read().iter().filter(|a| !a.resolved).cloned().collect()
    }

    pub fn resolve_alert(&self, id: uuid::Uuid) {
        let mut alerts = self.shared.alerts.write();
        if let Some(alert) = alerts.iter_mut().find(|a| a.id == id) {
            alert.resolve();
        }
    }

    pub fn recent_patterns(&self) -> Vec<UsagePattern> {
        self.shared.patterns.lock().patterns().to_vec()
    }

    pub fn trace_dropped_total(&self) -> u64 {
        self.shared.trace_dropped_total.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalyticsEvent> {
        self.events_tx.subscribe()
    }

    /// Fold system telemetry sampled by the health monitor's ticker into
    /// the live snapshot. This is the one piece of [`LiveMetrics`] not
    /// derived from the trace stream, so it bypasses the ingest worker and
    /// writes directly; readers still see a whole-struct consistent clone.
    pub fn set_system_usage(&self, memory_usage_fraction: f64, cpu_usage_fraction: f64) {
        let mut guard = self.shared.live_metrics.write();
        let mut updated = (**guard).clone();
        updated.memory_usage_fraction = memory_usage_fraction;
        updated.cpu_usage_fraction = cpu_usage_fraction;
        *guard = Arc::new(updated);
    }
}

async fn worker_loop(
    mut submit_rx: mpsc::Receiver<FinishedTrace>,
    shared: Arc<SharedState>,
    events_tx: broadcast::Sender<AnalyticsEvent>,
    storage: Arc<dyn StorageBackend>,
) {
    while let Some(trace) = submit_rx.recv().await {
        ingest(&shared, &events_tx, &storage, trace).await;
    }
    shared.ingest_alive.store(0, Ordering::Release);
}

/// The seven-step ingest (spec §4.5 steps 1-8; step numbers in comments
/// below match the spec list).
async fn ingest(
    shared: &Arc<SharedState>,
    events_tx: &broadcast::Sender<AnalyticsEvent>,
    storage: &Arc<dyn StorageBackend>,
    trace: FinishedTrace,
) {
    let now = trace.root().end.unwrap_or_else(Utc::now);

    // Step 1: append to ring buffer.
    {
        let mut ring = shared.ring.lock();
        ring.push_back(trace.clone());
        while ring.len() > DEFAULT_RING_CAPACITY {
            ring.pop_front();
        }
    }

    // Step 2: update counters.
    let succeeded = trace.succeeded();
    shared.total_requests.fetch_add(1, Ordering::Relaxed);
    if !succeeded {
        shared.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    let duration_ms = trace.total_duration_ms();
    {
        let mut recent = shared.recent.lock();
        recent.push_back(RecentSample { at: now, duration_ms, success: succeeded });
        while let Some(front) = recent.front() {
            if now - front.at > ROLLING_WINDOW {
                recent.pop_front();
            } else {
                break;
            }
        }
    }
    {
        let mut reservoir = shared.reservoir.lock();
        reservoir.push_back(duration_ms);
        while reservoir.len() > RESERVOIR_CAPACITY {
            reservoir.pop_front();
        }
    }

    // Step 3: recompute rolling windows.
    let (request_rate, avg_response_time, p50, p95, p99, error_rate) = {
        let recent = shared.recent.lock();
        let count = recent.len();
        let request_rate = count as f64;
        let avg = if count == 0 {
            0.0
        } else {
            recent.iter().map(|s| s.duration_ms as f64).sum::<f64>() / count as f64
        };
        let errors = recent.iter().filter(|s| !s.success).count();
        let error_rate = if count == 0 { 0.0 } else { errors as f64 / count as f64 };

        let mut sorted: Vec<i64> = shared.reservoir.lock().iter().copied().collect();
        sorted.sort_unstable();
        let percentile = |p: f64| -> f64 {
            if sorted.is_empty() {
                return 0.0;
            }
            let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
            sorted[idx.min(sorted.len() - 1)] as f64
        };

        (request_rate, avg, percentile(0.50), percentile(0.95), percentile(0.99), error_rate)
    };

    // LiveMetrics is carried forward for fields this ingest doesn't touch
    // (memory/CPU are sampled by the server's health monitor, not derived
    // from traces).
    let previous = shared.live_metrics.read().clone();
    let cache_hit_rate = previous.cache_hit_rate;
    let fallback_rate = previous.fallback_rate;
    let health_score = LiveMetrics::compute_health_score(error_rate, avg_response_time, cache_hit_rate, fallback_rate);

    let updated = Arc::new(LiveMetrics {
        avg_response_time_ms: avg_response_time,
        p50_ms: p50,
        p95_ms: p95,
        p99_ms: p99,
        request_rate_per_min: request_rate,
        error_rate,
        memory_usage_fraction: previous.memory_usage_fraction,
        cpu_usage_fraction: previous.cpu_usage_fraction,
        cache_hit_rate,
        fallback_rate,
        active_alert_count: shared.alerts.read().iter().filter(|a| !a.resolved).count() as u32,
        health_score,
        last_updated: now,
        total_requests: shared.total_requests.load(Ordering::Relaxed),
        total_errors: shared.total_errors.load(Ordering::Relaxed),
    });
    *shared.live_metrics.write() = updated.clone();
    let _ = events_tx.send(AnalyticsEvent::MetricsUpdated(updated.clone()));

    // Step 4: update trend series.
    {
        let mut trends = (*shared.trends.read()).clone();
        trends.push(RESPONSE_TIME, now, avg_response_time);
        trends.push(ERROR_RATE, now, error_rate);
        trends.push(MEMORY, now, updated.memory_usage_fraction);
        trends.push(CPU, now, updated.cpu_usage_fraction);
        trends.push(THROUGHPUT, now, request_rate);
        let trends = Arc::new(trends);
        *shared.trends.write() = trends.clone();
        let _ = events_tx.send(AnalyticsEvent::TrendsUpdated(trends));
    }

    // Step 6: threshold checks -> alerts.
    for alert in check_thresholds(&updated, &trace) {
        let mut alerts = shared.alerts.write();
        alerts.push(alert.clone());
        while alerts.len() > MAX_ALERTS {
            alerts.remove(0);
        }
        drop(alerts);
        let _ = events_tx.send(AnalyticsEvent::AlertRaised(alert));
    }

    // Step 7: pattern detection.
    let touched = shared.patterns.lock().observe(&trace);
    for pattern in touched {
        let _ = events_tx.send(AnalyticsEvent::PatternObserved(pattern));
    }

    // Step 8: persist (fire-and-forget relative to ingest; failures are a
    // pipeline-level warning, never surfaced to the invocation caller).
    if let Err(err) = storage.put(&trace).await {
        error!(error = %err, "trace persistence failed");
    }
}

fn check_thresholds(metrics: &LiveMetrics, trace: &FinishedTrace) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if metrics.error_rate > 0.10 {
        alerts.push(Alert::new(
            AlertType::Error,
            AlertSeverity::High,
            "elevated error rate",
            format!("rolling error rate {:.1}% exceeds threshold", metrics.error_rate * 100.0),
            json!({ "error_rate": metrics.error_rate }),
        ));
    }

    if let Some(duration) = trace.root().duration_ms {
        if duration as f64 > 2_000.0 {
            alerts.push(Alert::new(
                AlertType::Performance,
                AlertSeverity::Medium,
                "slow operation",
                format!("'{}' took {}ms, exceeding the response-time threshold", trace.root().label, duration),
                json!({ "tool": trace.root().label, "duration_ms": duration }),
            ));
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use devforge_tracer::{Outcome, RedactionPolicy, TraceLimits, Tracer};
    use std::sync::Mutex as StdMutex;

    struct MemoryStorage {
        puts: StdMutex<Vec<FinishedTrace>>,
    }

    #[async_trait]
    impl StorageBackend for MemoryStorage {
        async fn put(&self, trace: &FinishedTrace) -> crate::error::Result<()> {
            self.puts.lock().unwrap().push(trace.clone());
            Ok(())
        }

        async fn query(&self, _filter: &crate::storage::TraceFilter) -> crate::error::Result<Vec<FinishedTrace>> {
            Ok(self.puts.lock().unwrap().clone())
        }

        async fn export(&self, _format: crate::storage::ExportFormat, _filter: &crate::storage::TraceFilter) -> crate::error::Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn prune(&self, _older_than: DateTime<Utc>) -> crate::error::Result<u64> {
            Ok(0)
        }
    }

    fn echo_trace(success: bool, duration_hint_ms: i64) -> FinishedTrace {
        let t = Tracer::new(uuid::Uuid::new_v4(), None, None, TraceLimits::default(), RedactionPolicy::default());
        let root = t.start_root("echo", "tool", None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(0));
        let outcome = if success {
            Outcome::success(None)
        } else {
            Outcome::failure(devforge_tracer::ErrorDescriptor::new("TransientIO", "boom"))
        };
        t.close(root, outcome).unwrap();
        let _ = duration_hint_ms;
        t.finish().unwrap()
    }

    #[tokio::test]
    async fn submit_updates_live_metrics_and_persists() {
        let storage = Arc::new(MemoryStorage { puts: StdMutex::new(Vec::new()) });
        let (pipeline, _handle) = AnalyticsPipeline::spawn(storage.clone());

        assert!(pipeline.submit(echo_trace(true, 10)).await);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let metrics = pipeline.live_metrics();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(storage.puts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sustained_errors_raise_an_alert() {
        let storage = Arc::new(MemoryStorage { puts: StdMutex::new(Vec::new()) });
        let (pipeline, _handle) = AnalyticsPipeline::spawn(storage);

        for _ in 0..5 {
            pipeline.submit(echo_trace(false, 5)).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let alerts = pipeline.active_alerts();
        assert!(alerts.iter().any(|a| a.kind == AlertType::Error));
    }

    #[tokio::test]
    async fn resolve_alert_is_idempotent() {
        let storage = Arc::new(MemoryStorage { puts: StdMutex::new(Vec::new()) });
        let (pipeline, _handle) = AnalyticsPipeline::spawn(storage);
        for _ in 0..5 {
            pipeline.submit(echo_trace(false, 5)).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let id = pipeline.active_alerts().first().unwrap().id;
        pipeline.resolve_alert(id);
        pipeline.resolve_alert(id);
        assert!(!pipeline.active_alerts().iter().any(|a| a.id == id));
    }
}
