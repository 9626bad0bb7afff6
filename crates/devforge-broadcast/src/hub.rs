//! The broadcast hub (C6, spec §4.6): translates [`AnalyticsEvent`]s into
//! per-topic [`ServerMessage`]s and fans them out to every subscribed
//! connection's independent, bounded queue. The ingest side never blocks
//! on a subscriber.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use devforge_analytics::{AnalyticsEvent, AnalyticsPipeline};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::message::ServerMessage;
use crate::queue::PushOutcome;
use crate::subscriber::{DisconnectReason, Subscriber};
use crate::topic::Topic;

/// Heartbeat interval (spec §4.6).
pub const HEARTBEAT_INTERVAL: StdDuration = StdDuration::from_secs(30);
/// Silence timeout past which a subscriber is disconnected (spec §4.6).
pub const SILENCE_TIMEOUT: ChronoDuration = ChronoDuration::seconds(90);

/// Owns the subscriber registry and the background tasks that keep it fed:
/// one task translates analytics events into topic messages, another sends
/// heartbeats and evicts silent connections.
pub struct BroadcastHub {
    subscribers: Arc<DashMap<Uuid, Arc<Subscriber>>>,
    analytics: Arc<AnalyticsPipeline>,
}

impl BroadcastHub {
    /// Spawn the hub's background tasks and return a handle plus both
    /// `JoinHandle`s.
    pub fn spawn(analytics: Arc<AnalyticsPipeline>) -> (Self, [tokio::task::JoinHandle<()>; 2]) {
        let subscribers: Arc<DashMap<Uuid, Arc<Subscriber>>> = Arc::new(DashMap::new());

        let ingest_subs = subscribers.clone();
        let mut events_rx = analytics.subscribe();
        let ingest_handle = tokio::spawn(async move {
            loop {
                match events_rx.recv().await {
                    Ok(event) => fan_out(&ingest_subs, event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "broadcast hub lagged behind analytics event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let ticker_subs = subscribers.clone();
        let ticker_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                interval.tick().await;
                tick(&ticker_subs);
            }
        });

        (Self { subscribers, analytics }, [ingest_handle, ticker_handle])
    }

    /// Register a new subscriber, deliver its initial snapshot per spec
    /// §4.6 ("the subscriber receives an immediate snapshot"), and return
    /// the subscriber handle the transport layer reads from.
    pub fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) -> Arc<Subscriber> {
        let subscriber = Subscriber::new(topics);
        self.send_initial_snapshot(&subscriber);
        self.subscribers.insert(subscriber.id, subscriber.clone());
        info!(subscriber = %subscriber.id, "subscriber connected");
        subscriber
    }

    pub fn update_topics(&self, id: Uuid, add: Vec<Topic>, remove: Vec<Topic>) {
        if let Some(subscriber) = self.subscribers.get(&id) {
            subscriber.subscribe(add);
            subscriber.unsubscribe(remove);
        }
    }

    pub fn disconnect(&self, id: Uuid, reason: DisconnectReason) {
        if let Some((_, subscriber)) = self.subscribers.remove(&id) {
            subscriber.close();
            info!(subscriber = %id, ?reason, "subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Disconnect every subscriber, e.g. during server shutdown.
    pub fn shutdown(&self) {
        for entry in self.subscribers.iter() {
            entry.value().close();
        }
        self.subscribers.clear();
    }

    fn send_initial_snapshot(&self, subscriber: &Arc<Subscriber>) {
        if subscriber.is_subscribed(Topic::MetricsLive) {
            let metrics = self.analytics.live_metrics();
            subscriber.deliver(Topic::MetricsLive, ServerMessage::new(Topic::MetricsLive, "snapshot", json!(*metrics)));
        }
        if subscriber.is_subscribed(Topic::MetricsTrends) {
            let trends = self.analytics.trends();
            subscriber.deliver(Topic::MetricsTrends, ServerMessage::new(Topic::MetricsTrends, "snapshot", json!(*trends)));
        }
        if subscriber.is_subscribed(Topic::Alerts) {
            let alerts = self.analytics.active_alerts();
            subscriber.deliver(Topic::Alerts, ServerMessage::new(Topic::Alerts, "snapshot", json!(alerts)));
        }
        if subscriber.is_subscribed(Topic::Patterns) {
            let patterns = self.analytics.recent_patterns();
            subscriber.deliver(Topic::Patterns, ServerMessage::new(Topic::Patterns, "snapshot", json!(patterns)));
        }
    }
}

fn fan_out(subscribers: &DashMap<Uuid, Arc<Subscriber>>, event: AnalyticsEvent) {
    let (topic, message) = match event {
        AnalyticsEvent::MetricsUpdated(metrics) => {
            (Topic::MetricsLive, ServerMessage::new(Topic::MetricsLive, "update", json!(*metrics)))
        }
        AnalyticsEvent::TrendsUpdated(trends) => {
            (Topic::MetricsTrends, ServerMessage::new(Topic::MetricsTrends, "update", json!(*trends)))
        }
        AnalyticsEvent::AlertRaised(alert) => (Topic::Alerts, ServerMessage::new(Topic::Alerts, "raised", json!(alert))),
        AnalyticsEvent::PatternObserved(pattern) => {
            (Topic::Patterns, ServerMessage::new(Topic::Patterns, "observed", json!(pattern)))
        }
    };

    let mut too_slow = Vec::new();
    for entry in subscribers.iter() {
        let subscriber = entry.value();
        if !subscriber.is_subscribed(topic) {
            continue;
        }
        if subscriber.deliver(topic, message.clone()) == PushOutcome::TooSlow {
            too_slow.push(subscriber.id);
        }
    }
    for id in too_slow {
        if let Some((_, subscriber)) = subscribers.remove(&id) {
            warn!(subscriber = %id, "disconnecting subscriber: queue saturated with alerts");
            subscriber.close();
        }
    }
}

fn tick(subscribers: &DashMap<Uuid, Arc<Subscriber>>) {
    let heartbeat = ServerMessage::heartbeat();
    let mut silent = Vec::new();
    for entry in subscribers.iter() {
        let subscriber = entry.value();
        if subscriber.is_silent_for(SILENCE_TIMEOUT) {
            silent.push(subscriber.id);
            continue;
        }
        subscriber.deliver(Topic::MetricsLive, heartbeat.clone());
    }
    for id in silent {
        if let Some((_, subscriber)) = subscribers.remove(&id) {
            warn!(subscriber = %id, "disconnecting silent subscriber");
            subscriber.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use devforge_analytics::{ExportFormat, StorageBackend, TraceFilter};
    use devforge_tracer::FinishedTrace;

    struct NullStorage;

    #[async_trait]
    impl StorageBackend for NullStorage {
        async fn put(&self, _trace: &FinishedTrace) -> devforge_analytics::Result<()> {
            Ok(())
        }
        async fn query(&self, _filter: &TraceFilter) -> devforge_analytics::Result<Vec<FinishedTrace>> {
            Ok(Vec::new())
        }
        async fn export(&self, _format: ExportFormat, _filter: &TraceFilter) -> devforge_analytics::Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn prune(&self, _older_than: chrono::DateTime<chrono::Utc>) -> devforge_analytics::Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn subscribe_delivers_an_immediate_snapshot() {
        let (pipeline, _handle) = AnalyticsPipeline::spawn(Arc::new(NullStorage));
        let pipeline = Arc::new(pipeline);
        let (hub, _handles) = BroadcastHub::spawn(pipeline);

        let subscriber = hub.subscribe([Topic::MetricsLive]);
        let msg = subscriber.recv().await.unwrap();
        assert_eq!(msg.event, "snapshot");
        assert_eq!(msg.topic, "metrics.live");
    }

    #[tokio::test]
    async fn unsubscribed_topics_receive_nothing() {
        let (pipeline, _handle) = AnalyticsPipeline::spawn(Arc::new(NullStorage));
        let pipeline = Arc::new(pipeline);
        let (hub, _handles) = BroadcastHub::spawn(pipeline);

        let subscriber = hub.subscribe([Topic::Patterns]);
        // Only the Patterns snapshot is queued for a Patterns-only
        // subscriber; nothing was enqueued for the three topics it didn't
        // subscribe to.
        let msg = subscriber.recv().await.unwrap();
        assert_eq!(msg.topic, "patterns");
        assert_eq!(subscriber.queue_len(), 0);
    }
}
