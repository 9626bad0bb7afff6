//! A connected subscriber: its topic subscriptions, outgoing queue, and
//! liveness bookkeeping (spec §4.6).

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::message::ServerMessage;
use crate::queue::{PushOutcome, SubscriberQueue, DEFAULT_QUEUE_CAPACITY};
use crate::topic::Topic;

/// Why a subscriber's connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    TooSlow,
    SilentTimeout,
    ServerShutdown,
    ClientClosed,
}

pub struct Subscriber {
    pub id: Uuid,
    pub subscribed_at: chrono::DateTime<Utc>,
    topics: RwLock<HashSet<Topic>>,
    queue: Arc<SubscriberQueue>,
    last_activity_millis: AtomicI64,
}

impl Subscriber {
    pub fn new(topics: impl IntoIterator<Item = Topic>) -> Arc<Self> {
        Self::with_capacity(topics, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(topics: impl IntoIterator<Item = Topic>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            subscribed_at: Utc::now(),
            topics: RwLock::new(topics.into_iter().collect()),
            queue: Arc::new(SubscriberQueue::new(capacity)),
            last_activity_millis: AtomicI64::new(Utc::now().timestamp_millis()),
        })
    }

    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.topics.read().contains(&topic)
    }

    pub fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) {
        self.topics.write().extend(topics);
    }

    pub fn unsubscribe(&self, topics: impl IntoIterator<Item = Topic>) {
        let mut current = self.topics.write();
        for topic in topics {
            current.remove(&topic);
        }
    }

    /// Deliver a message according to the topic's priority (alerts are
    /// preserved over other traffic during overflow).
    pub fn deliver(&self, topic: Topic, message: ServerMessage) -> PushOutcome {
        self.queue.push(message, topic == Topic::Alerts)
    }

    pub async fn recv(&self) -> Option<ServerMessage> {
        self.queue.pop().await
    }

    pub fn close(&self) {
        self.queue.close();
    }

    pub fn record_activity(&self) {
        self.last_activity_millis.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// `true` if no activity has been recorded within `silence` of now.
    pub fn is_silent_for(&self, silence: chrono::Duration) -> bool {
        let last = self.last_activity_millis.load(Ordering::Relaxed);
        let elapsed = Utc::now().timestamp_millis() - last;
        elapsed > silence.num_milliseconds()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}
