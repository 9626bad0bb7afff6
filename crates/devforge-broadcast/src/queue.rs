//! Per-subscriber bounded outgoing queue with the overflow policy from
//! spec §4.6: drop oldest non-alert messages first; alerts are preserved
//! until the queue is saturated with alerts, at which point the subscriber
//! is disconnected with reason `too-slow`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::message::ServerMessage;

/// Default per-subscriber queue capacity (spec §4.6).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_024;

struct QueueItem {
    message: ServerMessage,
    is_alert: bool,
}

/// Outcome of pushing a message onto a subscriber's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Accepted (possibly by evicting an older non-alert message).
    Delivered,
    /// Silently dropped: a non-alert message arrived while the queue was
    /// saturated with alerts.
    Dropped,
    /// The queue was already saturated with alerts and an alert could not
    /// be placed; the caller should disconnect the subscriber.
    TooSlow,
}

pub struct SubscriberQueue {
    items: Mutex<VecDeque<QueueItem>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriberQueue {
    pub fn new(capacity: usize) -> Self {
        Self { items: Mutex::new(VecDeque::with_capacity(capacity)), capacity, notify: Notify::new(), closed: AtomicBool::new(false) }
    }

    pub fn push(&self, message: ServerMessage, is_alert: bool) -> PushOutcome {
        let mut items = self.items.lock();
        if items.len() < self.capacity {
            items.push_back(QueueItem { message, is_alert });
            drop(items);
            self.notify.notify_one();
            return PushOutcome::Delivered;
        }

        if let Some(pos) = items.iter().position(|i| !i.is_alert) {
            items.remove(pos);
            items.push_back(QueueItem { message, is_alert });
            drop(items);
            self.notify.notify_one();
            return PushOutcome::Delivered;
        }

        if is_alert {
            PushOutcome::TooSlow
        } else {
            PushOutcome::Dropped
        }
    }

    /// Wait for and remove the oldest queued message. Returns `None` once
    /// the queue is closed and drained.
    pub async fn pop(&self) -> Option<ServerMessage> {
        loop {
            {
                let mut items = self.items.lock();
                if let Some(item) = items.pop_front() {
                    return Some(item.message);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}
