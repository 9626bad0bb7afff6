//! C6 Broadcast Fabric: topic-based, connection-oriented fan-out of
//! analytics events, with bounded per-subscriber queues and an
//! alert-preserving overflow policy.

pub mod error;
pub mod hub;
pub mod message;
pub mod queue;
pub mod subscriber;
pub mod topic;

pub use error::{BroadcastError, Result};
pub use hub::{BroadcastHub, HEARTBEAT_INTERVAL, SILENCE_TIMEOUT};
pub use message::{ClientMessage, ServerMessage};
pub use queue::{PushOutcome, SubscriberQueue, DEFAULT_QUEUE_CAPACITY};
pub use subscriber::{DisconnectReason, Subscriber};
pub use topic::Topic;
