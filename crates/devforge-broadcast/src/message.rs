//! The wire-level server message (spec §6): `{topic, event, data}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::topic::Topic;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    pub topic: String,
    pub event: String,
    pub data: Value,
    #[serde(skip)]
    pub at: DateTime<Utc>,
}

impl ServerMessage {
    pub fn new(topic: Topic, event: impl Into<String>, data: Value) -> Self {
        Self { topic: topic.as_str().to_string(), event: event.into(), data, at: Utc::now() }
    }

    pub fn heartbeat() -> Self {
        Self { topic: "system".to_string(), event: "ping".to_string(), data: Value::Null, at: Utc::now() }
    }
}

/// A subscriber's inbound control message: `{"op":"subscribe","topics":[...]}`
/// (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ClientMessage {
    Subscribe { topics: Vec<String> },
    Unsubscribe { topics: Vec<String> },
    Pong,
}
