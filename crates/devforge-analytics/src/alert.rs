//! [`Alert`] (spec §3, §7): threshold-breach notifications raised by the
//! pipeline and pushed to the broadcast fabric's `alerts` topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertType {
    Performance,
    Error,
    Cache,
    Usage,
    Optimization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(kind: AlertType, severity: AlertSeverity, title: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            data,
            resolved: false,
            resolved_at: None,
        }
    }

    /// Mark resolved. Idempotent: calling this twice in a row leaves the
    /// state unchanged and does not bump `resolved_at` on the second call
    /// (spec §8 Idempotence: `resolveAlert(id)` twice ≡ once).
    pub fn resolve(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
    }
}
