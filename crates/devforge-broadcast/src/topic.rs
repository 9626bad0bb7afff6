//! Broadcast topics (spec §4.6): the fixed subset a subscriber may pick
//! from.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    #[serde(rename = "metrics.live")]
    MetricsLive,
    #[serde(rename = "metrics.trends")]
    MetricsTrends,
    Alerts,
    Patterns,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::MetricsLive, Topic::MetricsTrends, Topic::Alerts, Topic::Patterns];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::MetricsLive => "metrics.live",
            Topic::MetricsTrends => "metrics.trends",
            Topic::Alerts => "alerts",
            Topic::Patterns => "patterns",
        }
    }

    pub fn parse(s: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.as_str() == s)
    }
}
