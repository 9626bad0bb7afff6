//! [`LiveMetrics`] and [`TrendSeries`] (spec §3): the pipeline's
//! single-writer, atomically-swapped snapshot state.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default horizon for a single trend series (spec §4.5: "default 100
/// points each").
pub const DEFAULT_TREND_POINTS: usize = 100;

/// A process-wide, atomically readable snapshot of current operating
/// conditions (spec §3). The pipeline worker is the sole writer; every
/// other reader sees a consistent, whole-struct clone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveMetrics {
    pub avg_response_time_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub request_rate_per_min: f64,
    pub error_rate: f64,
    pub memory_usage_fraction: f64,
    pub cpu_usage_fraction: f64,
    pub cache_hit_rate: f64,
    pub fallback_rate: f64,
    pub active_alert_count: u32,
    pub health_score: u8,
    pub last_updated: DateTime<Utc>,
    pub total_requests: u64,
    pub total_errors: u64,
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self {
            avg_response_time_ms: 0.0,
            p50_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            request_rate_per_min: 0.0,
            error_rate: 0.0,
            memory_usage_fraction: 0.0,
            cpu_usage_fraction: 0.0,
            cache_hit_rate: 1.0,
            fallback_rate: 0.0,
            active_alert_count: 0,
            health_score: 100,
            last_updated: Utc::now(),
            total_requests: 0,
            total_errors: 0,
        }
    }
}

impl LiveMetrics {
    /// The health-score formula (spec §4.5 step 5): start at 100 and
    /// subtract weighted penalties for each threshold breached, clamped to
    /// `[0, 100]`.
    pub fn compute_health_score(
        error_rate: f64,
        avg_response_time_ms: f64,
        cache_hit_rate: f64,
        fallback_rate: f64,
    ) -> u8 {
        let mut score: i32 = 100;

        if error_rate > 0.10 {
            score -= 30;
        } else if error_rate > 0.05 {
            score -= 15;
        }

        if avg_response_time_ms > 2_000.0 {
            score -= 25;
        } else if avg_response_time_ms > 1_000.0 {
            score -= 10;
        }

        if cache_hit_rate < 0.30 {
            score -= 20;
        } else if cache_hit_rate < 0.50 {
            score -= 10;
        }

        if fallback_rate > 0.50 {
            score -= 15;
        }

        score.clamp(0, 100) as u8
    }
}

/// A bounded ring of `(timestamp, value)` pairs over a configured horizon
/// for a single named metric (spec §3, §4.5 step 4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendSeries {
    pub name: String,
    pub points: VecDeque<(DateTime<Utc>, f64)>,
    pub horizon: usize,
}

impl TrendSeries {
    pub fn new(name: impl Into<String>, horizon: usize) -> Self {
        Self { name: name.into(), points: VecDeque::with_capacity(horizon), horizon }
    }

    /// Append a point, evicting the oldest once `horizon` is exceeded.
    pub fn push(&mut self, at: DateTime<Utc>, value: f64) {
        self.points.push_back((at, value));
        while self.points.len() > self.horizon {
            self.points.pop_front();
        }
    }

    pub fn latest(&self) -> Option<f64> {
        self.points.back().map(|(_, v)| *v)
    }
}

/// The set of named trend series the pipeline tracks (spec §4.5: "response
/// time, error rate, memory, CPU, throughput").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendSeriesSet {
    pub series: HashMap<String, TrendSeries>,
}

pub const RESPONSE_TIME: &str = "response_time_ms";
pub const ERROR_RATE: &str = "error_rate";
pub const MEMORY: &str = "memory_usage_fraction";
pub const CPU: &str = "cpu_usage_fraction";
pub const THROUGHPUT: &str = "request_rate_per_min";

impl Default for TrendSeriesSet {
    fn default() -> Self {
        let mut series = HashMap::new();
        for name in [RESPONSE_TIME, ERROR_RATE, MEMORY, CPU, THROUGHPUT] {
            series.insert(name.to_string(), TrendSeries::new(name, DEFAULT_TREND_POINTS));
        }
        Self { series }
    }
}

impl TrendSeriesSet {
    pub fn push(&mut self, name: &str, at: DateTime<Utc>, value: f64) {
        if let Some(s) = self.series.get_mut(name) {
            s.push(at, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_score_clamps_to_zero_under_compounding_penalties() {
        let score = LiveMetrics::compute_health_score(0.5, 5_000.0, 0.1, 0.9);
        assert_eq!(score, 0);
    }

    #[test]
    fn health_score_is_full_when_all_metrics_are_good() {
        let score = LiveMetrics::compute_health_score(0.0, 10.0, 1.0, 0.0);
        assert_eq!(score, 100);
    }

    #[test]
    fn trend_series_evicts_oldest_past_horizon() {
        let mut series = TrendSeries::new("x", 3);
        for i in 0..5 {
            series.push(Utc::now(), i as f64);
        }
        assert_eq!(series.points.len(), 3);
        assert_eq!(series.latest(), Some(4.0));
    }
}
