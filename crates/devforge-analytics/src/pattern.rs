//! [`UsagePattern`] detection (spec §4.5): lightweight, rule-based
//! observations over the trace stream — repetition, error bursts, and
//! slow paths. No ML assumed.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use devforge_tracer::FinishedTrace;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Window of recent trace signatures considered for repetition detection.
const SIGNATURE_WINDOW: usize = 50;
/// Minimum repeat count within the window to emit a `repetition` pattern.
const REPETITION_THRESHOLD: usize = 5;
/// Error-burst window and threshold (spec §4.5).
const ERROR_BURST_WINDOW: ChronoDuration = ChronoDuration::seconds(60);
const ERROR_BURST_THRESHOLD: usize = 3;
/// How many recent per-tool durations constitute "last-10" for slow-path.
const SLOW_PATH_RECENT: usize = 10;
/// Re-emission within this window updates frequency instead of creating a
/// new pattern (spec §4.5).
const DEDUP_WINDOW: ChronoDuration = ChronoDuration::minutes(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    Repetition,
    ErrorBurst,
    SlowPath,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsagePattern {
    pub id: Uuid,
    pub category: PatternCategory,
    pub description: String,
    pub frequency: u64,
    pub confidence: f64,
    pub insights: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// The dedup key (e.g. a signature string, or a tool name) this pattern
    /// tracks; re-emissions within [`DEDUP_WINDOW`] of the same key update
    /// this pattern rather than creating a new one.
    #[serde(skip)]
    dedup_key: String,
}

/// Stateful, incremental pattern detector fed one [`FinishedTrace`] at a
/// time by the pipeline's ingest step.
pub struct PatternDetector {
    recent_signatures: VecDeque<(DateTime<Utc>, String)>,
    tool_errors: HashMap<String, VecDeque<DateTime<Utc>>>,
    tool_durations: HashMap<String, VecDeque<i64>>,
    tool_duration_totals: HashMap<String, (u64, i64)>,
    patterns: Vec<UsagePattern>,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternDetector {
    pub fn new() -> Self {
        Self {
            recent_signatures: VecDeque::with_capacity(SIGNATURE_WINDOW),
            tool_errors: HashMap::new(),
            tool_durations: HashMap::new(),
            tool_duration_totals: HashMap::new(),
            patterns: Vec::new(),
        }
    }

    pub fn patterns(&self) -> &[UsagePattern] {
        &self.patterns
    }

    /// Feed one finished trace through all three detectors, returning the
    /// patterns newly created or updated by this trace (for publication to
    /// the broadcast fabric).
    pub fn observe(&mut self, trace: &FinishedTrace) -> Vec<UsagePattern> {
        let mut touched = Vec::new();
        let now = trace.root().end.unwrap_or_else(Utc::now);
        let tool = trace.root().label.clone();

        if let Some(p) = self.observe_repetition(trace, now) {
            touched.push(p);
        }
        if !trace.succeeded() {
            if let Some(p) = self.observe_error_burst(&tool, now) {
                touched.push(p);
            }
        }
        if let Some(duration) = trace.root().duration_ms {
            if let Some(p) = self.observe_slow_path(&tool, duration, now) {
                touched.push(p);
            }
        }

        touched
    }

    fn observe_repetition(&mut self, trace: &FinishedTrace, now: DateTime<Utc>) -> Option<UsagePattern> {
        let signature = format!("{}|{}", trace.root().label, trace.signature().join(","));
        self.recent_signatures.push_back((now, signature.clone()));
        while self.recent_signatures.len() > SIGNATURE_WINDOW {
            self.recent_signatures.pop_front();
        }

        let count = self.recent_signatures.iter().filter(|(_, s)| *s == signature).count();
        if count < REPETITION_THRESHOLD {
            return None;
        }

        let window = self.recent_signatures.len().max(1);
        let confidence = (count as f64 / window as f64).min(1.0);
        Some(self.upsert_pattern(
            PatternCategory::Repetition,
            &signature,
            now,
            count as u64,
            confidence,
            format!("signature '{signature}' repeated {count} times in the last {window} traces"),
            vec![format!("signature: {signature}")],
        ))
    }

    fn observe_error_burst(&mut self, tool: &str, now: DateTime<Utc>) -> Option<UsagePattern> {
        let errors = self.tool_errors.entry(tool.to_string()).or_default();
        errors.push_back(now);
        while let Some(front) = errors.front() {
            if now - *front > ERROR_BURST_WINDOW {
                errors.pop_front();
            } else {
                break;
            }
        }
        let count = errors.len();
        if count < ERROR_BURST_THRESHOLD {
            return None;
        }

        let confidence = (count as f64 / ERROR_BURST_THRESHOLD as f64 * 0.8).min(1.0).max(0.8);
        Some(self.upsert_pattern(
            PatternCategory::ErrorBurst,
            &format!("error-burst:{tool}"),
            now,
            count as u64,
            confidence,
            format!("{count} errors on tool '{tool}' within {}s", ERROR_BURST_WINDOW.num_seconds()),
            vec![format!("tool: {tool}")],
        ))
    }

    fn observe_slow_path(&mut self, tool: &str, duration_ms: i64, now: DateTime<Utc>) -> Option<UsagePattern> {
        let recent = self.tool_durations.entry(tool.to_string()).or_default();
        recent.push_back(duration_ms);
        while recent.len() > SLOW_PATH_RECENT {
            recent.pop_front();
        }
        let totals = self.tool_duration_totals.entry(tool.to_string()).or_insert((0, 0));
        totals.0 += 1;
        totals.1 += duration_ms;

        if totals.0 < SLOW_PATH_RECENT as u64 {
            return None;
        }
        let all_time_avg = totals.1 as f64 / totals.0 as f64;
        let recent_avg = recent.iter().sum::<i64>() as f64 / recent.len() as f64;
        if all_time_avg <= 0.0 || recent_avg <= 2.0 * all_time_avg {
            return None;
        }

        Some(self.upsert_pattern(
            PatternCategory::SlowPath,
            &format!("slow-path:{tool}"),
            now,
            1,
            0.7,
            format!("tool '{tool}' last-{SLOW_PATH_RECENT} avg {recent_avg:.0}ms exceeds 2x all-time avg {all_time_avg:.0}ms"),
            vec![format!("tool: {tool}"), format!("recent_avg_ms: {recent_avg:.0}"), format!("all_time_avg_ms: {all_time_avg:.0}")],
        ))
    }

    fn upsert_pattern(
        &mut self,
        category: PatternCategory,
        dedup_key: &str,
        now: DateTime<Utc>,
        frequency_delta: u64,
        confidence: f64,
        description: String,
        insights: Vec<String>,
    ) -> UsagePattern {
        if let Some(existing) = self
            .patterns
            .iter_mut()
            .find(|p| p.category == category && p.dedup_key == dedup_key && now - p.last_seen <= DEDUP_WINDOW)
        {
            existing.frequency += frequency_delta;
            existing.last_seen = now;
            existing.confidence = confidence;
            existing.description = description;
            existing.insights = insights;
            return existing.clone();
        }

        let pattern = UsagePattern {
            id: Uuid::new_v4(),
            category,
            description,
            frequency: frequency_delta,
            confidence,
            insights,
            first_seen: now,
            last_seen: now,
            dedup_key: dedup_key.to_string(),
        };
        self.patterns.push(pattern.clone());
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devforge_tracer::{Outcome, RedactionPolicy, TraceLimits, Tracer};

    fn failed_trace(label: &str) -> FinishedTrace {
        let t = Tracer::new(Uuid::new_v4(), None, None, TraceLimits::default(), RedactionPolicy::default());
        let root = t.start_root(label, "tool", None).unwrap();
        t.close(
            root,
            Outcome::failure(devforge_tracer::ErrorDescriptor::new("TransientIO", "boom")),
        )
        .unwrap();
        t.finish().unwrap()
    }

    #[test]
    fn error_burst_fires_after_threshold_within_window() {
        let mut detector = PatternDetector::new();
        let mut last = Vec::new();
        for _ in 0..3 {
            last = detector.observe(&failed_trace("flaky"));
        }
        assert!(last.iter().any(|p| p.category == PatternCategory::ErrorBurst));
        let pattern = last.iter().find(|p| p.category == PatternCategory::ErrorBurst).unwrap();
        assert_eq!(pattern.frequency, 3);
        assert!(pattern.confidence >= 0.8);
    }

    #[test]
    fn repetition_requires_the_configured_threshold() {
        let mut detector = PatternDetector::new();
        let mut touched = Vec::new();
        for _ in 0..4 {
            touched = detector.observe(&successful_trace("echo"));
        }
        assert!(touched.iter().all(|p| p.category != PatternCategory::Repetition));
        let touched = detector.observe(&successful_trace("echo"));
        assert!(touched.iter().any(|p| p.category == PatternCategory::Repetition));
    }

    fn successful_trace(label: &str) -> FinishedTrace {
        let t = Tracer::new(Uuid::new_v4(), None, None, TraceLimits::default(), RedactionPolicy::default());
        let root = t.start_root(label, "tool", None).unwrap();
        t.close(root, Outcome::success(None)).unwrap();
        t.finish().unwrap()
    }
}
