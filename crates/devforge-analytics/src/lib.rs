//! C5 Analytics Pipeline: folds the trace stream into rolling metrics,
//! trend series, threshold-derived alerts, and lightweight usage-pattern
//! detection, then hands each trace to a pluggable storage backend.

pub mod alert;
pub mod error;
pub mod metrics;
pub mod pattern;
pub mod pipeline;
pub mod storage;

pub use alert::{Alert, AlertSeverity, AlertType};
pub use error::{AnalyticsError, Result};
pub use metrics::{LiveMetrics, TrendSeries, TrendSeriesSet};
pub use pattern::{PatternCategory, PatternDetector, UsagePattern};
pub use pipeline::{AnalyticsEvent, AnalyticsPipeline, DEFAULT_RING_CAPACITY};
pub use storage::{ExportFormat, StorageBackend, TraceFilter};
