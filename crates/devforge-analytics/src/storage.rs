//! The storage backend contract (spec §6): an external collaborator the
//! pipeline persists finished traces through. Implementations live in
//! `devforge-storage`; this crate only defines the trait boundary so the
//! pipeline can depend on it without depending on any concrete backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devforge_tracer::FinishedTrace;

use crate::error::Result;

/// Export format for `StorageBackend::export` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Query/export filter (spec §6: `{timeRange, tools?, roles?, success?}`).
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub tools: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
    pub success: Option<bool>,
}

impl TraceFilter {
    pub fn matches(&self, trace: &FinishedTrace) -> bool {
        let root = trace.root();
        if let Some(since) = self.since {
            if root.start < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if root.start > until {
                return false;
            }
        }
        if let Some(tools) = &self.tools {
            if !tools.iter().any(|t| t == &root.label) {
                return false;
            }
        }
        if let Some(success) = self.success {
            if trace.succeeded() != success {
                return false;
            }
        }
        true
    }
}

/// The persistence contract the pipeline hands finished traces through
/// (spec §6). Failures are logged and absorbed by the pipeline — a
/// `StorageFailure` never propagates to an invocation caller (spec §7).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put(&self, trace: &FinishedTrace) -> Result<()>;

    /// Traces matching `filter`, newest first.
    async fn query(&self, filter: &TraceFilter) -> Result<Vec<FinishedTrace>>;

    /// Serialize matching traces in `format`.
    async fn export(&self, format: ExportFormat, filter: &TraceFilter) -> Result<Vec<u8>>;

    /// Delete traces older than `older_than`, returning the count removed.
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64>;
}
