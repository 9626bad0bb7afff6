//! An in-process [`StorageBackend`]: the default for tests and for
//! deployments that don't need durability across restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devforge_analytics::{ExportFormat, Result, StorageBackend, TraceFilter};
use devforge_tracer::FinishedTrace;
use parking_lot::RwLock;

use crate::export;

/// Bound on how many traces the in-memory backend retains regardless of
/// retention-day configuration, so a misconfigured prune schedule cannot
/// grow memory unbounded.
const MAX_RETAINED: usize = 100_000;

#[derive(Default)]
pub struct MemoryStorage {
    traces: RwLock<Vec<FinishedTrace>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn put(&self, trace: &FinishedTrace) -> Result<()> {
        let mut traces = self.traces.write();
        traces.push(trace.clone());
        if traces.len() > MAX_RETAINED {
            let overflow = traces.len() - MAX_RETAINED;
            traces.drain(0..overflow);
        }
        Ok(())
    }

    async fn query(&self, filter: &TraceFilter) -> Result<Vec<FinishedTrace>> {
        let traces = self.traces.read();
        let mut matched: Vec<FinishedTrace> = traces.iter().filter(|t| filter.matches(t)).cloned().collect();
        matched.sort_by_key(|t| std::cmp::Reverse(t.root().start));
        Ok(matched)
    }

    async fn export(&self, format: ExportFormat, filter: &TraceFilter) -> Result<Vec<u8>> {
        let matched = self.query(filter).await?;
        export::render(&matched, format)
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut traces = self.traces.write();
        let before = traces.len();
        traces.retain(|t| t.root().start >= older_than);
        Ok((before - traces.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devforge_tracer::{Outcome, RedactionPolicy, TraceLimits, Tracer};
    use uuid::Uuid;

    fn trace(label: &str) -> FinishedTrace {
        let t = Tracer::new(Uuid::new_v4(), None, None, TraceLimits::default(), RedactionPolicy::default());
        let root = t.start_root(label, "tool", None).unwrap();
        t.close(root, Outcome::success(None)).unwrap();
        t.finish().unwrap()
    }

    #[tokio::test]
    async fn put_then_query_round_trips() {
        let storage = MemoryStorage::new();
        storage.put(&trace("echo")).await.unwrap();
        let results = storage.query(&TraceFilter::default()).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn prune_removes_only_older_traces() {
        let storage = MemoryStorage::new();
        storage.put(&trace("echo")).await.unwrap();
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let removed = storage.prune(cutoff).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(storage.query(&TraceFilter::default()).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn json_export_then_reimport_is_byte_identical_on_second_export() {
        let storage = MemoryStorage::new();
        storage.put(&trace("echo")).await.unwrap();
        let first = storage.export(ExportFormat::Json, &TraceFilter::default()).await.unwrap();

        let reimported: Vec<FinishedTrace> = serde_json::from_slice(&first).unwrap();
        let other = MemoryStorage::new();
        for t in &reimported {
            other.put(t).await.unwrap();
        }
        let second = other.export(ExportFormat::Json, &TraceFilter::default()).await.unwrap();
        assert_eq!(first, second);
    }
}
