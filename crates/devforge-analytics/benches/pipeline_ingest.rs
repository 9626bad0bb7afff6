//! Throughput of the analytics ingest path — `AnalyticsPipeline::submit`
//! through rolling-metric recomputation (spec §4.5). Run with:
//! cargo bench -p devforge-analytics --bench pipeline_ingest

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use devforge_analytics::{AnalyticsPipeline, ExportFormat, Result, StorageBackend, TraceFilter};
use devforge_tracer::{FinishedTrace, Outcome, RedactionPolicy, TraceLimits, Tracer};

struct NullStorage;

#[async_trait]
impl StorageBackend for NullStorage {
    async fn put(&self, _trace: &FinishedTrace) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _filter: &TraceFilter) -> Result<Vec<FinishedTrace>> {
        Ok(Vec::new())
    }

    async fn export(&self, _format: ExportFormat, _filter: &TraceFilter) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn prune(&self, _older_than: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }
}

fn sample_trace() -> FinishedTrace {
    let t = Tracer::new(uuid::Uuid::new_v4(), None, None, TraceLimits::default(), RedactionPolicy::default());
    let root = t.start_root("bench-tool", "tool", None).unwrap();
    let child = t.start_child(root, "cache-lookup", "cache", None).unwrap();
    t.close(child, Outcome::success(None)).unwrap();
    t.close(root, Outcome::success(None)).unwrap();
    t.finish().unwrap()
}

fn bench_submit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (pipeline, _handle) = rt.block_on(async { AnalyticsPipeline::spawn(Arc::new(NullStorage)) });
    let pipeline = Arc::new(pipeline);

    c.bench_function("pipeline_submit", |b| {
        b.to_async(&rt).iter(|| {
            let pipeline = pipeline.clone();
            async move {
                pipeline.submit(sample_trace()).await;
            }
        });
    });
}

criterion_group!(benches, bench_submit);
criterion_main!(benches);
