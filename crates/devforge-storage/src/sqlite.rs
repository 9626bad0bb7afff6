//! A durable [`StorageBackend`] backed by SQLite. Blocking `rusqlite` calls
//! run on the tokio blocking pool; the connection itself is guarded by a
//! `parking_lot::Mutex` since `rusqlite::Connection` is `!Sync`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use devforge_analytics::{AnalyticsError, ExportFormat, Result, StorageBackend, TraceFilter};
use devforge_tracer::FinishedTrace;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::export;

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| AnalyticsError::StorageFailure(e.into()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| AnalyticsError::StorageFailure(e.into()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS traces (
                request_id TEXT PRIMARY KEY,
                root_label TEXT NOT NULL,
                success INTEGER NOT NULL,
                start_ms INTEGER NOT NULL,
                payload TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| AnalyticsError::StorageFailure(e.into()))?;
        conn.execute("CREATE INDEX IF NOT EXISTS traces_start_ms ON traces(start_ms)", [])
            .map_err(|e| AnalyticsError::StorageFailure(e.into()))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| AnalyticsError::StorageFailure(e.into()))?
        .map_err(|e| AnalyticsError::StorageFailure(e.into()))
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn put(&self, trace: &FinishedTrace) -> Result<()> {
        let trace = trace.clone();
        let payload = serde_json::to_string(&trace).map_err(|e| AnalyticsError::StorageFailure(e.into()))?;
        let request_id = trace.request_id.to_string();
        let root_label = trace.root().label.clone();
        let success = trace.succeeded() as i64;
        let start_ms = trace.root().start.timestamp_millis();

        self.with_connection(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO traces (request_id, root_label, success, start_ms, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![request_id, root_label, success, start_ms, payload],
            )
            .map(|_| ())
        })
        .await
    }

    async fn query(&self, filter: &TraceFilter) -> Result<Vec<FinishedTrace>> {
        let filter = filter.clone();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare("SELECT payload FROM traces ORDER BY start_ms DESC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut traces = Vec::new();
            for row in rows {
                let payload = row?;
                if let Ok(trace) = serde_json::from_str::<FinishedTrace>(&payload) {
                    if filter.matches(&trace) {
                        traces.push(trace);
                    }
                }
            }
            Ok(traces)
        })
        .await
    }

    async fn export(&self, format: ExportFormat, filter: &TraceFilter) -> Result<Vec<u8>> {
        let matched = self.query(filter).await?;
        export::render(&matched, format)
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let cutoff_ms = older_than.timestamp_millis();
        self.with_connection(move |conn| {
            let affected = conn.execute("DELETE FROM traces WHERE start_ms < ?1", params![cutoff_ms])?;
            Ok(affected as u64)
        })
        .await
    }
}

/// Convert a millisecond timestamp back into a `DateTime<Utc>`, used only
/// by tests exercising the raw schema.
#[cfg(test)]
fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().expect("valid timestamp")
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
    async fn put_then_query_round_trips_through_sqlite() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.put(&trace("echo")).await.unwrap();
        let results = storage.query(&TraceFilter::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].root().label, "echo");
    }

    #[tokio::test]
    async fn prune_deletes_rows_older_than_cutoff() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.put(&trace("echo")).await.unwrap();
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let removed = storage.prune(cutoff).await.unwrap();
        assert_eq!(removed, 1);
        assert!(storage.query(&TraceFilter::default()).await.unwrap().is_empty());
    }

    #[test]
    fn millis_round_trip_is_lossless_at_millisecond_precision() {
        let now = Utc::now();
        let back = millis_to_datetime(now.timestamp_millis());
        assert_eq!(now.timestamp_millis(), back.timestamp_millis());
    }
}
