//! C2 Resource Pool (spec §4.2): bounded connection pooling with a
//! lifecycle manager that evicts unhealthy idle connections.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::capability::{ConnectionHandle, HealthStatus, ResourceBody};
use crate::descriptor::ResourceDescriptor;
use crate::error::{CoreError, Result};

struct IdleConnection {
    handle: ConnectionHandle,
    idle_since: Instant,
}

/// One checked-out connection. Dropping it without calling
/// [`PooledConnection::release`] still returns the connection to the pool
/// via `Drop`, so a panicking tool body cannot leak permits.
pub struct PooledConnection {
    handle: Option<ConnectionHandle>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    pub fn handle(&self) -> &ConnectionHandle {
        self.handle.as_ref().expect("handle only taken on drop/release")
    }

    /// Return the connection to the idle pool for reuse.
    pub fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.clone().return_to_idle(handle);
        }
    }

    /// Discard the connection instead of returning it to the idle pool
    /// (e.g. the tool body detected it was broken). The resource body's
    /// `close_connection` still runs and the permit is still released.
    pub fn discard(mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.clone().discard_connection(handle);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.clone().return_to_idle(handle);
        }
    }
}

struct PoolInner {
    name: String,
    body: Arc<dyn ResourceBody>,
    /// Sized to `max_connections`; acquired before any idle-pool lookup or
    /// connection creation and held for the connection's entire
    /// active-or-idle lifetime. This structurally guarantees
    /// `|active| + |idle| <= max_connections` without separate bookkeeping,
    /// and gives FIFO-fair waiter ordering for free.
    permits: Semaphore,
    idle: Mutex<VecDeque<IdleConnection>>,
    max_idle_time: Duration,
    created_total: AtomicU64,
    acquired_total: AtomicU64,
    active_count: AtomicU32,
}

/// Bounds a resource's live connections to `max_connections`, reusing idle
/// ones and creating new ones on demand up to that bound.
pub struct ResourcePool {
    inner: Arc<PoolInner>,
}

impl ResourcePool {
    pub fn new(descriptor: &ResourceDescriptor, body: Arc<dyn ResourceBody>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name: descriptor.name.clone(),
                body,
                permits: Semaphore::new(descriptor.max_connections as usize),
                idle: Mutex::new(VecDeque::new()),
                max_idle_time: Duration::from_secs(300),
                created_total: AtomicU64::new(0),
                acquired_total: AtomicU64::new(0),
                active_count: AtomicU32::new(0),
            }),
        }
    }

    /// Acquire a connection, waiting up to `deadline` for a permit. Reuses
    /// an idle connection that still probes healthy, otherwise creates a
    /// fresh one (spec §4.2: acquire path tries reuse before creation).
    pub async fn acquire(&self, deadline: Duration) -> Result<PooledConnection> {
        let permit = tokio::time::timeout(deadline, self.inner.permits.acquire())
            .await
            .map_err(|_| CoreError::ResourceUnavailable(format!("{}: acquire timed out", self.inner.name)))?
            .map_err(|_| CoreError::ResourceUnavailable(format!("{}: pool closed", self.inner.name)))?;
        // The semaphore permit's lifetime is the connection's checkout
        // lifetime; forgetting it here hands accounting over to
        // `PooledConnection::drop`/`release`, which adds a permit back.
        permit.forget();

        self.inner.acquired_total.fetch_add(1, Ordering::Relaxed);
        self.inner.active_count.fetch_add(1, Ordering::AcqRel);

        let reused = self.inner.idle.lock().pop_front();
        let handle = match reused {
            Some(idle) if self.inner.body.probe(&idle.handle).await => idle.handle,
            Some(stale) => {
                self.inner.body.close_connection(&stale.handle).await;
                self.create_connection().await?
            }
            None => self.create_connection().await?,
        };

        Ok(PooledConnection { handle: Some(handle), pool: self.inner.clone() })
    }

    async fn create_connection(&self) -> Result<ConnectionHandle> {
        let handle = self.inner.body.create_connection().await?;
        self.inner.created_total.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Drop every idle connection that has exceeded `max_idle_time` or
    /// fails a fresh health probe (spec §4.2 Lifecycle manager, run on the
    /// Health Monitor's periodic tick).
    pub async fn cleanup_idle(&self) {
        let stale: Vec<IdleConnection> = {
            let mut idle = self.inner.idle.lock();
            let cutoff = Instant::now();
            let mut keep = VecDeque::new();
            let mut stale = Vec::new();
            while let Some(conn) = idle.pop_front() {
                if cutoff.duration_since(conn.idle_since) > self.inner.max_idle_time {
                    stale.push(conn);
                } else {
                    keep.push_back(conn);
                }
            }
            *idle = keep;
            stale
        };
        for conn in stale {
            debug!(resource = %self.inner.name, connection = %conn.handle.id, "evicting idle connection");
            self.inner.body.close_connection(&conn.handle).await;
            // `return_to_idle` already released the permit and active slot
            // when this connection went idle; it holds neither now.
        }
    }

    /// Aggregate health for this resource (spec §4.2): delegates the
    /// healthy/degraded/unhealthy classification to the resource body,
    /// which is expected to fold in its own error-rate/latency/memory
    /// thresholds.
    pub async fn health_check(&self) -> HealthStatus {
        let status = self.inner.body.health_check().await;
        if matches!(status, HealthStatus::Unhealthy) {
            warn!(resource = %self.inner.name, "resource reported unhealthy");
        }
        status
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.inner.active_count.load(Ordering::Acquire),
            idle: self.inner.idle.lock().len() as u32,
            created_total: self.inner.created_total.load(Ordering::Relaxed),
            acquired_total: self.inner.acquired_total.load(Ordering::Relaxed),
        }
    }
}

impl PoolInner {
    fn return_to_idle(self: Arc<Self>, handle: ConnectionHandle) {
        self.idle.lock().push_back(IdleConnection { handle, idle_since: Instant::now() });
        self.active_count.fetch_sub(1, Ordering::AcqRel);
        self.permits.add_permits(1);
    }

    fn discard_connection(self: Arc<Self>, handle: ConnectionHandle) {
        let body = self.body.clone();
        let inner = self.clone();
        tokio::spawn(async move {
            body.close_connection(&handle).await;
            inner.active_count.fetch_sub(1, Ordering::AcqRel);
            inner.permits.add_permits(1);
        });
    }
}

/// Point-in-time pool occupancy, surfaced by the Analytics Pipeline and
/// health endpoints.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub active: u32,
    pub idle: u32,
    pub created_total: u64,
    pub acquired_total: u64,
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32 as StdAtomicU32, Ordering as O};

    use super::*;
    use crate::descriptor::ResourceKind;

    struct CountingResource {
        created: Arc<StdAtomicU32>,
        closed: Arc<StdAtomicU32>,
        healthy_probe: bool,
    }

    #[async_trait]
    impl ResourceBody for CountingResource {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn create_connection(&self) -> Result<ConnectionHandle> {
            self.created.fetch_add(1, O::SeqCst);
            Ok(ConnectionHandle { id: uuid::Uuid::new_v4(), resource_name: "r".into() })
        }

        async fn probe(&self, _handle: &ConnectionHandle) -> bool {
            self.healthy_probe
        }

        async fn close_connection(&self, _handle: &ConnectionHandle) {
            self.closed.fetch_add(1, O::SeqCst);
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Healthy
        }

        async fn cleanup(&self) -> Result<()> {
            Ok(())
        }
    }

    fn descriptor(max: u32) -> ResourceDescriptor {
        ResourceDescriptor::new(
            "r",
            ResourceKind::Database,
            semver::Version::new(1, 0, 0),
            json!({}),
            max,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn acquire_blocks_past_capacity_and_release_unblocks() {
        let created = Arc::new(StdAtomicU32::new(0));
        let closed = Arc::new(StdAtomicU32::new(0));
        let body = Arc::new(CountingResource { created: created.clone(), closed, healthy_probe: true });
        let pool = ResourcePool::new(&descriptor(1), body);

        let conn = pool.acquire(Duration::from_millis(50)).await.unwrap();
        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.kind(), "ResourceUnavailable");

        conn.release();
        let second = pool.acquire(Duration::from_millis(50)).await.unwrap();
        second.release();
        assert_eq!(created.load(O::SeqCst), 1, "second acquire should reuse the released connection");
    }

    #[tokio::test]
    async fn unhealthy_idle_connection_is_recreated() {
        let created = Arc::new(StdAtomicU32::new(0));
        let closed = Arc::new(StdAtomicU32::new(0));
        let body =
            Arc::new(CountingResource { created: created.clone(), closed: closed.clone(), healthy_probe: false });
        let pool = ResourcePool::new(&descriptor(2), body);

        let conn = pool.acquire(Duration::from_millis(50)).await.unwrap();
        conn.release();
        let conn2 = pool.acquire(Duration::from_millis(50)).await.unwrap();
        conn2.release();

        assert_eq!(created.load(O::SeqCst), 2);
        assert_eq!(closed.load(O::SeqCst), 1);
    }

    #[tokio::test]
    async fn stats_reflect_active_and_idle_counts() {
        let created = Arc::new(StdAtomicU32::new(0));
        let closed = Arc::new(StdAtomicU32::new(0));
        let body = Arc::new(CountingResource { created, closed, healthy_probe: true });
        let pool = ResourcePool::new(&descriptor(3), body);

        let conn = pool.acquire(Duration::from_millis(50)).await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.idle, 0);

        conn.release();
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 1);
    }
}
