//! C1 Registry (spec §4.1): name-keyed storage for tools, resources, and
//! prompts, with bootstrap-only registration and ordered lifecycle hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::capability::{PromptBody, ResourceBody, ToolBody};
use crate::descriptor::{PromptDescriptor, ResourceDescriptor, ToolDescriptor};
use crate::entry::{EntryKind, RegistryEntry};
use crate::error::{CoreError, Result};

/// Name-keyed storage for the three entry kinds, with registration gated to
/// the bootstrap phase and initialize/shutdown hooks run in (and reverse)
/// registration order (spec §4.1 invariants).
pub struct Registry {
    tools: DashMap<String, RegistryEntry>,
    resources: DashMap<String, RegistryEntry>,
    prompts: DashMap<String, RegistryEntry>,
    /// Registration order across all three maps, needed for reverse-order
    /// shutdown regardless of kind.
    order: Mutex<Vec<(EntryKind, String)>>,
    initialized: AtomicBool,
    shutting_down: AtomicBool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            resources: DashMap::new(),
            prompts: DashMap::new(),
            order: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        }
    }

    fn map_for(&self, kind: EntryKind) -> &DashMap<String, RegistryEntry> {
        match kind {
            EntryKind::Tool => &self.tools,
            EntryKind::Resource => &self.resources,
            EntryKind::Prompt => &self.prompts,
        }
    }

    fn check_can_register(&self, kind: EntryKind, name: &str) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Err(CoreError::AlreadyInitialized {
                kind: kind.label(),
                name: name.to_string(),
            });
        }
        if self.map_for(kind).contains_key(name) {
            return Err(CoreError::DuplicateName {
                kind: kind.label(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn insert(&self, kind: EntryKind, name: String, entry: RegistryEntry) {
        self.order.lock().push((kind, name.clone()));
        self.map_for(kind).insert(name, entry);
    }

    /// Register a tool. Errors on name collision or if called after
    /// [`Registry::initialize_all`] (spec §4.1).
    pub fn register_tool(
        &self,
        descriptor: ToolDescriptor,
        body: Arc<dyn ToolBody>,
    ) -> Result<()> {
        self.check_can_register(EntryKind::Tool, &descriptor.name)?;
        let name = descriptor.name.clone();
        self.insert(EntryKind::Tool, name, RegistryEntry::Tool { descriptor, body });
        Ok(())
    }

    /// Register a resource.
    pub fn register_resource(
        &self,
        descriptor: ResourceDescriptor,
        body: Arc<dyn ResourceBody>,
    ) -> Result<()> {
        self.check_can_register(EntryKind::Resource, &descriptor.name)?;
        let name = descriptor.name.clone();
        self.insert(
            EntryKind::Resource,
            name,
            RegistryEntry::Resource { descriptor, body },
        );
        Ok(())
    }

    /// Register a prompt. `body` is `None` for descriptors that rely on the
    /// default `{{variable}}` renderer (spec §3).
    pub fn register_prompt(
        &self,
        descriptor: PromptDescriptor,
        body: Option<Arc<dyn PromptBody>>,
    ) -> Result<()> {
        self.check_can_register(EntryKind::Prompt, &descriptor.name)?;
        let name = descriptor.name.clone();
        self.insert(EntryKind::Prompt, name, RegistryEntry::Prompt { descriptor, body });
        Ok(())
    }

    /// Look up an entry by kind and name. Fails with
    /// [`CoreError::NotInitialized`] before `initialize_all` has run, and
    /// [`CoreError::NotFound`]/[`CoreError::ToolNotFound`] otherwise (spec
    /// §9 Open Questions: lookup is initialize-gated, registration is not).
    pub fn lookup(&self, kind: EntryKind, name: &str) -> Result<RegistryEntry> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(CoreError::NotInitialized);
        }
        self.map_for(kind)
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| match kind {
                EntryKind::Tool => CoreError::ToolNotFound(name.to_string()),
                other => CoreError::NotFound { kind: other.label(), name: name.to_string() },
            })
    }

    /// List all registered names of a given kind, sorted lexicographically
    /// for deterministic output (spec §4.1) — registration order is still
    /// what `initialize_all`/`shutdown` walk, but callers of `list` get a
    /// stable ordering independent of registration sequence.
    pub fn list(&self, kind: EntryKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .order
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Run every resource body's `initialize()` in registration order,
    /// stopping at the first failure (spec §4.1: bootstrap is sequential and
    /// fail-fast, unlike the parallel, fault-tolerant shutdown path).
    pub async fn initialize_all(&self) -> Result<()> {
        let order = self.order.lock().clone();
        for (kind, name) in &order {
            if *kind != EntryKind::Resource {
                continue;
            }
            let entry = self
                .resources
                .get(name)
                .map(|e| e.value().clone())
                .expect("registration order is consistent with the resource map");
            if let Some((_, body)) = entry.as_resource() {
                body.initialize().await?;
            }
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Tear down every resource body's `cleanup()` in reverse registration
    /// order, collecting every failure rather than stopping at the first
    /// (spec §4.1: shutdown must make a best effort across all resources).
    /// After this call, [`Registry::is_shutting_down`] is `true` and further
    /// invocations should be rejected with [`CoreError::ShuttingDown`].
    pub async fn shutdown(&self) -> Vec<CoreError> {
        self.shutting_down.store(true, Ordering::Release);
        let order = self.order.lock().clone();
        let mut errors = Vec::new();
        for (kind, name) in order.iter().rev() {
            if *kind != EntryKind::Resource {
                continue;
            }
            let Some(entry) = self.resources.get(name).map(|e| e.value().clone()) else {
                continue;
            };
            if let Some((_, body)) = entry.as_resource() {
                if let Err(err) = body.cleanup().await {
                    errors.push(err);
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::capability::{ConnectionHandle, HealthStatus};

    struct DummyResource {
        init_calls: Arc<AtomicU32>,
        cleanup_calls: Arc<AtomicU32>,
        fail_init: bool,
    }

    #[async_trait]
    impl ResourceBody for DummyResource {
        async fn initialize(&self) -> Result<()> {
            self.init_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail_init {
                return Err(CoreError::ResourceUnavailable("boom".into()));
            }
            Ok(())
        }

        async fn create_connection(&self) -> Result<ConnectionHandle> {
            Ok(ConnectionHandle { id: uuid::Uuid::new_v4(), resource_name: "dummy".into() })
        }

        async fn probe(&self, _handle: &ConnectionHandle) -> bool {
            true
        }

        async fn close_connection(&self, _handle: &ConnectionHandle) {}

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Healthy
        }

        async fn cleanup(&self) -> Result<()> {
            self.cleanup_calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    fn resource_descriptor(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(
            name,
            crate::descriptor::ResourceKind::Memory,
            semver::Version::new(1, 0, 0),
            json!({}),
            4,
            std::time::Duration::from_secs(1),
        )
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let registry = Registry::new();
        let init_calls = Arc::new(AtomicU32::new(0));
        let cleanup_calls = Arc::new(AtomicU32::new(0));
        let body = Arc::new(DummyResource {
            init_calls: init_calls.clone(),
            cleanup_calls: cleanup_calls.clone(),
            fail_init: false,
        });
        registry
            .register_resource(resource_descriptor("db"), body.clone())
            .unwrap();
        let err = registry.register_resource(resource_descriptor("db"), body).unwrap_err();
        assert_eq!(err.kind(), "DuplicateName");
    }

    #[test]
    fn lookup_before_initialize_fails() {
        let registry = Registry::new();
        let err = registry.lookup(EntryKind::Resource, "db").unwrap_err();
        assert_eq!(err.kind(), "NotInitialized");
    }

    #[tokio::test]
    async fn initialize_all_then_lookup_succeeds() {
        let registry = Registry::new();
        let init_calls = Arc::new(AtomicU32::new(0));
        let cleanup_calls = Arc::new(AtomicU32::new(0));
        let body = Arc::new(DummyResource {
            init_calls: init_calls.clone(),
            cleanup_calls: cleanup_calls.clone(),
            fail_init: false,
        });
        registry.register_resource(resource_descriptor("db"), body).unwrap();
        registry.initialize_all().await.unwrap();
        assert_eq!(init_calls.load(AtomicOrdering::SeqCst), 1);
        assert!(registry.lookup(EntryKind::Resource, "db").is_ok());
    }

    #[tokio::test]
    async fn register_after_initialize_fails() {
        let registry = Registry::new();
        registry.initialize_all().await.unwrap();
        let init_calls = Arc::new(AtomicU32::new(0));
        let cleanup_calls = Arc::new(AtomicU32::new(0));
        let body = Arc::new(DummyResource { init_calls, cleanup_calls, fail_init: false });
        let err = registry.register_resource(resource_descriptor("db"), body).unwrap_err();
        assert_eq!(err.kind(), "AlreadyInitialized");
    }

    #[tokio::test]
    async fn shutdown_runs_cleanup_in_reverse_order_and_collects_errors() {
        let registry = Registry::new();
        let init_calls = Arc::new(AtomicU32::new(0));
        let cleanup_calls = Arc::new(AtomicU32::new(0));
        for name in ["a", "b", "c"] {
            let body = Arc::new(DummyResource {
                init_calls: init_calls.clone(),
                cleanup_calls: cleanup_calls.clone(),
                fail_init: false,
            });
            registry.register_resource(resource_descriptor(name), body).unwrap();
        }
        registry.initialize_all().await.unwrap();
        let errors = registry.shutdown().await;
        assert!(errors.is_empty());
        assert_eq!(cleanup_calls.load(AtomicOrdering::SeqCst), 3);
        assert!(registry.is_shutting_down());
    }

    #[tokio::test]
    async fn initialize_all_stops_at_first_failure() {
        let registry = Registry::new();
        let init_calls = Arc::new(AtomicU32::new(0));
        let cleanup_calls = Arc::new(AtomicU32::new(0));
        let bad = Arc::new(DummyResource {
            init_calls: init_calls.clone(),
            cleanup_calls: cleanup_calls.clone(),
            fail_init: true,
        });
        registry.register_resource(resource_descriptor("bad"), bad).unwrap();
        let err = registry.initialize_all().await.unwrap_err();
        assert_eq!(err.kind(), "ResourceUnavailable");
        assert!(!registry.is_initialized());
    }
}
