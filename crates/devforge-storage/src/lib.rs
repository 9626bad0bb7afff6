//! Concrete [`devforge_analytics::StorageBackend`] implementations: an
//! in-memory backend for tests and ephemeral deployments, and a
//! SQLite-backed one for durable retention.

pub mod export;
pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
