//! Component framework for the tool-orchestration runtime: a name-keyed
//! [`registry::Registry`] (C1), a bounded [`pool::ResourcePool`] per
//! resource (C2), and a [`invoker::ToolInvoker`] (C3) that ties schema
//! validation, tracing, timeout, and retry together around a single call.

pub mod capability;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod invoker;
pub mod pool;
pub mod prompt;
pub mod registry;
pub mod retry;

pub use capability::{ConnectionHandle, FnToolBody, HealthStatus, InvocationContext, PromptBody, ResourceBody, ToolBody};
pub use descriptor::{CachePolicy, PromptDescriptor, ResourceDescriptor, ResourceKind, SecurityPolicy, ToolDescriptor};
pub use entry::{EntryKind, RegistryEntry};
pub use error::{CoreError, FieldError, Result};
pub use invoker::ToolInvoker;
pub use pool::{PoolStats, PooledConnection, ResourcePool};
pub use registry::Registry;
pub use retry::Backoff;
