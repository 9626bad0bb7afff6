//! Immutable descriptors for tools, resources, and prompts (spec §3).

use std::time::Duration;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes an invocable tool. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub version: Version,
    pub description: String,
    /// JSON Schema the input must validate against.
    pub input_schema: Value,
    /// JSON Schema the output must validate against.
    pub output_schema: Value,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: Version,
        description: impl Into<String>,
        input_schema: Value,
        output_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            description: description.into(),
            input_schema,
            output_schema,
            timeout: None,
            retries: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// The category of external dependency a [`ResourceDescriptor`] pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    File,
    Database,
    Api,
    Memory,
    Cache,
}

/// A resource's optional security policy (credential check, ACL reference —
/// the concrete check is a pluggable collaborator, spec §1 Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityPolicy {
    pub requires_credential: bool,
    pub allowed_roles: Vec<String>,
}

/// Describes a pooled external dependency. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub kind: ResourceKind,
    pub version: Version,
    /// Opaque connection configuration, interpreted by the resource body.
    pub connection_config: Value,
    /// Required, finite (spec §9 Open Questions: the source's inconsistent
    /// "unset means 10, or unbounded" behavior is explicitly rejected here).
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub security_policy: Option<SecurityPolicy>,
}

impl ResourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        version: Version,
        connection_config: Value,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            version,
            connection_config,
            max_connections,
            acquire_timeout,
            security_policy: None,
        }
    }
}

/// A prompt's optional caching policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl: Option<Duration>,
}

/// Describes a parameterized text generator. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,
    pub version: Version,
    /// Template string with `{{variable}}` and `{{context.variable}}`
    /// substitution sites.
    pub template: String,
    /// JSON Schema each variable binding must satisfy.
    pub variable_schema: Value,
    pub context_schema: Option<Value>,
    pub cache_policy: Option<CachePolicy>,
}

impl PromptDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: Version,
        template: impl Into<String>,
        variable_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            template: template.into(),
            variable_schema,
            context_schema: None,
            cache_policy: None,
        }
    }
}
