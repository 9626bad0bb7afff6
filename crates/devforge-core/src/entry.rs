//! [`RegistryEntry`]: a tagged union of {tool, resource, prompt} descriptor
//! plus its capability-record implementation (spec §3).

use std::sync::Arc;

use crate::capability::{PromptBody, ResourceBody, ToolBody};
use crate::descriptor::{PromptDescriptor, ResourceDescriptor, ToolDescriptor};

/// The three kinds of entry a [`crate::registry::Registry`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Tool,
    Resource,
    Prompt,
}

impl EntryKind {
    pub fn label(self) -> &'static str {
        match self {
            EntryKind::Tool => "tool",
            EntryKind::Resource => "resource",
            EntryKind::Prompt => "prompt",
        }
    }
}

/// A registered entry: its immutable descriptor plus a handle to the
/// capability-record implementation that backs it.
#[derive(Clone)]
pub enum RegistryEntry {
    Tool {
        descriptor: ToolDescriptor,
        body: Arc<dyn ToolBody>,
    },
    Resource {
        descriptor: ResourceDescriptor,
        body: Arc<dyn ResourceBody>,
    },
    Prompt {
        descriptor: PromptDescriptor,
        body: Option<Arc<dyn PromptBody>>,
    },
}

impl RegistryEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            RegistryEntry::Tool { .. } => EntryKind::Tool,
            RegistryEntry::Resource { .. } => EntryKind::Resource,
            RegistryEntry::Prompt { .. } => EntryKind::Prompt,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RegistryEntry::Tool { descriptor, .. } => &descriptor.name,
            RegistryEntry::Resource { descriptor, .. } => &descriptor.name,
            RegistryEntry::Prompt { descriptor, .. } => &descriptor.name,
        }
    }

    pub fn as_tool(&self) -> Option<(&ToolDescriptor, &Arc<dyn ToolBody>)> {
        match self {
            RegistryEntry::Tool { descriptor, body } => Some((descriptor, body)),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<(&ResourceDescriptor, &Arc<dyn ResourceBody>)> {
        match self {
            RegistryEntry::Resource { descriptor, body } => Some((descriptor, body)),
            _ => None,
        }
    }

    pub fn as_prompt(&self) -> Option<(&PromptDescriptor, Option<&Arc<dyn PromptBody>>)> {
        match self {
            RegistryEntry::Prompt { descriptor, body } => Some((descriptor, body.as_ref())),
            _ => None,
        }
    }
}
