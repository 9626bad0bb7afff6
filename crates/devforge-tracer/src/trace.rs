//! The per-request trace tree: push/pop span construction (spec §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, TracerError};
use crate::node::{ErrorDescriptor, Outcome, Sidecar, SidecarKind, TraceNode};
use crate::redaction::RedactionPolicy;

/// Default cap on the number of nodes a single trace may hold (spec §4.4).
pub const DEFAULT_MAX_NODES: usize = 10_000;
/// Default cap, in bytes, on cumulative input+result payload size (spec §4.4).
pub const DEFAULT_MAX_BYTES: usize = 1 << 20;

/// A handle returned by `start_root`/`start_child`. `Elided` is returned once
/// a trace's size bounds are exceeded; closing an elided handle is a no-op
/// (spec §4.4: "further children are elided... the trace is still valid").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHandle {
    Real(Uuid),
    Elided,
}

impl NodeHandle {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            NodeHandle::Real(id) => Some(*id),
            NodeHandle::Elided => None,
        }
    }
}

/// Size limits applied to a single trace.
#[derive(Debug, Clone, Copy)]
pub struct TraceLimits {
    pub max_nodes: usize,
    pub max_bytes: usize,
}

impl Default for TraceLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

struct TraceInner {
    request_id: Uuid,
    user_id: Option<String>,
    session_id: Option<String>,
    root_id: Option<Uuid>,
    nodes: HashMap<Uuid, TraceNode>,
    order: Vec<Uuid>,
    sidecars: Vec<Sidecar>,
    bytes_used: usize,
    truncated: bool,
    overflow_count: u64,
    limits: TraceLimits,
    redaction: RedactionPolicy,
}

/// A mutable, thread-safe handle to a request's in-flight trace tree.
///
/// Cloning a `Tracer` shares the same underlying tree (it is an `Arc`
/// handle) — this lets concurrently dispatched child invocations each hold
/// their own clone while mutating the same trace.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<Mutex<TraceInner>>,
}

impl Tracer {
    /// Start a new, empty trace for one incoming request.
    pub fn new(
        request_id: Uuid,
        user_id: Option<String>,
        session_id: Option<String>,
        limits: TraceLimits,
        redaction: RedactionPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TraceInner {
                request_id,
                user_id,
                session_id,
                root_id: None,
                nodes: HashMap::new(),
                order: Vec::new(),
                sidecars: Vec::new(),
                bytes_used: 0,
                truncated: false,
                overflow_count: 0,
                limits,
                redaction,
            })),
        }
    }

    /// Create a root node. May only be called once per trace.
    pub fn start_root(&self, label: impl Into<String>, phase: impl Into<String>, input: Option<Value>) -> Result<NodeHandle> {
        let mut inner = self.inner.lock();
        if inner.root_id.is_some() {
            return Err(TracerError::RootAlreadyStarted);
        }
        let id = Uuid::new_v4();
        let node = TraceNode::open(id, None, label.into(), phase.into(), input);
        inner.root_id = Some(id);
        inner.order.push(id);
        inner.nodes.insert(id, node);
        Ok(NodeHandle::Real(id))
    }

    /// Append a child to `parent`'s child list. Returns [`NodeHandle::Elided`]
    /// once the trace's node-count budget is exhausted.
    pub fn start_child(
        &self,
        parent: NodeHandle,
        label: impl Into<String>,
        phase: impl Into<String>,
        input: Option<Value>,
    ) -> Result<NodeHandle> {
        let parent_id = match parent {
            NodeHandle::Elided => return Ok(NodeHandle::Elided),
            NodeHandle::Real(id) => id,
        };

        let mut inner = self.inner.lock();
        if !inner.nodes.contains_key(&parent_id) {
            return Err(TracerError::UnknownParent(parent_id));
        }
        if !inner.nodes[&parent_id].is_open() {
            return Err(TracerError::UnknownParent(parent_id));
        }

        if inner.order.len() >= inner.limits.max_nodes {
            inner.truncated = true;
            inner.overflow_count += 1;
            return Ok(NodeHandle::Elided);
        }

        let id = Uuid::new_v4();
        let node = TraceNode::open(id, Some(parent_id), label.into(), phase.into(), input);
        inner.order.push(id);
        inner.nodes.insert(id, node);
        inner.nodes.get_mut(&parent_id).expect("checked above").children.push(id);
        Ok(NodeHandle::Real(id))
    }

    /// Close a node: sets its end timestamp, duration, outcome, and applies
    /// redaction to its input/result. A no-op for [`NodeHandle::Elided`].
    /// Fails if the node has open children (LIFO ordering invariant, spec
    /// §4.4) or does not exist.
    pub fn close(&self, handle: NodeHandle, outcome: Outcome) -> Result<()> {
        let id = match handle {
            NodeHandle::Elided => return Ok(()),
            NodeHandle::Real(id) => id,
        };

        let mut inner = self.inner.lock();
        {
            let node = inner.nodes.get(&id).ok_or(TracerError::UnknownNode(id))?;
            if !node.is_open() {
                return Err(TracerError::UnknownNode(id));
            }
            if node.children.iter().any(|c| inner.nodes[c].is_open()) {
                return Err(TracerError::ChildrenStillOpen(id));
            }
        }

        let redaction = inner.redaction.clone();
        let max_bytes = inner.limits.max_bytes;
        let node = inner.nodes.get_mut(&id).expect("checked above");
        let end = Utc::now();
        let duration_ms = (end - node.start).num_milliseconds().max(0);
        node.end = Some(end);
        node.duration_ms = Some(duration_ms);
        node.success = Some(outcome.success);
        node.error = outcome.error;

        let redacted_input = node.input.take().map(|v| redaction.redact(&v));
        let redacted_result = outcome.result.map(|v| redaction.redact(&v));

        let mut used = estimate_bytes(&redacted_input) + estimate_bytes(&redacted_result);
        node.input = redacted_input;
        node.result = redacted_result;

        if inner.bytes_used + used > max_bytes {
            // Still valid, just marked truncated; we keep what we already
            // wrote (the node itself is never retroactively elided).
            inner.truncated = true;
            used = max_bytes.saturating_sub(inner.bytes_used);
        }
        inner.bytes_used += used;

        Ok(())
    }

    /// Attach a non-tree sidecar sample (cache op, performance sample, user
    /// pattern) to the trace.
    pub fn record_sidecar(&self, kind: SidecarKind, payload: Value) {
        let mut inner = self.inner.lock();
        inner.sidecars.push(Sidecar {
            kind,
            payload,
            recorded_at: Utc::now(),
        });
    }

    /// Current user id, if any.
    pub fn user_id(&self) -> Option<String> {
        self.inner.lock().user_id.clone()
    }

    /// The request id this trace belongs to.
    pub fn request_id(&self) -> Uuid {
        self.inner.lock().request_id
    }

    /// Consume this handle and produce an immutable [`FinishedTrace`].
    /// Fails with [`TracerError::Incomplete`] if the root (or any
    /// descendant) is still open.
    pub fn finish(self) -> Result<FinishedTrace> {
        let inner = self.inner.lock();
        let root_id = inner.root_id.ok_or(TracerError::Incomplete)?;
        if inner.nodes.values().any(TraceNode::is_open) {
            return Err(TracerError::Incomplete);
        }

        Ok(FinishedTrace {
            request_id: inner.request_id,
            user_id: inner.user_id.clone(),
            session_id: inner.session_id.clone(),
            root_id,
            nodes: inner.order.iter().map(|id| inner.nodes[id].clone()).collect(),
            sidecars: inner.sidecars.clone(),
            truncated: inner.truncated,
            overflow_count: inner.overflow_count,
        })
    }
}

fn estimate_bytes(value: &Option<Value>) -> usize {
    value
        .as_ref()
        .map(|v| serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0))
        .unwrap_or(0)
}

/// An immutable, closed trace: a tool/root invocation plus every child
/// operation beneath it, in flat insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinishedTrace {
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub root_id: Uuid,
    pub nodes: Vec<TraceNode>,
    pub sidecars: Vec<Sidecar>,
    pub truncated: bool,
    pub overflow_count: u64,
}

impl FinishedTrace {
    /// The root node.
    pub fn root(&self) -> &TraceNode {
        self.nodes
            .iter()
            .find(|n| n.id == self.root_id)
            .expect("a finished trace always has its root in `nodes`")
    }

    /// Total duration of the trace (root node's duration).
    pub fn total_duration_ms(&self) -> i64 {
        self.root().duration_ms.unwrap_or(0)
    }

    /// `true` iff the root succeeded.
    pub fn succeeded(&self) -> bool {
        self.root().success.unwrap_or(false)
    }

    /// Labels of the root's direct children, in order — used by the
    /// analytics pipeline's repetition-pattern signature (spec §4.5).
    pub fn signature(&self) -> Vec<String> {
        let root = self.root();
        root.children
            .iter()
            .filter_map(|id| self.nodes.iter().find(|n| &n.id == id))
            .map(|n| n.label.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracer() -> Tracer {
        Tracer::new(
            Uuid::new_v4(),
            Some("user-1".into()),
            Some("session-1".into()),
            TraceLimits::default(),
            RedactionPolicy::default(),
        )
    }

    #[test]
    fn simple_root_only_trace_round_trips() {
        let t = tracer();
        let root = t.start_root("echo", "tool", Some(json!({"msg": "hi"}))).unwrap();
        t.close(root, Outcome::success(Some(json!({"msg": "hi"})))).unwrap();
        let finished = t.finish().unwrap();

        assert_eq!(finished.nodes.len(), 1);
        assert!(finished.succeeded());
        assert!(finished.total_duration_ms() >= 0);

        let json = serde_json::to_string(&finished).unwrap();
        let back: FinishedTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, finished);
    }

    #[test]
    fn child_interval_nested_in_parent() {
        let t = tracer();
        let root = t.start_root("compose", "tool", None).unwrap();
        let child = t.start_child(root, "sub", "tool", None).unwrap();
        t.close(child, Outcome::success(None)).unwrap();
        t.close(root, Outcome::success(None)).unwrap();
        let finished = t.finish().unwrap();

        let root_node = finished.root();
        let child_node = finished.nodes.iter().find(|n| n.id != root_node.id).unwrap();
        assert!(root_node.start <= child_node.start);
        assert!(child_node.end.unwrap() <= root_node.end.unwrap());
    }

    #[test]
    fn closing_parent_before_child_fails() {
        let t = tracer();
        let root = t.start_root("compose", "tool", None).unwrap();
        let child = t.start_child(root, "sub", "tool", None).unwrap();
        let err = t.close(root, Outcome::success(None)).unwrap_err();
        assert_eq!(err, TracerError::ChildrenStillOpen(root.id().unwrap()));
        t.close(child, Outcome::success(None)).unwrap();
        t.close(root, Outcome::success(None)).unwrap();
    }

    #[test]
    fn finish_before_close_is_incomplete() {
        let t = tracer();
        let _root = t.start_root("compose", "tool", None).unwrap();
        let err = t.finish().unwrap_err();
        assert_eq!(err, TracerError::Incomplete);
    }

    #[test]
    fn node_cap_elides_further_children_and_marks_truncated() {
        let t = Tracer::new(
            Uuid::new_v4(),
            None,
            None,
            TraceLimits { max_nodes: 2, max_bytes: DEFAULT_MAX_BYTES },
            RedactionPolicy::default(),
        );
        let root = t.start_root("root", "tool", None).unwrap();
        let c1 = t.start_child(root, "c1", "tool", None).unwrap();
        assert!(matches!(c1, NodeHandle::Real(_)));
        let c2 = t.start_child(root, "c2", "tool", None).unwrap();
        assert_eq!(c2, NodeHandle::Elided);
        // closing an elided handle is a no-op, never an error
        t.close(c2, Outcome::success(None)).unwrap();
        t.close(c1, Outcome::success(None)).unwrap();
        t.close(root, Outcome::success(None)).unwrap();
        let finished = t.finish().unwrap();
        assert!(finished.truncated);
        assert_eq!(finished.overflow_count, 1);
    }

    #[test]
    fn sensitive_input_is_redacted_on_close() {
        let t = tracer();
        let root = t
            .start_root("login", "tool", Some(json!({"password": "hunter2", "user": "a"})))
            .unwrap();
        t.close(root, Outcome::success(None)).unwrap();
        let finished = t.finish().unwrap();
        let input = finished.root().input.clone().unwrap();
        assert_eq!(input["password"], json!(crate::redaction::REDACTED_MARKER));
        assert_eq!(input["user"], json!("a"));
    }

    #[test]
    fn sidecars_attach_without_becoming_nodes() {
        let t = tracer();
        let root = t.start_root("lookup", "tool", None).unwrap();
        t.record_sidecar(SidecarKind::CacheOp, json!({"hit": true}));
        t.close(root, Outcome::success(None)).unwrap();
        let finished = t.finish().unwrap();
        assert_eq!(finished.nodes.len(), 1);
        assert_eq!(finished.sidecars.len(), 1);
        assert_eq!(finished.sidecars[0].kind, SidecarKind::CacheOp);
    }
}
