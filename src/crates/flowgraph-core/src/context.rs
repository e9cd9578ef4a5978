//! The execution context handed to node executables and edge-functions
//!
//! Every invocation receives an [`ExecutionContext`]: the instance's state
//! handle, the steps recorded so far, the previous node's output as
//! `input`, a description of the node itself, and the hub-backed
//! communication surface - [`ExecutionContext::human_input`] to suspend for
//! external input, [`ExecutionContext::emit`] to broadcast a custom event,
//! and [`ExecutionContext::on`] to hear custom events from any instance
//! sharing the hub.
//!
//! Contexts are cheap clones; the state handle inside refers to the owning
//! instance's live store, while `steps`, `nodes`, `input` and `self_info`
//! are snapshots taken when the node began.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use flowgraph_hub::{
    FlowHub, HubEvent, HubEventKind, ListenerId, NodeEvent, NodeRef, PauseRequest,
};

use crate::error::Result;
use crate::state::StateStore;
use crate::step::Step;

/// Callback registered through [`ExecutionContext::on`]
pub type NodeEventCallback = Arc<dyn Fn(Value, NodeEventMeta) + Send + Sync>;

/// Who emitted, who is listening
#[derive(Debug, Clone)]
pub struct NodeEventMeta {
    /// Event name the listener subscribed to
    pub custom_event_name: String,
    /// Instance the emitting node belongs to
    pub emitter_instance_id: String,
    /// The emitting node
    pub emitting_node: NodeRef,
    /// Instance the listening node belongs to
    pub listener_instance_id: String,
    /// The node that registered the listener
    pub listening_node: NodeRef,
}

/// Per-invocation view of a running flow
#[derive(Clone)]
pub struct ExecutionContext {
    /// Live state handle of the owning instance
    pub state: StateStore,
    /// Steps recorded before this node began
    pub steps: Vec<Step>,
    /// The owning instance's full node list, as originally written
    pub nodes: Value,
    /// Description of the current node (capability record or structure)
    pub self_info: Value,
    /// Previous step's results: the single element, the whole array, or null
    pub input: Value,
    /// Id of the owning instance
    pub flow_instance_id: String,
    pub(crate) node_index: usize,
    pub(crate) node_repr: Value,
    pub(crate) hub: Arc<FlowHub>,
    pub(crate) registered_listeners: Arc<Mutex<Vec<(HubEventKind, ListenerId)>>>,
}

impl ExecutionContext {
    /// Suspend until an external party resumes the pause, yielding the
    /// resume payload
    ///
    /// With `pause_id` absent the hub generates one; pass an explicit id
    /// when the resuming side needs a predictable handle. The pause has no
    /// timeout - cancellation is a resume whose payload the node interprets.
    pub async fn human_input(&self, details: Value, pause_id: Option<String>) -> Result<Value> {
        let waiter = self.hub.request_pause(PauseRequest {
            pause_id,
            details,
            flow_instance_id: self.flow_instance_id.clone(),
        });
        Ok(waiter.wait().await?)
    }

    /// Broadcast a custom event tagged with this instance and node
    pub fn emit(&self, custom_event_name: impl Into<String>, data: Value) {
        self.hub.emit(HubEvent::NodeEvent(NodeEvent {
            flow_instance_id: self.flow_instance_id.clone(),
            emitting_node: NodeRef {
                index: self.node_index,
                definition: self.node_repr.clone(),
            },
            custom_event_name: custom_event_name.into(),
            event_data: data,
            timestamp: Utc::now(),
        }));
    }

    /// Listen for custom events named `custom_event_name`, from any
    /// instance on the shared hub
    ///
    /// The callback receives the event payload and a [`NodeEventMeta`]
    /// naming the emitting and listening nodes. Registrations belong to the
    /// owning instance and are cleared at the start of its next `run()`.
    pub fn on(&self, custom_event_name: impl Into<String>, callback: NodeEventCallback) {
        let wanted = custom_event_name.into();
        let listener_instance_id = self.flow_instance_id.clone();
        let listening_node = NodeRef {
            index: self.node_index,
            definition: self.node_repr.clone(),
        };

        let filter_name = wanted.clone();
        let id = self.hub.add_listener(
            HubEventKind::NodeEvent,
            Arc::new(move |event| {
                if let HubEvent::NodeEvent(node_event) = event {
                    if node_event.custom_event_name == filter_name {
                        callback(
                            node_event.event_data.clone(),
                            NodeEventMeta {
                                custom_event_name: filter_name.clone(),
                                emitter_instance_id: node_event.flow_instance_id.clone(),
                                emitting_node: node_event.emitting_node.clone(),
                                listener_instance_id: listener_instance_id.clone(),
                                listening_node: listening_node.clone(),
                            },
                        );
                    }
                }
            }),
        );

        self.registered_listeners
            .lock()
            .push((HubEventKind::NodeEvent, id));
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            state: StateStore::new(Value::Null),
            steps: Vec::new(),
            nodes: Value::Array(Vec::new()),
            self_info: Value::Null,
            input: Value::Null,
            flow_instance_id: "test-instance".to_string(),
            node_index: 0,
            node_repr: Value::Null,
            hub: Arc::new(FlowHub::new()),
            registered_listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("flow_instance_id", &self.flow_instance_id)
            .field("node_index", &self.node_index)
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn test_human_input_roundtrip() {
        let ctx = ExecutionContext::for_tests();
        let hub = ctx.hub.clone();

        let pending = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.human_input(json!({"prompt": "?"}), Some("p1".into())).await }
        });

        // Wait for the pause to register, then resolve it.
        while !hub.is_paused("p1") {
            tokio::task::yield_now().await;
        }
        assert!(hub.resume("p1", json!({"answer": 42})));

        let answer = pending.await.unwrap().unwrap();
        assert_eq!(answer, json!({"answer": 42}));
    }

    #[tokio::test]
    async fn test_emit_reaches_on_listener() {
        let ctx = ExecutionContext::for_tests();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = seen.clone();
        ctx.on(
            "progress",
            Arc::new(move |data, meta| {
                sink.lock().unwrap().push((data, meta));
            }),
        );

        ctx.emit("progress", json!({"pct": 50}));
        ctx.emit("other", json!({"ignored": true}));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (data, meta) = &seen[0];
        assert_eq!(data, &json!({"pct": 50}));
        assert_eq!(meta.custom_event_name, "progress");
        assert_eq!(meta.emitter_instance_id, "test-instance");
        assert_eq!(meta.listener_instance_id, "test-instance");
    }

    #[tokio::test]
    async fn test_on_registration_is_tracked() {
        let ctx = ExecutionContext::for_tests();
        ctx.on("a", Arc::new(|_, _| {}));
        ctx.on("b", Arc::new(|_, _| {}));

        assert_eq!(ctx.registered_listeners.lock().len(), 2);
    }
}
