//! Flow instances: one live execution over a node list
//!
//! A [`FlowInstance`] owns its node list, state store, and step trail, and
//! drives sequential evaluation on [`FlowInstance::run`]. Composite nodes
//! spawn nested instances sharing the same scope and hub; see the
//! [`evaluator`](crate::evaluator) module.
//!
//! # Example
//!
//! ```rust
//! use flowgraph_core::{CallResult, FlowConfig, FlowInstance, Scope, node_fn};
//! use flowgraph_hub::FlowHub;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut scope = Scope::new();
//! scope.insert_fn("greet", node_fn(|ctx, _params| async move {
//!     ctx.state.set("greeting", json!("hello"));
//!     Ok(CallResult::pass())
//! }));
//! let scope = Arc::new(scope);
//!
//! let mut flow = FlowInstance::new(
//!     FlowConfig::from_value(&json!(["greet"]), &scope)
//!         .with_scope(scope.clone())
//!         .with_hub(Arc::new(FlowHub::new())),
//! );
//!
//! let steps = flow.run().await.unwrap();
//! assert_eq!(steps.len(), 1);
//! assert_eq!(flow.state_manager().get("greeting"), json!("hello"));
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use flowgraph_hub::{FlowHub, HubEventKind, ListenerId};

use crate::error::Result;
use crate::node::Node;
use crate::scope::Scope;
use crate::state::StateStore;
use crate::step::Step;

/// Construction arguments for [`FlowInstance`]
///
/// Only the node list is required. State defaults to an empty mapping, the
/// scope to an empty scope, the instance id to a generated `flow-{uuid}`,
/// and the hub to [`FlowHub::global`].
pub struct FlowConfig {
    pub(crate) initial_state: Option<Value>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) scope: Option<Arc<Scope>>,
    pub(crate) instance_id: Option<String>,
    pub(crate) hub: Option<Arc<FlowHub>>,
}

impl FlowConfig {
    /// Config over an already-parsed node list
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            initial_state: None,
            nodes,
            scope: None,
            instance_id: None,
            hub: None,
        }
    }

    /// Config over a serialized node-list value, parsed against `scope`
    ///
    /// The same scope should normally also be attached via
    /// [`FlowConfig::with_scope`]; parsing only consults it to disambiguate
    /// parameterized calls from branches.
    pub fn from_value(nodes: &Value, scope: &Scope) -> Self {
        Self::new(Node::parse_list(nodes, scope))
    }

    /// Seed the state store with `state` instead of an empty mapping
    pub fn with_initial_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Attach the capability scope
    pub fn with_scope(mut self, scope: Arc<Scope>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Choose the instance id instead of generating one
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Attach a specific hub instead of the process-wide one
    pub fn with_hub(mut self, hub: Arc<FlowHub>) -> Self {
        self.hub = Some(hub);
        self
    }
}

/// One live execution context over a node list
///
/// `run()` takes `&mut self`, so a second run of the same instance cannot
/// begin while one is in flight. Re-running a completed instance is
/// supported and starts from a clean step trail (state history persists
/// across runs; hub listeners registered by the previous run are dropped).
pub struct FlowInstance {
    pub(crate) instance_id: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) nodes_repr: Value,
    pub(crate) scope: Arc<Scope>,
    pub(crate) state: StateStore,
    pub(crate) steps: Vec<Step>,
    pub(crate) current_index: usize,
    pub(crate) hub: Arc<FlowHub>,
    pub(crate) registered_listeners: Arc<Mutex<Vec<(HubEventKind, ListenerId)>>>,
}

impl FlowInstance {
    /// Build an instance from `config`
    pub fn new(config: FlowConfig) -> Self {
        let initial_state = config
            .initial_state
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let instance_id = config
            .instance_id
            .unwrap_or_else(|| format!("flow-{}", Uuid::new_v4()));
        let nodes_repr = Value::Array(config.nodes.iter().map(|n| n.repr().clone()).collect());

        Self {
            instance_id,
            nodes: config.nodes,
            nodes_repr,
            scope: config.scope.unwrap_or_default(),
            state: StateStore::new(initial_state),
            steps: Vec::new(),
            current_index: 0,
            hub: config.hub.unwrap_or_else(FlowHub::global),
            registered_listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Evaluate every node in order, recording and broadcasting each step
    ///
    /// Returns a deep copy of the recorded steps. A node executable that
    /// returns an error fails the whole run; recoverable conditions
    /// (unresolved identifiers, unknown shapes) instead surface as `error`
    /// edges in the step trail and do not stop evaluation.
    pub async fn run(&mut self) -> Result<Vec<Step>> {
        self.run_boxed().await
    }

    // Boxed so composite nodes can recurse through child instances.
    pub(crate) fn run_boxed(
        &mut self,
    ) -> futures::future::BoxFuture<'_, Result<Vec<Step>>> {
        Box::pin(async move {
            tracing::debug!(
                instance = %self.instance_id,
                nodes = self.nodes.len(),
                "starting flow run"
            );
            self.current_index = 0;
            self.steps.clear();
            self.clear_registered_listeners();

            while self.current_index < self.nodes.len() {
                let index = self.current_index;
                self.current_index += 1;
                self.evaluate_at(index).await?;
            }

            tracing::debug!(
                instance = %self.instance_id,
                steps = self.steps.len(),
                "flow run complete"
            );
            Ok(self.steps.clone())
        })
    }

    /// Deep copy of the steps recorded so far
    pub fn steps(&self) -> Vec<Step> {
        self.steps.clone()
    }

    /// Handle to this instance's state store
    pub fn state_manager(&self) -> StateStore {
        self.state.clone()
    }

    /// This instance's id
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The hub this instance broadcasts on
    pub fn hub(&self) -> Arc<FlowHub> {
        self.hub.clone()
    }

    fn clear_registered_listeners(&self) {
        let mut listeners = self.registered_listeners.lock();
        for (kind, id) in listeners.drain(..) {
            self.hub.remove_listener(kind, id);
        }
    }
}

impl std::fmt::Debug for FlowInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowInstance")
            .field("instance_id", &self.instance_id)
            .field("nodes", &self.nodes.len())
            .field("steps", &self.steps.len())
            .field("current_index", &self.current_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CallResult;
    use crate::scope::node_fn;
    use serde_json::json;

    fn isolated(config: FlowConfig) -> FlowInstance {
        FlowInstance::new(config.with_hub(Arc::new(FlowHub::new())))
    }

    #[tokio::test]
    async fn test_empty_node_list_completes_empty() {
        let mut flow = isolated(FlowConfig::new(Vec::new()));
        let steps = flow.run().await.unwrap();
        assert!(steps.is_empty());
        assert_eq!(flow.state_manager().state(), json!({}));
    }

    #[tokio::test]
    async fn test_defaults() {
        let flow = isolated(FlowConfig::new(Vec::new()));
        assert!(flow.instance_id().starts_with("flow-"));
        assert_eq!(flow.state_manager().state(), json!({}));
    }

    #[tokio::test]
    async fn test_steps_match_nodes_after_run() {
        let mut scope = Scope::new();
        scope.insert_fn(
            "A",
            node_fn(|_ctx, _params| async { Ok(CallResult::pass()) }),
        );

        let nodes = json!(["A", "A", "A"]);
        let scope = Arc::new(scope);
        let mut flow = isolated(
            FlowConfig::from_value(&nodes, &scope).with_scope(scope.clone()),
        );

        let steps = flow.run().await.unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(flow.current_index, 3);
    }

    #[tokio::test]
    async fn test_rerun_resets_steps_and_listeners() {
        let mut scope = Scope::new();
        scope.insert_fn(
            "listen",
            node_fn(|ctx, _params| async move {
                ctx.on("tick", Arc::new(|_, _| {}));
                Ok(CallResult::pass())
            }),
        );
        let scope = Arc::new(scope);

        let mut flow = isolated(
            FlowConfig::from_value(&json!(["listen"]), &scope).with_scope(scope.clone()),
        );

        flow.run().await.unwrap();
        assert_eq!(flow.registered_listeners.lock().len(), 1);

        flow.run().await.unwrap();
        // The first run's registration was dropped before the second added its own.
        assert_eq!(flow.registered_listeners.lock().len(), 1);
        assert_eq!(flow.steps().len(), 1);
    }

    #[tokio::test]
    async fn test_node_error_fails_run() {
        let mut scope = Scope::new();
        scope.insert_fn(
            "boom",
            node_fn(|_ctx, _params| async { Err("kaput".into()) }),
        );
        let scope = Arc::new(scope);

        let mut flow = isolated(
            FlowConfig::from_value(&json!(["boom", "boom"]), &scope).with_scope(scope.clone()),
        );

        let error = flow.run().await.unwrap_err();
        assert!(error.to_string().contains("kaput"));
        // The failing node was never recorded.
        assert!(flow.steps().is_empty());
    }
}
