//! # flowgraph-core - Declarative Workflow Execution
//!
//! An interpreter for declarative, serializable workflows - directed
//! sequences of nodes suited to agent pipelines, automations, and
//! human-in-the-loop procedures.
//!
//! ## Overview
//!
//! A flow is a JSON array of node definitions. The *shape* of each value
//! selects its meaning:
//!
//! - `"capability_id"` - call an executable from the [`Scope`]
//! - `["a", "b", …]` - a subflow, run in an isolated child instance
//! - `[[controller, action…]]` - a loop: the controller decides each
//!   iteration, `exit`/`exit_forced` edges break out
//! - `{"edge": node, …}` - a branch routed on the previous step's edges
//! - `{"id": {params}}` - a parameterized call, when `id` resolves in scope
//!
//! Every evaluated node yields canonical output `{edges, results?}`; edges
//! drive branch selection, results feed the next node's `input`. The run
//! records a [`Step`] per node - the audit trail - and broadcasts each one
//! over the [`flowgraph_hub::FlowHub`] shared with every other instance in
//! the process.
//!
//! ## Quick Start
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
//! scope.insert_fn("classify", node_fn(|ctx, _params| async move {
//!     let text = ctx.state.get("text");
//!     let edge = if text.as_str().map_or(0, str::len) > 10 { "long" } else { "short" };
//!     Ok(CallResult::from(edge))
//! }));
//! scope.insert_fn("summarize", node_fn(|ctx, _params| async move {
//!     ctx.state.set("summary", json!("…"));
//!     Ok(CallResult::pass())
//! }));
//! scope.insert_fn("keep", node_fn(|_ctx, _params| async { Ok(CallResult::pass()) }));
//! let scope = Arc::new(scope);
//!
//! // Classify, then branch on the edge it produced.
//! let nodes = json!(["classify", {"long": "summarize", "short": "keep"}]);
//!
//! let mut flow = FlowInstance::new(
//!     FlowConfig::from_value(&nodes, &scope)
//!         .with_scope(scope.clone())
//!         .with_initial_state(json!({"text": "a very long sentence"}))
//!         .with_hub(Arc::new(FlowHub::new())),
//! );
//!
//! let steps = flow.run().await.unwrap();
//! assert_eq!(steps[0].output.edges, vec!["long"]);
//! assert_eq!(flow.state_manager().get("summary"), json!("…"));
//! # }
//! ```
//!
//! ## Human-in-the-Loop
//!
//! A node suspends with [`ExecutionContext::human_input`]; the run parks on
//! a hub pause until something calls [`flowgraph_hub::FlowHub::resume`]
//! with the matching pause id. See `src/examples/human_approval.rs` for the
//! full round trip.
//!
//! ## Module Organization
//!
//! - [`instance`] - [`FlowInstance`], the run lifecycle
//! - [`node`] - [`Node`] shapes and parsing
//! - [`evaluator`] - dispatch, subflow/branch/loop orchestration
//! - [`output`] - [`CallResult`] and the output normalizer
//! - [`context`] - [`ExecutionContext`] handed to executables
//! - [`scope`] - [`Scope`], [`Capability`], identifier resolution
//! - [`state`] - [`StateStore`] with linear undo/redo history
//! - [`step`] - [`Step`] records
//! - [`error`] - [`FlowError`]

pub mod context;
pub mod error;
pub mod evaluator;
pub mod instance;
pub mod node;
pub mod output;
pub mod scope;
pub mod state;
pub mod step;

pub use context::{ExecutionContext, NodeEventCallback, NodeEventMeta};
pub use error::{FlowError, Result};
pub use evaluator::MAX_LOOP_ITERATIONS;
pub use instance::{FlowConfig, FlowInstance};
pub use node::{Node, NodeKind};
pub use output::{edge_fn, CallResult, EdgeFn, StepOutput};
pub use scope::{node_fn, Capability, NodeFn, Resolved, Scope, ScopeEntry};
pub use state::StateStore;
pub use step::Step;
