//! Error types for flow construction and execution
//!
//! Most conditions the engine meets are *recoverable* and never show up
//! here: an unresolved identifier or unrecognized node shape becomes a step
//! with an `error` edge that later branch nodes can route on, and a failing
//! edge-function only poisons its own result slot. [`FlowError`] is reserved
//! for conditions that abort the current `run()`.

use flowgraph_hub::HubError;
use thiserror::Error;

/// Convenience result type using [`FlowError`]
pub type Result<T> = std::result::Result<T, FlowError>;

/// Fatal errors for a flow run
#[derive(Error, Debug)]
pub enum FlowError {
    /// A node executable returned an error
    ///
    /// Node throws are not converted into `error` edges; they fail the whole
    /// run. Nodes that want a recoverable failure return an `error` edge
    /// themselves.
    #[error("node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Identifier or description of the failing node
        node: String,
        /// Error message from the executable
        error: String,
    },

    /// General execution failure without node context
    #[error("execution failed: {0}")]
    Execution(String),

    /// A pause this run was suspended on was displaced or otherwise lost
    #[error("flow hub error: {0}")]
    Hub(#[from] HubError),

    /// A step or state snapshot could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// Create a node execution error with context
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }
}
