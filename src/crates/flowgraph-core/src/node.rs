//! The node model: one declarative unit of a flow
//!
//! A flow is a sequence of node definitions, each a plain JSON value whose
//! *shape* selects its meaning:
//!
//! - a **string** calls a capability from the scope;
//! - a **sequence** is a subflow run in a child instance - unless it has
//!   exactly one element that is itself a non-empty sequence, in which case
//!   it is a loop `[[controller, action…]]`;
//! - a **mapping with one key** that resolves in scope, whose value is a
//!   mapping (or null), is a parameterized call;
//! - any **other mapping** is a branch: keys are edge names matched against
//!   the previous step's edges, values are the nodes to run;
//! - an **inline function** may be supplied directly when the flow is built
//!   programmatically rather than deserialized.
//!
//! Shapes are classified once, at construction ([`Node::parse`]), into the
//! tagged [`NodeKind`] - the evaluator never re-sniffs JSON shapes. The
//! original value is retained for step records and the context's node list.
//! Scalar definitions (numbers, booleans, null) have no meaning; they parse
//! to [`NodeKind::Unknown`] and evaluate to an `error` edge so a run keeps
//! going and later branches can route on the failure.

use indexmap::IndexMap;
use serde_json::Value;

use crate::scope::{NodeFn, Scope};

/// A parsed node: classified shape plus the original definition
#[derive(Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) repr: Value,
}

/// Classified node shape
#[derive(Clone)]
pub enum NodeKind {
    /// Call a capability by identifier
    Call(String),
    /// Host-supplied executable
    Inline(NodeFn),
    /// Run a child instance over these nodes
    Subflow(Vec<Node>),
    /// `[[controller, action…]]` - iterate until the controller exits
    Loop {
        /// Decides each iteration; exits via `exit`/`exit_forced` edges
        controller: Box<Node>,
        /// Run after the controller on non-exiting iterations
        actions: Vec<Node>,
    },
    /// Route on the previous step's edges; the matching arm runs in a
    /// child instance
    Branch(IndexMap<String, Vec<Node>>),
    /// Call a capability with a parameter mapping
    ParamCall {
        /// Capability identifier
        target: String,
        /// The parameter mapping, when present
        params: Option<Value>,
    },
    /// Empty sequence or empty mapping; evaluates to `pass`
    Empty,
    /// Unrecognized shape; evaluates to an `error` edge
    Unknown,
}

impl Node {
    /// Classify a JSON node definition
    ///
    /// The scope is consulted only to disambiguate single-key mappings
    /// (parameterized call vs. branch); it is not captured.
    pub fn parse(value: &Value, scope: &Scope) -> Node {
        let kind = match value {
            Value::String(id) => NodeKind::Call(id.clone()),
            Value::Array(items) => Self::parse_sequence(items, scope),
            Value::Object(map) => Self::parse_mapping(map, scope),
            _ => NodeKind::Unknown,
        };
        Node {
            kind,
            repr: value.clone(),
        }
    }

    /// Parse a node-list value: a sequence is parsed element-wise, any
    /// other value becomes a single-node list
    pub fn parse_list(value: &Value, scope: &Scope) -> Vec<Node> {
        match value {
            Value::Array(items) => items.iter().map(|item| Node::parse(item, scope)).collect(),
            other => vec![Node::parse(other, scope)],
        }
    }

    /// Wrap a host-supplied executable as a node
    pub fn inline(func: NodeFn) -> Node {
        Node {
            kind: NodeKind::Inline(func),
            repr: Value::String("(workflow function)".to_string()),
        }
    }

    /// A node calling `id` from the scope
    pub fn call(id: impl Into<String>) -> Node {
        let id = id.into();
        Node {
            repr: Value::String(id.clone()),
            kind: NodeKind::Call(id),
        }
    }

    /// The classified shape
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The definition as originally written
    pub fn repr(&self) -> &Value {
        &self.repr
    }

    fn parse_sequence(items: &[Value], scope: &Scope) -> NodeKind {
        if items.is_empty() {
            return NodeKind::Empty;
        }
        if items.len() == 1 {
            if let Value::Array(inner) = &items[0] {
                if !inner.is_empty() {
                    let controller = Box::new(Node::parse(&inner[0], scope));
                    let actions = inner[1..]
                        .iter()
                        .map(|item| Node::parse(item, scope))
                        .collect();
                    return NodeKind::Loop {
                        controller,
                        actions,
                    };
                }
            }
        }
        NodeKind::Subflow(
            items.iter().map(|item| Node::parse(item, scope)).collect(),
        )
    }

    fn parse_mapping(map: &serde_json::Map<String, Value>, scope: &Scope) -> NodeKind {
        if map.is_empty() {
            return NodeKind::Empty;
        }
        if map.len() == 1 {
            let (key, value) = map.iter().next().expect("len checked above");
            let param_shaped = value.is_object() || value.is_null();
            if param_shaped && scope.resolve(key).is_some() {
                return NodeKind::ParamCall {
                    target: key.clone(),
                    params: if value.is_null() {
                        None
                    } else {
                        Some(value.clone())
                    },
                };
            }
        }
        let arms = map
            .iter()
            .map(|(edge, value)| (edge.clone(), Node::parse_list(value, scope)))
            .collect();
        NodeKind::Branch(arms)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match &self.kind {
            NodeKind::Call(id) => format!("Call({id})"),
            NodeKind::Inline(_) => "Inline".to_string(),
            NodeKind::Subflow(nodes) => format!("Subflow[{}]", nodes.len()),
            NodeKind::Loop { actions, .. } => format!("Loop[{} actions]", actions.len()),
            NodeKind::Branch(arms) => format!("Branch[{}]", arms.len()),
            NodeKind::ParamCall { target, .. } => format!("ParamCall({target})"),
            NodeKind::Empty => "Empty".to_string(),
            NodeKind::Unknown => "Unknown".to_string(),
        };
        f.debug_struct("Node").field("kind", &tag).finish()
    }
}
