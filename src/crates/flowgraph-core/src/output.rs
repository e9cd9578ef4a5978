//! Canonical step output and the normalizer that produces it
//!
//! Node executables return a [`CallResult`]; the normalizer reduces every
//! variant to the one canonical shape, [`StepOutput`] - a non-empty edge
//! list plus optional results. The normalizer is the *only* producer of
//! step output in the engine, so every downstream consumer (branch
//! selection, step records, the step event) sees one shape.
//!
//! | returned | normalized |
//! |---|---|
//! | `EdgeName(e)` | `{edges: [e]}` |
//! | `Edges([e…])` (non-empty) | `{edges: [e…]}` |
//! | `EdgeFns([(name, f)…])` | edges = names in order; results = each `f` invoked with the context, in order |
//! | `Value(v)`, `v` a non-empty all-string sequence | `{edges: v}` |
//! | `Value(v)`, anything else | `{edges: ["pass"], results: [v]}` |
//!
//! A failing edge-function keeps its edge listed and contributes
//! `{"error": message}` to its result slot without aborting the remaining
//! edge-functions. Empty edge lists are coerced to `["pass"]`.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::ExecutionContext;

/// An async edge-function: invoked with the execution context, no arguments
pub type EdgeFn = Arc<
    dyn Fn(ExecutionContext) -> BoxFuture<'static, std::result::Result<Value, Box<dyn std::error::Error + Send + Sync>>>
        + Send
        + Sync,
>;

/// Wrap an async closure as an [`EdgeFn`]
pub fn edge_fn<F, Fut>(f: F) -> EdgeFn
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<
            Output = std::result::Result<Value, Box<dyn std::error::Error + Send + Sync>>,
        > + Send
        + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// What a node executable hands back to the engine
pub enum CallResult {
    /// Take these edges, no results
    Edges(Vec<String>),
    /// Take this single edge
    EdgeName(String),
    /// Named edge-functions: edge order is list order, each function
    /// produces the result for its edge
    EdgeFns(Vec<(String, EdgeFn)>),
    /// A plain value; a non-empty all-string sequence reads as edges,
    /// anything else becomes a `pass` with the value as result
    Value(Value),
}

impl CallResult {
    /// The plain `pass` edge
    pub fn pass() -> Self {
        CallResult::EdgeName("pass".to_string())
    }
}

impl From<&str> for CallResult {
    fn from(edge: &str) -> Self {
        CallResult::EdgeName(edge.to_string())
    }
}

impl From<String> for CallResult {
    fn from(edge: String) -> Self {
        CallResult::EdgeName(edge)
    }
}

impl From<Vec<String>> for CallResult {
    fn from(edges: Vec<String>) -> Self {
        CallResult::Edges(edges)
    }
}

impl From<Value> for CallResult {
    fn from(value: Value) -> Self {
        CallResult::Value(value)
    }
}

impl std::fmt::Debug for CallResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallResult::Edges(edges) => f.debug_tuple("Edges").field(edges).finish(),
            CallResult::EdgeName(edge) => f.debug_tuple("EdgeName").field(edge).finish(),
            CallResult::EdgeFns(fns) => {
                let names: Vec<&String> = fns.iter().map(|(name, _)| name).collect();
                f.debug_tuple("EdgeFns").field(&names).finish()
            }
            CallResult::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

/// Canonical output of one evaluated node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    /// Named outgoing transitions; never empty
    pub edges: Vec<String>,
    /// Per-edge or single-value results, when the node produced any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Value>>,
    /// Present when the engine synthesized an error edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl StepOutput {
    /// Output with the given edges and nothing else
    pub fn with_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            edges: edges.into_iter().map(Into::into).collect(),
            results: None,
            error_details: None,
        }
    }

    /// The plain `pass` output
    pub fn pass() -> Self {
        Self::with_edges(["pass"])
    }

    /// Whether `edge` is among this output's edges
    pub fn has_edge(&self, edge: &str) -> bool {
        self.edges.iter().any(|e| e == edge)
    }
}

/// Is `value` a non-empty sequence of strings?
fn as_string_edges(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Reduce a [`CallResult`] to canonical [`StepOutput`]
///
/// Edge-functions run in order against clones of `ctx`; see the
/// [module docs](self) for the full table.
pub(crate) async fn normalize(result: CallResult, ctx: &ExecutionContext) -> StepOutput {
    let mut output = match result {
        CallResult::EdgeName(edge) => StepOutput::with_edges([edge]),
        CallResult::Edges(edges) => StepOutput {
            edges,
            results: None,
            error_details: None,
        },
        CallResult::EdgeFns(fns) => {
            let mut edges = Vec::with_capacity(fns.len());
            let mut results = Vec::with_capacity(fns.len());
            for (edge, func) in fns {
                edges.push(edge);
                match func(ctx.clone()).await {
                    Ok(value) => results.push(value),
                    Err(error) => results.push(json!({"error": error.to_string()})),
                }
            }
            StepOutput {
                edges,
                results: if results.is_empty() {
                    None
                } else {
                    Some(results)
                },
                error_details: None,
            }
        }
        CallResult::Value(value) => match as_string_edges(&value) {
            Some(edges) => StepOutput {
                edges,
                results: None,
                error_details: None,
            },
            None => StepOutput {
                edges: vec!["pass".to_string()],
                results: Some(vec![value]),
                error_details: None,
            },
        },
    };

    if output.edges.is_empty() {
        output.edges.push("pass".to_string());
    }
    output
}
