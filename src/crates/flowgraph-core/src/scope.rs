//! Scope: the identifier space of executable capabilities
//!
//! A flow refers to its node implementations by string. The [`Scope`] maps
//! those strings to either a bare executable or a [`Capability`] record
//! (executable plus metadata). Resolution of an identifier `q` tries, in
//! order:
//!
//! 1. the exact key `q`;
//! 2. the first key of the form `q:*` holding a capability record;
//! 3. the first key of the form `*:q` holding a capability record.
//!
//! Prefix/suffix scans walk the map in insertion order, which the underlying
//! `IndexMap` preserves, so resolution is deterministic within a process.
//! Hosts registering capabilities under `id:name` keys get lookup by id
//! (prefix) and by name (suffix) for free.

use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::output::CallResult;

/// An async node executable
///
/// Receives the [`ExecutionContext`] and, for parameterized calls, the
/// parameter mapping. Returns a [`CallResult`] that the output normalizer
/// converts to canonical step output. An `Err` fails the whole run.
pub type NodeFn = Arc<
    dyn Fn(
            ExecutionContext,
            Option<Value>,
        ) -> BoxFuture<'static, std::result::Result<CallResult, Box<dyn std::error::Error + Send + Sync>>>
        + Send
        + Sync,
>;

/// Wrap an async closure as a [`NodeFn`]
///
/// ```rust
/// use flowgraph_core::{node_fn, CallResult};
///
/// let f = node_fn(|_ctx, _params| async { Ok(CallResult::from("pass")) });
/// # let _ = f;
/// ```
pub fn node_fn<F, Fut>(f: F) -> NodeFn
where
    F: Fn(ExecutionContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<
            Output = std::result::Result<CallResult, Box<dyn std::error::Error + Send + Sync>>,
        > + Send
        + 'static,
{
    Arc::new(move |ctx, params| Box::pin(f(ctx, params)))
}

/// An executable registered with identity and optional metadata
///
/// The `extra` mapping carries host-supplied documentation (inputs, outputs,
/// edge descriptions, anything); the engine surfaces it through the node's
/// `self` description but never interprets it.
#[derive(Clone)]
pub struct Capability {
    /// Stable identifier (often a path-derived id)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// The executable itself
    pub implementation: NodeFn,
    /// Opaque metadata merged into the `self` description
    pub extra: Map<String, Value>,
}

impl Capability {
    /// Create a capability with the given identity and executable
    pub fn new(id: impl Into<String>, name: impl Into<String>, implementation: NodeFn) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            implementation,
            extra: Map::new(),
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach one opaque metadata entry
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The record as seen by nodes through `self`
    pub fn to_value(&self) -> Value {
        let mut record = Map::new();
        record.insert("id".to_string(), Value::String(self.id.clone()));
        record.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(description) = &self.description {
            record.insert(
                "description".to_string(),
                Value::String(description.clone()),
            );
        }
        for (key, value) in &self.extra {
            record.insert(key.clone(), value.clone());
        }
        Value::Object(record)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// One scope entry: a full capability record or a bare executable
#[derive(Clone)]
pub enum ScopeEntry {
    /// Executable with identity and metadata
    Capability(Capability),
    /// Executable registered without a record
    Bare(NodeFn),
}

/// Outcome of a successful [`Scope::resolve`]
#[derive(Clone)]
pub struct Resolved {
    /// The executable to invoke
    pub func: NodeFn,
    /// The capability record, when the match had one
    pub capability: Option<Capability>,
}

/// Insertion-ordered map from identifier to capability
#[derive(Clone, Default)]
pub struct Scope {
    entries: IndexMap<String, ScopeEntry>,
}

impl Scope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bare executable under `key`
    pub fn insert_fn(&mut self, key: impl Into<String>, func: NodeFn) {
        self.entries.insert(key.into(), ScopeEntry::Bare(func));
    }

    /// Register a capability record under `key`
    pub fn insert_capability(&mut self, key: impl Into<String>, capability: Capability) {
        self.entries
            .insert(key.into(), ScopeEntry::Capability(capability));
    }

    /// Whether `key` is registered verbatim
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the scope has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve identifier `q` to an executable
    ///
    /// Direct match first, then the first `q:*` key with a capability
    /// record, then the first `*:q` key with a capability record, scanning
    /// in insertion order. Bare executables only match directly.
    pub fn resolve(&self, q: &str) -> Option<Resolved> {
        if let Some(entry) = self.entries.get(q) {
            return Some(match entry {
                ScopeEntry::Capability(capability) => Resolved {
                    func: capability.implementation.clone(),
                    capability: Some(capability.clone()),
                },
                ScopeEntry::Bare(func) => Resolved {
                    func: func.clone(),
                    capability: None,
                },
            });
        }

        let prefix = format!("{q}:");
        let by_prefix = self
            .capabilities()
            .find(|(key, _)| key.starts_with(&prefix));
        if let Some((_, capability)) = by_prefix {
            return Some(Resolved {
                func: capability.implementation.clone(),
                capability: Some(capability.clone()),
            });
        }

        let suffix = format!(":{q}");
        let by_suffix = self.capabilities().find(|(key, _)| key.ends_with(&suffix));
        by_suffix.map(|(_, capability)| Resolved {
            func: capability.implementation.clone(),
            capability: Some(capability.clone()),
        })
    }

    fn capabilities(&self) -> impl Iterator<Item = (&String, &Capability)> {
        self.entries.iter().filter_map(|(key, entry)| match entry {
            ScopeEntry::Capability(capability) => Some((key, capability)),
            ScopeEntry::Bare(_) => None,
        })
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CallResult;

    fn pass_fn() -> NodeFn {
        node_fn(|_ctx, _params| async { Ok(CallResult::from("pass")) })
    }

    fn capability(id: &str, name: &str) -> Capability {
        Capability::new(id, name, pass_fn())
    }

    #[test]
    fn test_direct_match_bare_fn() {
        let mut scope = Scope::new();
        scope.insert_fn("A", pass_fn());

        let resolved = scope.resolve("A").unwrap();
        assert!(resolved.capability.is_none());
    }

    #[test]
    fn test_direct_match_preferred_over_prefix_and_suffix() {
        let mut scope = Scope::new();
        scope.insert_capability("mail.send:Send", capability("mail.send", "Send"));
        scope.insert_capability("mail", capability("mail-direct", "Mail"));

        let resolved = scope.resolve("mail").unwrap();
        assert_eq!(resolved.capability.unwrap().id, "mail-direct");
    }

    #[test]
    fn test_prefix_match_by_id() {
        let mut scope = Scope::new();
        scope.insert_capability("mail.send:Send Email", capability("mail.send", "Send Email"));

        let resolved = scope.resolve("mail.send").unwrap();
        assert_eq!(resolved.capability.unwrap().name, "Send Email");
    }

    #[test]
    fn test_suffix_match_by_name() {
        let mut scope = Scope::new();
        scope.insert_capability("mail.send:Send Email", capability("mail.send", "Send Email"));

        let resolved = scope.resolve("Send Email").unwrap();
        assert_eq!(resolved.capability.unwrap().id, "mail.send");
    }

    #[test]
    fn test_prefix_beats_suffix_and_first_wins() {
        let mut scope = Scope::new();
        scope.insert_capability("q:one", capability("q1", "one"));
        scope.insert_capability("q:two", capability("q2", "two"));
        scope.insert_capability("other:q", capability("suffix-hit", "q"));

        let resolved = scope.resolve("q").unwrap();
        assert_eq!(resolved.capability.unwrap().id, "q1");
    }

    #[test]
    fn test_bare_fn_never_matches_prefix() {
        let mut scope = Scope::new();
        scope.insert_fn("q:one", pass_fn());

        assert!(scope.resolve("q").is_none());
    }

    #[test]
    fn test_miss() {
        let scope = Scope::new();
        assert!(scope.resolve("missing").is_none());
    }

    #[test]
    fn test_capability_record_surface() {
        let cap = capability("calc", "Calculator")
            .with_description("does math")
            .with_extra("edges", serde_json::json!(["pass", "error"]));

        let record = cap.to_value();
        assert_eq!(record["id"], "calc");
        assert_eq!(record["name"], "Calculator");
        assert_eq!(record["description"], "does math");
        assert_eq!(record["edges"][0], "pass");
    }
}
