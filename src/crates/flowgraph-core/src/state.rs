//! Per-flow state with linear history
//!
//! Every flow instance owns one [`StateStore`]: a JSON value tree addressed
//! by dot-separated key paths, plus a linear snapshot history supporting
//! undo/redo/goto. Handles are cheap clones sharing the same store; the
//! values they return are always deep copies, so mutating a returned
//! snapshot never bleeds back into history.
//!
//! # History model
//!
//! The history is a flat list of snapshots with a cursor. Construction seeds
//! it with the initial state, so it is never empty. Every successful
//! [`StateStore::set`] truncates everything after the cursor and appends a
//! new snapshot - time-traveling back and then writing discards the redo
//! tail, exactly like an editor's undo stack. There is no branching tree.
//!
//! # Sharp edges (kept on purpose)
//!
//! These behaviors are part of the contract and must not be "fixed":
//!
//! - [`StateStore::get`] returns the empty string both for a missing path
//!   and for a value that *is* the empty string. Callers cannot tell the
//!   two apart.
//! - [`StateStore::set`] through an intermediate segment that exists but is
//!   not a mapping silently replaces that segment with a fresh mapping,
//!   erasing whatever was there.
//! - `set` with an empty path replaces the root wholesale.
//!
//! # Example
//!
//! ```rust
//! use flowgraph_core::StateStore;
//! use serde_json::json;
//!
//! let state = StateStore::new(json!({"user": {"name": "Ada"}}));
//! state.set("user.age", json!(36));
//!
//! assert_eq!(state.get("user.age"), json!(36));
//! assert_eq!(state.get("user.missing"), json!(""));
//!
//! state.undo();
//! assert_eq!(state.get("user.age"), json!(""));
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

struct StateInner {
    history: Vec<Value>,
    index: usize,
}

/// Key-path addressable state with linear undo/redo history
///
/// Cloning a `StateStore` produces another handle to the same store. See the
/// [module docs](self) for the history model and the preserved sharp edges.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<RwLock<StateInner>>,
}

impl StateStore {
    /// Create a store whose history starts at `initial`
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StateInner {
                history: vec![initial],
                index: 0,
            })),
        }
    }

    /// Read the value at a dot-separated `path`
    ///
    /// Mappings are descended by key, sequences by numeric segment. Returns
    /// the empty string when any segment is missing or the leaf is null -
    /// indistinguishable from a stored empty string. An empty `path` returns
    /// the whole root.
    pub fn get(&self, path: &str) -> Value {
        let inner = self.inner.read();
        let mut current = &inner.history[inner.index];
        if path.is_empty() {
            return current.clone();
        }
        for segment in path.split('.') {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Value::String(String::new()),
            }
        }
        if current.is_null() {
            Value::String(String::new())
        } else {
            current.clone()
        }
    }

    /// Replace the subtree at `path` with `value`, recording a new snapshot
    ///
    /// Intermediate mappings are created where missing; an intermediate that
    /// exists as a non-mapping is replaced with a mapping (data at that
    /// segment is lost). An empty `path` replaces the root wholesale. Any
    /// snapshots after the current cursor are discarded.
    pub fn set(&self, path: &str, value: Value) {
        let mut inner = self.inner.write();
        let snapshot = if path.is_empty() {
            value
        } else {
            let mut root = inner.history[inner.index].clone();
            if !root.is_object() {
                root = Value::Object(Map::new());
            }
            let segments: Vec<&str> = path.split('.').collect();
            let mut current = &mut root;
            for segment in &segments[..segments.len() - 1] {
                let map = current.as_object_mut().expect("cursor is always a mapping");
                let entry = map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                current = entry;
            }
            let map = current.as_object_mut().expect("cursor is always a mapping");
            map.insert(segments[segments.len() - 1].to_string(), value);
            root
        };

        let index = inner.index;
        inner.history.truncate(index + 1);
        inner.history.push(snapshot);
        inner.index += 1;
    }

    /// Deep copy of the current state
    pub fn state(&self) -> Value {
        let inner = self.inner.read();
        inner.history[inner.index].clone()
    }

    /// Deep copy of the full snapshot history
    pub fn history(&self) -> Vec<Value> {
        self.inner.read().history.clone()
    }

    /// Position of the current snapshot within the history
    pub fn current_index(&self) -> usize {
        self.inner.read().index
    }

    /// Number of snapshots held
    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }

    /// Whether a step back is possible
    pub fn can_undo(&self) -> bool {
        self.inner.read().index > 0
    }

    /// Whether a step forward is possible
    pub fn can_redo(&self) -> bool {
        let inner = self.inner.read();
        inner.index + 1 < inner.history.len()
    }

    /// Move one snapshot back; returns whether anything changed
    pub fn undo(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.index > 0 {
            inner.index -= 1;
            true
        } else {
            false
        }
    }

    /// Move one snapshot forward; returns whether anything changed
    pub fn redo(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.index + 1 < inner.history.len() {
            inner.index += 1;
            true
        } else {
            false
        }
    }

    /// Jump to snapshot `index`; returns whether the index was valid
    pub fn go_to(&self, index: usize) -> bool {
        let mut inner = self.inner.write();
        if index < inner.history.len() {
            inner.index = index;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("StateStore")
            .field("history_len", &inner.history.len())
            .field("index", &inner.index)
            .finish()
    }
}
