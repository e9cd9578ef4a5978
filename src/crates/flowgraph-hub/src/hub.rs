//! The process-wide hub: pause registry and event broadcast
//!
//! One [`FlowHub`] is shared by every flow instance that should see the same
//! pause namespace and event stream. [`FlowHub::global`] hands out the
//! process default; tests and embedders that want isolation construct their
//! own with [`FlowHub::new`].
//!
//! # Pause protocol
//!
//! [`FlowHub::request_pause`] registers a pending pause and returns a
//! [`PauseWaiter`]; the requesting task suspends on [`PauseWaiter::wait`].
//! An external party later calls [`FlowHub::resume`] with the pause id and a
//! payload, which wakes the waiter with exactly that payload. There is no
//! built-in timeout: cancellation is a `resume` with a payload the node
//! interprets as such.
//!
//! Re-registering a held pause id replaces the resolver. The displaced
//! waiter is orphaned and observes [`HubError::Orphaned`]. Hosts that need
//! stable identities should supply their own unique ids or let the hub
//! generate one.
//!
//! # Broadcast semantics
//!
//! Listeners for a given event kind fire in registration order. The listener
//! list is copied out of the lock before firing, so a listener may call back
//! into the hub (register, resume, inspect) without deadlocking. A panicking
//! listener is logged and does not stop later listeners.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{HubError, Result};
use crate::events::{
    HubEvent, HubEventKind, PausedEvent, ResumeFailedEvent, ResumedEvent,
};

/// Callback invoked for every event of the kind it was registered under
pub type HubListener = Arc<dyn Fn(&HubEvent) + Send + Sync>;

/// Handle returned by [`FlowHub::add_listener`], used for removal
///
/// Function values have no identity in Rust, so deregistration goes through
/// this id rather than through the callback itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Arguments to [`FlowHub::request_pause`]
#[derive(Debug, Clone)]
pub struct PauseRequest {
    /// Caller-chosen pause id; generated when absent
    pub pause_id: Option<String>,
    /// Context shown to whoever resolves the pause
    pub details: Value,
    /// Instance requesting the pause
    pub flow_instance_id: String,
}

/// Pending completion returned by [`FlowHub::request_pause`]
pub struct PauseWaiter {
    pause_id: String,
    rx: oneshot::Receiver<Value>,
}

impl std::fmt::Debug for PauseWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseWaiter")
            .field("pause_id", &self.pause_id)
            .finish()
    }
}

impl PauseWaiter {
    /// Id under which this pause is held
    pub fn pause_id(&self) -> &str {
        &self.pause_id
    }

    /// Suspend until the pause is resumed, yielding the resume payload
    ///
    /// Fails with [`HubError::Orphaned`] if a later `request_pause` replaced
    /// this registration under the same id.
    pub async fn wait(self) -> Result<Value> {
        let pause_id = self.pause_id;
        self.rx.await.map_err(|_| HubError::Orphaned { pause_id })
    }
}

/// Snapshot entry returned by [`FlowHub::active_pauses`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePause {
    /// Identity of the held pause
    pub pause_id: String,
    /// Context it was registered with
    pub details: Value,
    /// Owning instance
    pub flow_instance_id: String,
}

struct PauseEntry {
    resolver: oneshot::Sender<Value>,
    details: Value,
    flow_instance_id: String,
}

struct HubInner {
    // Insertion-ordered so active_pauses() reports registration order.
    paused: IndexMap<String, PauseEntry>,
    listeners: HashMap<HubEventKind, Vec<(ListenerId, HubListener)>>,
    next_listener_id: u64,
}

/// Process-wide event bus and pause registry
///
/// See the [module docs](self) for the pause protocol and broadcast
/// semantics. All methods are callable from any thread; internal maps are
/// guarded by a single mutex that is never held while user code runs.
pub struct FlowHub {
    inner: Mutex<HubInner>,
    pause_counter: AtomicU64,
}

static GLOBAL_HUB: Lazy<Arc<FlowHub>> = Lazy::new(|| Arc::new(FlowHub::new()));

impl FlowHub {
    /// Create an isolated hub (private pause namespace and listener set)
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                paused: IndexMap::new(),
                listeners: HashMap::new(),
                next_listener_id: 0,
            }),
            pause_counter: AtomicU64::new(0),
        }
    }

    /// The process-wide default hub
    pub fn global() -> Arc<FlowHub> {
        GLOBAL_HUB.clone()
    }

    /// Register a pending pause and return its waiter
    ///
    /// When `pause_id` is absent an id of the form
    /// `{flowInstanceId}-{unix_millis}-{counter}` is generated. A supplied
    /// id that is already held replaces the previous registration (logged as
    /// a warning); the displaced waiter is orphaned. Emits `flowPaused`.
    pub fn request_pause(&self, request: PauseRequest) -> PauseWaiter {
        let PauseRequest {
            pause_id,
            details,
            flow_instance_id,
        } = request;

        let pause_id = pause_id.unwrap_or_else(|| {
            format!(
                "{}-{}-{}",
                flow_instance_id,
                chrono::Utc::now().timestamp_millis(),
                self.pause_counter.fetch_add(1, Ordering::Relaxed)
            )
        });

        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            if let Some(previous) = inner.paused.shift_remove(&pause_id) {
                tracing::warn!(
                    pause_id = %pause_id,
                    previous_instance = %previous.flow_instance_id,
                    "pause id re-used while active; replacing resolver and orphaning previous waiter"
                );
                // Dropping the previous sender wakes the old waiter with
                // HubError::Orphaned.
            }
            inner.paused.insert(
                pause_id.clone(),
                PauseEntry {
                    resolver: tx,
                    details: details.clone(),
                    flow_instance_id: flow_instance_id.clone(),
                },
            );
        }

        self.emit(HubEvent::FlowPaused(PausedEvent {
            pause_id: pause_id.clone(),
            details,
            flow_instance_id,
        }));

        PauseWaiter { pause_id, rx }
    }

    /// Resolve a held pause with `resume_data`
    ///
    /// On a hit the waiter wakes with exactly `resume_data`, the entry is
    /// removed, `flowResumed` is emitted and `true` is returned. On a miss
    /// `resumeFailed` is emitted and `false` is returned.
    pub fn resume(&self, pause_id: &str, resume_data: Value) -> bool {
        let entry = {
            let mut inner = self.inner.lock();
            inner.paused.shift_remove(pause_id)
        };

        match entry {
            Some(entry) => {
                // A dropped waiter just means nobody is listening anymore;
                // the resume still counts.
                if entry.resolver.send(resume_data.clone()).is_err() {
                    tracing::debug!(pause_id = %pause_id, "pause waiter dropped before resume");
                }
                self.emit(HubEvent::FlowResumed(ResumedEvent {
                    pause_id: pause_id.to_string(),
                    resume_data,
                    details: entry.details,
                    flow_instance_id: entry.flow_instance_id,
                }));
                true
            }
            None => {
                tracing::warn!(pause_id = %pause_id, "resume targeted an unknown pause id");
                self.emit(HubEvent::ResumeFailed(ResumeFailedEvent {
                    pause_id: pause_id.to_string(),
                    reason: "no active pause with this id".to_string(),
                }));
                false
            }
        }
    }

    /// Whether `pause_id` is currently held
    pub fn is_paused(&self, pause_id: &str) -> bool {
        self.inner.lock().paused.contains_key(pause_id)
    }

    /// Number of currently held pauses
    pub fn pause_count(&self) -> usize {
        self.inner.lock().paused.len()
    }

    /// Snapshot of all held pauses, in registration order
    pub fn active_pauses(&self) -> Vec<ActivePause> {
        let inner = self.inner.lock();
        inner
            .paused
            .iter()
            .map(|(id, entry)| ActivePause {
                pause_id: id.clone(),
                details: entry.details.clone(),
                flow_instance_id: entry.flow_instance_id.clone(),
            })
            .collect()
    }

    /// Register `listener` for events of `kind`; returns a removal handle
    pub fn add_listener(&self, kind: HubEventKind, listener: HubListener) -> ListenerId {
        let mut inner = self.inner.lock();
        let id = ListenerId(inner.next_listener_id);
        inner.next_listener_id += 1;
        inner.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    /// Remove a listener previously registered under `kind`
    ///
    /// Returns whether anything was removed.
    pub fn remove_listener(&self, kind: HubEventKind, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        match inner.listeners.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(listener_id, _)| *listener_id != id);
                list.len() != before
            }
            None => false,
        }
    }

    /// Broadcast `event` to every listener of its kind
    ///
    /// Listeners fire in registration order, outside the hub lock. A
    /// panicking listener is logged and suppressed.
    pub fn emit(&self, event: HubEvent) {
        let kind = event.kind();
        let listeners: Vec<HubListener> = {
            let inner = self.inner.lock();
            inner
                .listeners
                .get(&kind)
                .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::error!(event = kind.name(), "hub listener panicked; continuing");
            }
        }
    }
}

impl Default for FlowHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlowHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FlowHub")
            .field("active_pauses", &inner.paused.len())
            .field(
                "listeners",
                &inner.listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn collect_events(hub: &FlowHub, kind: HubEventKind) -> Arc<StdMutex<Vec<HubEvent>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        hub.add_listener(
            kind,
            Arc::new(move |event| {
                sink.lock().unwrap().push(event.clone());
            }),
        );
        seen
    }

    #[tokio::test]
    async fn test_pause_resume_roundtrip() {
        let hub = FlowHub::new();
        let paused = collect_events(&hub, HubEventKind::FlowPaused);
        let resumed = collect_events(&hub, HubEventKind::FlowResumed);

        let waiter = hub.request_pause(PauseRequest {
            pause_id: Some("p1".into()),
            details: json!({"prompt": "?"}),
            flow_instance_id: "flow-a".into(),
        });

        assert!(hub.is_paused("p1"));
        assert_eq!(paused.lock().unwrap().len(), 1);

        assert!(hub.resume("p1", json!({"answer": 42})));
        assert!(!hub.is_paused("p1"));

        let payload = waiter.wait().await.unwrap();
        assert_eq!(payload, json!({"answer": 42}));

        let resumed = resumed.lock().unwrap();
        assert_eq!(resumed.len(), 1);
        match &resumed[0] {
            HubEvent::FlowResumed(event) => {
                assert_eq!(event.pause_id, "p1");
                assert_eq!(event.resume_data, json!({"answer": 42}));
                assert_eq!(event.details, json!({"prompt": "?"}));
                assert_eq!(event.flow_instance_id, "flow-a");
            }
            other => panic!("expected FlowResumed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generated_pause_id_shape() {
        let hub = FlowHub::new();
        let waiter = hub.request_pause(PauseRequest {
            pause_id: None,
            details: Value::Null,
            flow_instance_id: "flow-gen".into(),
        });

        assert!(waiter.pause_id().starts_with("flow-gen-"));
        assert!(hub.is_paused(waiter.pause_id()));

        let second = hub.request_pause(PauseRequest {
            pause_id: None,
            details: Value::Null,
            flow_instance_id: "flow-gen".into(),
        });
        assert_ne!(waiter.pause_id(), second.pause_id());
    }

    #[tokio::test]
    async fn test_duplicate_pause_id_replaces_and_orphans() {
        let hub = FlowHub::new();

        let first = hub.request_pause(PauseRequest {
            pause_id: Some("dup".into()),
            details: json!(1),
            flow_instance_id: "flow-a".into(),
        });
        let second = hub.request_pause(PauseRequest {
            pause_id: Some("dup".into()),
            details: json!(2),
            flow_instance_id: "flow-b".into(),
        });

        // Only one entry is held.
        assert_eq!(hub.pause_count(), 1);

        // The first waiter is orphaned; the second gets the payload.
        assert!(matches!(
            first.wait().await,
            Err(HubError::Orphaned { pause_id }) if pause_id == "dup"
        ));
        assert!(hub.resume("dup", json!("late")));
        assert_eq!(second.wait().await.unwrap(), json!("late"));
    }

    #[tokio::test]
    async fn test_resume_miss_emits_resume_failed() {
        let hub = FlowHub::new();
        let failed = collect_events(&hub, HubEventKind::ResumeFailed);

        assert!(!hub.resume("ghost", json!(null)));

        let failed = failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        match &failed[0] {
            HubEvent::ResumeFailed(event) => assert_eq!(event.pause_id, "ghost"),
            other => panic!("expected ResumeFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_active_pauses_snapshot() {
        let hub = FlowHub::new();
        let _a = hub.request_pause(PauseRequest {
            pause_id: Some("a".into()),
            details: json!({"n": 1}),
            flow_instance_id: "flow-1".into(),
        });
        let _b = hub.request_pause(PauseRequest {
            pause_id: Some("b".into()),
            details: json!({"n": 2}),
            flow_instance_id: "flow-2".into(),
        });

        let active = hub.active_pauses();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].pause_id, "a");
        assert_eq!(active[1].pause_id, "b");
        assert_eq!(active[1].flow_instance_id, "flow-2");

        hub.resume("a", Value::Null);
        assert_eq!(hub.active_pauses().len(), 1);
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let hub = FlowHub::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let sink = order.clone();
            hub.add_listener(
                HubEventKind::ResumeFailed,
                Arc::new(move |_| sink.lock().unwrap().push(tag)),
            );
        }

        hub.emit(HubEvent::ResumeFailed(ResumeFailedEvent {
            pause_id: "x".into(),
            reason: "test".into(),
        }));

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let hub = FlowHub::new();
        let reached = Arc::new(StdMutex::new(false));

        hub.add_listener(
            HubEventKind::ResumeFailed,
            Arc::new(|_| panic!("listener exploded")),
        );
        let sink = reached.clone();
        hub.add_listener(
            HubEventKind::ResumeFailed,
            Arc::new(move |_| *sink.lock().unwrap() = true),
        );

        hub.emit(HubEvent::ResumeFailed(ResumeFailedEvent {
            pause_id: "x".into(),
            reason: "test".into(),
        }));

        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn test_remove_listener() {
        let hub = FlowHub::new();
        let count = Arc::new(StdMutex::new(0));

        let sink = count.clone();
        let id = hub.add_listener(
            HubEventKind::ResumeFailed,
            Arc::new(move |_| *sink.lock().unwrap() += 1),
        );

        let fire = || {
            hub.emit(HubEvent::ResumeFailed(ResumeFailedEvent {
                pause_id: "x".into(),
                reason: "test".into(),
            }))
        };

        fire();
        assert!(hub.remove_listener(HubEventKind::ResumeFailed, id));
        assert!(!hub.remove_listener(HubEventKind::ResumeFailed, id));
        fire();

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_listener_may_reenter_hub() {
        let hub = Arc::new(FlowHub::new());
        let hub_clone = hub.clone();
        let observed = Arc::new(StdMutex::new(0usize));
        let sink = observed.clone();

        hub.add_listener(
            HubEventKind::FlowPaused,
            Arc::new(move |_| {
                // Copy-on-fire means this must not deadlock.
                *sink.lock().unwrap() = hub_clone.pause_count();
            }),
        );

        let _waiter = hub.request_pause(PauseRequest {
            pause_id: Some("reentrant".into()),
            details: Value::Null,
            flow_instance_id: "flow".into(),
        });

        assert_eq!(*observed.lock().unwrap(), 1);
    }
}
