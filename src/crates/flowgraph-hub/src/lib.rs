//! # flowgraph-hub - Cross-Instance Coordination for Workflows
//!
//! The hub is the process-wide meeting point for every flow instance running
//! in this process. It does two jobs:
//!
//! - **Event bus** - broadcasts lifecycle events (step executed, node-emitted
//!   custom events, pause requested/resolved) to registered listeners, in
//!   registration order, isolating listener failures from each other.
//! - **Pause registry** - owns the identity space for pending pauses. A node
//!   that needs external or human input registers a pause and suspends on the
//!   returned [`PauseWaiter`]; an external caller resolves it with
//!   [`FlowHub::resume`] and the waiter yields the resume payload.
//!
//! Engine crates sit on top of this one and feed it serialized payloads; the
//! hub itself never interprets step or state data.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowgraph_hub::{FlowHub, PauseRequest};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = FlowHub::new();
//!
//! let waiter = hub.request_pause(PauseRequest {
//!     pause_id: Some("approval-1".into()),
//!     details: json!({"prompt": "Proceed?"}),
//!     flow_instance_id: "flow-demo".into(),
//! });
//!
//! assert!(hub.is_paused("approval-1"));
//! assert!(hub.resume("approval-1", json!({"approved": true})));
//!
//! let payload = waiter.wait().await.unwrap();
//! assert_eq!(payload["approved"], true);
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`hub`] - [`FlowHub`], the pause protocol and listener registry
//! - [`events`] - [`HubEvent`] and the typed event payloads
//! - [`error`] - [`HubError`]

pub mod error;
pub mod events;
pub mod hub;

pub use error::{HubError, Result};
pub use events::{
    HubEvent, HubEventKind, NodeEvent, NodeRef, PausedEvent, ResumeFailedEvent, ResumedEvent,
    StepEvent,
};
pub use hub::{ActivePause, FlowHub, HubListener, ListenerId, PauseRequest, PauseWaiter};
