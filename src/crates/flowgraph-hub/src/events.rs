//! Hub event types
//!
//! Every broadcast carries one of the payloads below. The `stepData`,
//! `currentState` and node `definition` fields are plain [`Value`] trees:
//! the hub sits below the engine in the dependency order and never
//! interprets what it relays. All payloads serialize with camelCase keys,
//! matching the wire shape external consumers observe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The five broadcast channels of the hub
///
/// Listeners register against a kind; [`HubEventKind::name`] returns the
/// literal event name used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubEventKind {
    /// A pause was registered (`flowPaused`)
    FlowPaused,
    /// A pause was resolved (`flowResumed`)
    FlowResumed,
    /// A resume targeted an unknown pause id (`resumeFailed`)
    ResumeFailed,
    /// A flow instance recorded a step (`flowManagerStep`)
    Step,
    /// A node emitted a custom event (`flowManagerNodeEvent`)
    NodeEvent,
}

impl HubEventKind {
    /// Wire name of this event
    pub const fn name(&self) -> &'static str {
        match self {
            HubEventKind::FlowPaused => "flowPaused",
            HubEventKind::FlowResumed => "flowResumed",
            HubEventKind::ResumeFailed => "resumeFailed",
            HubEventKind::Step => "flowManagerStep",
            HubEventKind::NodeEvent => "flowManagerNodeEvent",
        }
    }
}

/// Payload of `flowPaused`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    /// Identity of the held pause
    pub pause_id: String,
    /// Caller-supplied context (prompt, options, anything)
    pub details: Value,
    /// Instance that requested the pause
    pub flow_instance_id: String,
}

/// Payload of `flowResumed`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumedEvent {
    /// Identity of the resolved pause
    pub pause_id: String,
    /// Value handed to the waiter
    pub resume_data: Value,
    /// Context the pause was registered with
    pub details: Value,
    /// Instance that had requested the pause
    pub flow_instance_id: String,
}

/// Payload of `resumeFailed`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeFailedEvent {
    /// Id the resume targeted
    pub pause_id: String,
    /// Why the resume failed
    pub reason: String,
}

/// Payload of `flowManagerStep`, broadcast after every evaluated node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    /// Instance that recorded the step
    pub flow_instance_id: String,
    /// 0-based index of the step within the run
    pub step_index: usize,
    /// Serialized step record (node, output, subSteps)
    pub step_data: Value,
    /// Deep copy of the instance state after the step
    pub current_state: Value,
}

/// A node position within a flow, carried by [`NodeEvent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    /// Index of the node in its instance's node list
    pub index: usize,
    /// Serialized node definition
    pub definition: Value,
}

/// Payload of `flowManagerNodeEvent`, broadcast when a node calls `emit`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    /// Instance the emitting node belongs to
    pub flow_instance_id: String,
    /// The emitting node
    pub emitting_node: NodeRef,
    /// Application-chosen event name
    pub custom_event_name: String,
    /// Application payload
    pub event_data: Value,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

/// A broadcast event, tagged by channel
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// See [`PausedEvent`]
    FlowPaused(PausedEvent),
    /// See [`ResumedEvent`]
    FlowResumed(ResumedEvent),
    /// See [`ResumeFailedEvent`]
    ResumeFailed(ResumeFailedEvent),
    /// See [`StepEvent`]
    Step(StepEvent),
    /// See [`NodeEvent`]
    NodeEvent(NodeEvent),
}

impl HubEvent {
    /// Channel this event belongs to
    pub fn kind(&self) -> HubEventKind {
        match self {
            HubEvent::FlowPaused(_) => HubEventKind::FlowPaused,
            HubEvent::FlowResumed(_) => HubEventKind::FlowResumed,
            HubEvent::ResumeFailed(_) => HubEventKind::ResumeFailed,
            HubEvent::Step(_) => HubEventKind::Step,
            HubEvent::NodeEvent(_) => HubEventKind::NodeEvent,
        }
    }
}
