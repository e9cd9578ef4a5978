//! Human approval example
//!
//! A node suspends on `human_input`; a separate task plays the human,
//! watching for the `flowPaused` event and resuming the pause through the
//! hub with an approval payload.

use flowgraph_core::{node_fn, CallResult, FlowConfig, FlowInstance, Scope};
use flowgraph_hub::{FlowHub, HubEvent, HubEventKind};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Human Approval Example ===\n");

    let hub = Arc::new(FlowHub::new());

    // Play the human: resume any pause as soon as it appears.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    hub.add_listener(
        HubEventKind::FlowPaused,
        Arc::new(move |event| {
            if let HubEvent::FlowPaused(paused) = event {
                println!("pause requested: {} ({})", paused.pause_id, paused.details);
                let _ = tx.send(paused.pause_id.clone());
            }
        }),
    );

    let resumer_hub = hub.clone();
    tokio::spawn(async move {
        while let Some(pause_id) = rx.recv().await {
            resumer_hub.resume(&pause_id, json!({"approved": true, "by": "operator"}));
        }
    });

    let mut scope = Scope::new();
    scope.insert_fn(
        "propose",
        node_fn(|ctx, _params| async move {
            ctx.state.set("proposal", json!("delete 14 stale records"));
            Ok(CallResult::pass())
        }),
    );
    scope.insert_fn(
        "await_approval",
        node_fn(|ctx, _params| async move {
            let proposal = ctx.state.get("proposal");
            let verdict = ctx
                .human_input(json!({"prompt": "Approve?", "proposal": proposal}), None)
                .await?;
            println!("resumed with: {}", verdict);
            ctx.state.set("verdict", verdict);
            Ok(CallResult::pass())
        }),
    );
    let scope = Arc::new(scope);

    let mut flow = FlowInstance::new(
        FlowConfig::from_value(&json!(["propose", "await_approval"]), &scope)
            .with_scope(scope.clone())
            .with_hub(hub.clone()),
    );

    let steps = flow.run().await?;

    println!("\nRecorded {} steps", steps.len());
    println!("Final state: {}", flow.state_manager().state());

    Ok(())
}
