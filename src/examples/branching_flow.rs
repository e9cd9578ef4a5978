//! Branching flow example
//!
//! A classifier node emits an edge, and the following branch node routes on
//! it. Also shows the loop shape: a controller counts up and exits.

use flowgraph_core::{node_fn, CallResult, FlowConfig, FlowInstance, Scope};
use flowgraph_hub::FlowHub;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Branching Flow Example ===\n");

    let mut scope = Scope::new();

    scope.insert_fn(
        "classify",
        node_fn(|ctx, _params| async move {
            let amount = ctx.state.get("amount").as_i64().unwrap_or(0);
            let edge = if amount > 100 { "big" } else { "small" };
            println!("classify: amount={} -> {}", amount, edge);
            Ok(CallResult::from(edge))
        }),
    );

    scope.insert_fn(
        "handle_big",
        node_fn(|ctx, _params| async move {
            ctx.state.set("route", json!("escalated"));
            Ok(CallResult::pass())
        }),
    );

    scope.insert_fn(
        "handle_small",
        node_fn(|ctx, _params| async move {
            ctx.state.set("route", json!("auto-approved"));
            Ok(CallResult::pass())
        }),
    );

    scope.insert_fn(
        "count",
        node_fn(|ctx, _params| async move {
            let n = ctx.state.get("n").as_i64().unwrap_or(0) + 1;
            ctx.state.set("n", json!(n));
            println!("count: n={}", n);
            Ok(CallResult::from(if n >= 3 { "exit" } else { "continue" }))
        }),
    );

    let scope = Arc::new(scope);

    // Classify, branch on the edge, then loop a counter to three.
    let nodes = json!([
        "classify",
        {"big": "handle_big", "small": "handle_small"},
        [["count"]]
    ]);

    let mut flow = FlowInstance::new(
        FlowConfig::from_value(&nodes, &scope)
            .with_scope(scope.clone())
            .with_initial_state(json!({"amount": 250}))
            .with_hub(Arc::new(FlowHub::new())),
    );

    let steps = flow.run().await?;

    println!("\nRecorded {} steps", steps.len());
    for (index, step) in steps.iter().enumerate() {
        println!("  step {}: edges={:?}", index, step.output.edges);
    }
    println!("Final state: {}", flow.state_manager().state());

    Ok(())
}
