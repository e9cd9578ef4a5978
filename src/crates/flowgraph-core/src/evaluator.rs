//! Node evaluation and composite orchestration
//!
//! One node is evaluated per step: the instance builds an
//! [`ExecutionContext`], dispatches on the parsed [`NodeKind`], records the
//! resulting [`Step`], and broadcasts a `flowManagerStep` event. Composite
//! shapes - subflows, branches, loops - spawn nested [`FlowInstance`]s that
//! share the parent's scope and hub, start from a deep copy of the parent's
//! state, and copy their final state back over the parent's wholesale when
//! they finish. Whole-state copy-back means a key removed by the child is
//! removed in the parent too; this is the contract, not an accident.
//!
//! Recoverable conditions keep the run alive: an identifier the scope
//! cannot resolve or a node shape the parser did not recognize becomes a
//! step with an `error` edge (plus `errorDetails`) that later branch nodes
//! can route on. Only an executable returning `Err` aborts the run.

use indexmap::IndexMap;
use serde_json::{json, Value};

use flowgraph_hub::{HubEvent, StepEvent};

use crate::context::ExecutionContext;
use crate::error::{FlowError, Result};
use crate::instance::{FlowConfig, FlowInstance};
use crate::node::{Node, NodeKind};
use crate::output::{normalize, StepOutput};
use crate::scope::NodeFn;
use crate::step::Step;

/// Hard cap on loop iterations; reaching it forces an `exit_forced` edge
pub const MAX_LOOP_ITERATIONS: usize = 100;

impl FlowInstance {
    pub(crate) async fn evaluate_at(&mut self, index: usize) -> Result<()> {
        let node = self.nodes[index].clone();
        let ctx = self.build_context(index, &node);

        let (output, sub_steps) = self.evaluate_node(&node, index, &ctx).await?;
        let output = ensure_edges(output);

        self.steps.push(Step {
            node: node.repr().clone(),
            output,
            sub_steps,
        });
        self.emit_step_event(index);
        Ok(())
    }

    async fn evaluate_node(
        &mut self,
        node: &Node,
        index: usize,
        ctx: &ExecutionContext,
    ) -> Result<(StepOutput, Option<Vec<Step>>)> {
        match node.kind() {
            NodeKind::Inline(func) => {
                let label = format!("workflow function @ {index}");
                let output = self.invoke(func, ctx, None, &label).await?;
                Ok((output, None))
            }
            NodeKind::Call(id) => match self.scope.resolve(id) {
                Some(resolved) => {
                    let output = self.invoke(&resolved.func, ctx, None, id).await?;
                    Ok((output, None))
                }
                None => Ok((unresolved_output(id), None)),
            },
            NodeKind::ParamCall { target, params } => match self.scope.resolve(target) {
                Some(resolved) => {
                    let output = self
                        .invoke(&resolved.func, ctx, params.clone(), target)
                        .await?;
                    Ok((output, None))
                }
                None => Ok((unresolved_output(target), None)),
            },
            NodeKind::Empty => Ok((StepOutput::pass(), None)),
            NodeKind::Subflow(nodes) => self.run_subflow(nodes.clone(), index).await,
            NodeKind::Loop {
                controller,
                actions,
            } => {
                self.run_loop(controller.as_ref().clone(), actions.clone(), index)
                    .await
            }
            NodeKind::Branch(arms) => self.run_branch(arms.clone(), index).await,
            NodeKind::Unknown => {
                tracing::warn!(
                    instance = %self.instance_id,
                    node = index,
                    "unrecognized node shape; continuing with error edge"
                );
                Ok((
                    StepOutput {
                        edges: vec!["error".to_string(), "pass".to_string()],
                        results: None,
                        error_details: Some("Unknown node type".to_string()),
                    },
                    None,
                ))
            }
        }
    }

    async fn invoke(
        &self,
        func: &NodeFn,
        ctx: &ExecutionContext,
        params: Option<Value>,
        label: &str,
    ) -> Result<StepOutput> {
        match func(ctx.clone(), params).await {
            Ok(result) => Ok(normalize(result, ctx).await),
            Err(error) => Err(FlowError::node_execution(label, error.to_string())),
        }
    }

    async fn run_subflow(
        &mut self,
        nodes: Vec<Node>,
        index: usize,
    ) -> Result<(StepOutput, Option<Vec<Step>>)> {
        let child_id = format!("{}-subflow-idx{}", self.instance_id, index);
        let mut child = self.spawn_child(nodes, child_id);
        let child_steps = child.run_boxed().await?;
        self.adopt_child_state(&child);

        let output = last_output(&child_steps);
        Ok((output, Some(child_steps)))
    }

    async fn run_branch(
        &mut self,
        arms: IndexMap<String, Vec<Node>>,
        index: usize,
    ) -> Result<(StepOutput, Option<Vec<Step>>)> {
        let previous_edges = self
            .steps
            .last()
            .map(|step| step.output.edges.clone())
            .unwrap_or_default();

        for (edge, arm) in arms {
            if previous_edges.iter().any(|e| *e == edge) {
                let child_id = format!("{}-branch-idx{}", self.instance_id, index);
                let mut child = self.spawn_child(arm, child_id);
                let child_steps = child.run_boxed().await?;
                self.adopt_child_state(&child);

                let output = last_output(&child_steps);
                return Ok((output, Some(child_steps)));
            }
        }
        Ok((StepOutput::pass(), None))
    }

    async fn run_loop(
        &mut self,
        controller: Node,
        actions: Vec<Node>,
        index: usize,
    ) -> Result<(StepOutput, Option<Vec<Step>>)> {
        let mut internal_steps = Vec::new();
        let mut last = StepOutput::pass();
        let mut exited = false;

        for iteration in 0..MAX_LOOP_ITERATIONS {
            let child_id = format!(
                "{}-loop-idx{}-iter{}-controller",
                self.instance_id, index, iteration
            );
            let mut child = self.spawn_child(vec![controller.clone()], child_id);
            let controller_steps = child.run_boxed().await?;
            self.adopt_child_state(&child);

            // A controller that recorded nothing reads as an exit request.
            let controller_output = controller_steps
                .last()
                .map(|step| step.output.clone())
                .unwrap_or_else(|| StepOutput::with_edges(["exit"]));

            internal_steps.push(Step {
                node: controller.repr().clone(),
                output: controller_output.clone(),
                sub_steps: Some(controller_steps),
            });
            last = controller_output.clone();

            if controller_output.has_edge("exit") || controller_output.has_edge("exit_forced") {
                exited = true;
                break;
            }

            if !actions.is_empty() {
                let child_id = format!(
                    "{}-loop-idx{}-iter{}-actions",
                    self.instance_id, index, iteration
                );
                let mut child = self.spawn_child(actions.clone(), child_id);
                let action_steps = child.run_boxed().await?;
                self.adopt_child_state(&child);

                let actions_output = last_output(&action_steps);
                internal_steps.push(Step {
                    node: Value::Array(actions.iter().map(|n| n.repr().clone()).collect()),
                    output: actions_output.clone(),
                    sub_steps: Some(action_steps),
                });
                last = actions_output;
            }
        }

        if !exited {
            tracing::warn!(
                instance = %self.instance_id,
                node = index,
                cap = MAX_LOOP_ITERATIONS,
                "loop reached iteration cap; forcing exit"
            );
            last = StepOutput::with_edges(["exit_forced"]);
        }

        Ok((last, Some(internal_steps)))
    }

    fn spawn_child(&self, nodes: Vec<Node>, instance_id: String) -> FlowInstance {
        FlowInstance::new(
            FlowConfig::new(nodes)
                .with_initial_state(self.state.state())
                .with_scope(self.scope.clone())
                .with_instance_id(instance_id)
                .with_hub(self.hub.clone()),
        )
    }

    // Whole-state replacement: keys the child dropped disappear here too.
    fn adopt_child_state(&self, child: &FlowInstance) {
        self.state.set("", child.state_manager().state());
    }

    fn build_context(&self, index: usize, node: &Node) -> ExecutionContext {
        let input = match self.steps.last().and_then(|step| step.output.results.as_ref()) {
            Some(results) if results.len() == 1 => results[0].clone(),
            Some(results) if results.len() > 1 => Value::Array(results.clone()),
            _ => Value::Null,
        };

        ExecutionContext {
            state: self.state.clone(),
            steps: self.steps.clone(),
            nodes: self.nodes_repr.clone(),
            self_info: self.describe_node(node, index),
            input,
            flow_instance_id: self.instance_id.clone(),
            node_index: index,
            node_repr: node.repr().clone(),
            hub: self.hub.clone(),
            registered_listeners: self.registered_listeners.clone(),
        }
    }

    /// The `self` description a node sees: the capability record where one
    /// exists, a synthetic record otherwise, the raw structure for
    /// composites.
    fn describe_node(&self, node: &Node, index: usize) -> Value {
        match node.kind() {
            NodeKind::Call(id) => match self.scope.resolve(id) {
                Some(resolved) => match resolved.capability {
                    Some(capability) => capability.to_value(),
                    None => json!({"id": id, "name": id, "source": "scope"}),
                },
                None => json!({
                    "id": id,
                    "name": id,
                    "source": "scope",
                    "_unresolvedIdentifier": true,
                }),
            },
            NodeKind::Inline(_) => json!({
                "id": format!("workflow-fn-{index}"),
                "name": format!("Workflow-Defined Function @ {index}"),
                "source": "workflow",
                "_isWorkflowProvidedFunction": true,
            }),
            NodeKind::ParamCall { target, params } => {
                let mut record = match self.scope.resolve(target) {
                    Some(resolved) => match resolved.capability {
                        Some(capability) => capability.to_value(),
                        None => json!({"id": target, "name": target, "source": "scope"}),
                    },
                    None => json!({
                        "id": target,
                        "name": target,
                        "source": "scope",
                        "_unresolvedIdentifier": true,
                    }),
                };
                if let Some(map) = record.as_object_mut() {
                    map.insert(
                        "parametersProvided".to_string(),
                        params.clone().unwrap_or_else(|| json!({})),
                    );
                    map.insert("_isParameterizedCall".to_string(), json!(true));
                }
                record
            }
            NodeKind::Subflow(_)
            | NodeKind::Loop { .. }
            | NodeKind::Branch(_)
            | NodeKind::Empty
            | NodeKind::Unknown => node.repr().clone(),
        }
    }

    fn emit_step_event(&self, index: usize) {
        if let Some(step) = self.steps.last() {
            self.hub.emit(HubEvent::Step(StepEvent {
                flow_instance_id: self.instance_id.clone(),
                step_index: index,
                step_data: step.to_event_value(),
                current_state: self.state.state(),
            }));
        }
    }
}

fn ensure_edges(mut output: StepOutput) -> StepOutput {
    if output.edges.is_empty() {
        output.edges.push("pass".to_string());
    }
    output
}

fn last_output(steps: &[Step]) -> StepOutput {
    steps
        .last()
        .map(|step| step.output.clone())
        .unwrap_or_else(StepOutput::pass)
}

fn unresolved_output(id: &str) -> StepOutput {
    tracing::warn!(identifier = %id, "node identifier not found in scope");
    StepOutput {
        edges: vec!["error".to_string()],
        results: None,
        error_details: Some(format!("Node '{id}' not found in scope")),
    }
}
