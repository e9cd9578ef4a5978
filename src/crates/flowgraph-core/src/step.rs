//! Step records: the audit trail of a run

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::output::StepOutput;

/// Record of one evaluated node
///
/// Composite nodes (subflows, loops, branches) carry the trace of their
/// child instances in `sub_steps`. Serializes to the camelCase wire shape
/// carried by the `flowManagerStep` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// The node definition, as originally written
    pub node: Value,
    /// Canonical output of the node
    pub output: StepOutput,
    /// Child-instance trace for composite nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_steps: Option<Vec<Step>>,
}

impl Step {
    /// Serialized form for event payloads
    ///
    /// Step trees are JSON values throughout, so this cannot fail in
    /// practice; a defective tree degrades to null rather than panicking.
    pub(crate) fn to_event_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_wire_shape() {
        let step = Step {
            node: json!("fetch"),
            output: StepOutput {
                edges: vec!["pass".to_string()],
                results: Some(vec![json!(7)]),
                error_details: None,
            },
            sub_steps: Some(vec![Step {
                node: json!("child"),
                output: StepOutput::pass(),
                sub_steps: None,
            }]),
        };

        let wire = step.to_event_value();
        assert_eq!(wire["node"], "fetch");
        assert_eq!(wire["output"]["edges"][0], "pass");
        assert_eq!(wire["output"]["results"][0], 7);
        assert_eq!(wire["subSteps"][0]["node"], "child");
        assert!(wire["subSteps"][0].get("subSteps").is_none());
    }

    #[test]
    fn test_step_roundtrips_through_json() {
        let step = Step {
            node: json!({"K": {"x": 1}}),
            output: StepOutput::with_edges(["big", "small"]),
            sub_steps: None,
        };

        let text = serde_json::to_string(&step).unwrap();
        let back: Step = serde_json::from_str(&text).unwrap();
        assert_eq!(back.node, step.node);
        assert_eq!(back.output, step.output);
        assert!(back.sub_steps.is_none());
    }
}
