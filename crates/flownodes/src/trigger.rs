use async_trait::async_trait;
use flowcore::{ConfigMap, NodeContext, NodeError, NodeHandler, NodeOutput, NodeType, Value};

/// Entry point of a run: hands the run inputs to downstream nodes, tagged
/// with the configured `trigger_type`.
pub struct TriggerHandler;

#[async_trait]
impl NodeHandler for TriggerHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Trigger
    }

    fn description(&self) -> &str {
        "Starts a run and passes its inputs through"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let trigger_type = ctx.require_config_str("trigger_type")?.to_string();
        tracing::debug!(node_id = %ctx.node_id, %trigger_type, "Trigger fired");

        let mut outputs = ctx.inputs;
        outputs.insert("trigger_type".to_string(), Value::from(trigger_type));
        Ok(NodeOutput::from_outputs(outputs))
    }

    fn validate_config(&self, config: &ConfigMap) -> Result<(), NodeError> {
        match config.get("trigger_type") {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
            _ => Err(NodeError::InvalidConfig(
                "trigger_type must be a non-empty string".to_string(),
            )),
        }
    }
}
