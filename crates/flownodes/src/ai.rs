use async_trait::async_trait;
use flowcore::{
    ActionInvoker, ConfigMap, NodeContext, NodeError, NodeHandler, NodeOutput, NodeType, Value,
};
use std::sync::Arc;

/// AI task nodes delegate entirely to an injected model invoker.
pub struct AiTaskHandler {
    invoker: Arc<dyn ActionInvoker>,
}

impl AiTaskHandler {
    pub fn new(invoker: Arc<dyn ActionInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl NodeHandler for AiTaskHandler {
    fn node_type(&self) -> NodeType {
        NodeType::AiTask
    }

    fn description(&self) -> &str {
        "Runs a model task through the configured invoker"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let model = ctx.require_config_str("ai_model")?;
        tracing::debug!(node_id = %ctx.node_id, model, "Invoking AI task");

        let outputs = self
            .invoker
            .invoke(&ctx.cancellation, &ctx.config, &ctx.inputs)
            .await?;
        Ok(NodeOutput::from_outputs(outputs))
    }

    fn validate_config(&self, config: &ConfigMap) -> Result<(), NodeError> {
        match config.get("ai_model") {
            Some(Value::String(model)) if !model.trim().is_empty() => Ok(()),
            _ => Err(NodeError::InvalidConfig(
                "ai_model must be a non-empty string".to_string(),
            )),
        }
    }
}
