use async_trait::async_trait;
use flowcore::{
    ActionInvoker, ConfigMap, NodeContext, NodeError, NodeHandler, NodeOutput, NodeType, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::debug::LogAction;
use crate::http::HttpAction;
use crate::time::DelayAction;

/// Runs action nodes by looking up their `action_type` in a table of invokers.
#[derive(Clone, Default)]
pub struct ActionHandler {
    actions: HashMap<String, Arc<dyn ActionInvoker>>,
}

impl ActionHandler {
    /// Handler with no actions registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler with the built-in `http`, `delay` and `log` actions
    pub fn builtin() -> Self {
        Self::new()
            .with_action("http", Arc::new(HttpAction::new()))
            .with_action("delay", Arc::new(DelayAction))
            .with_action("log", Arc::new(LogAction))
    }

    pub fn with_action(
        mut self,
        action_type: impl Into<String>,
        invoker: Arc<dyn ActionInvoker>,
    ) -> Self {
        self.actions.insert(action_type.into(), invoker);
        self
    }

    /// Known action types, sorted
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    fn resolve<'a>(
        &'a self,
        config: &'a ConfigMap,
    ) -> Result<(&'a str, &'a Arc<dyn ActionInvoker>), NodeError> {
        let action_type = match config.get("action_type") {
            Some(Value::String(s)) => s.as_str(),
            Some(_) => {
                return Err(NodeError::InvalidConfig(
                    "action_type must be a string".to_string(),
                ))
            }
            None => {
                return Err(NodeError::InvalidConfig(
                    "missing config: action_type".to_string(),
                ))
            }
        };
        let invoker = self.actions.get(action_type).ok_or_else(|| {
            NodeError::InvalidConfig(format!("unknown action type: {}", action_type))
        })?;
        Ok((action_type, invoker))
    }
}

#[async_trait]
impl NodeHandler for ActionHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Action
    }

    fn description(&self) -> &str {
        "Invokes the action named by action_type"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let (action_type, invoker) = self.resolve(&ctx.config)?;
        tracing::debug!(node_id = %ctx.node_id, action_type, "Invoking action");

        let outputs = invoker
            .invoke(&ctx.cancellation, &ctx.config, &ctx.inputs)
            .await?;
        Ok(NodeOutput::from_outputs(outputs))
    }

    fn validate_config(&self, config: &ConfigMap) -> Result<(), NodeError> {
        self.resolve(config).map(|_| ())
    }
}
