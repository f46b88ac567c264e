use async_trait::async_trait;
use flowcore::{ActionInvoker, ConfigMap, NodeError};
use tokio_util::sync::CancellationToken;

/// Logs a message and the node inputs
pub struct LogAction;

#[async_trait]
impl ActionInvoker for LogAction {
    async fn invoke(
        &self,
        _cancel: &CancellationToken,
        config: &ConfigMap,
        input: &ConfigMap,
    ) -> Result<ConfigMap, NodeError> {
        let message = config
            .get("message")
            .or_else(|| input.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)")
            .to_string();

        match config.get("level").and_then(|v| v.as_str()) {
            Some("debug") => tracing::debug!(target: "flow::log", "{}", message),
            Some("warn") => tracing::warn!(target: "flow::log", "{}", message),
            _ => tracing::info!(target: "flow::log", "{}", message),
        }
        for (key, value) in input {
            tracing::debug!(target: "flow::log", "  {}: {:?}", key, value);
        }

        let mut outputs = input.clone();
        outputs.insert("message".to_string(), message.into());
        Ok(outputs)
    }
}
