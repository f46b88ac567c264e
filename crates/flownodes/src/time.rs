use async_trait::async_trait;
use flowcore::{ActionInvoker, ConfigMap, NodeError, Value};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

const DEFAULT_DELAY_MS: u64 = 1000;

/// Waits for `delay_ms` (default one second), then passes its input through.
pub struct DelayAction;

#[async_trait]
impl ActionInvoker for DelayAction {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        config: &ConfigMap,
        input: &ConfigMap,
    ) -> Result<ConfigMap, NodeError> {
        let delay_ms = match config.get("delay_ms") {
            None => DEFAULT_DELAY_MS,
            Some(Value::Integer(n)) if *n >= 0 => *n as u64,
            Some(Value::Number(n)) if *n >= 0.0 => *n as u64,
            Some(other) => {
                return Err(NodeError::InvalidConfig(format!(
                    "delay_ms must be a non-negative number, got {:?}",
                    other
                )))
            }
        };

        tracing::debug!(delay_ms, "Delaying");
        tokio::select! {
            _ = cancel.cancelled() => return Err(NodeError::Cancelled),
            _ = sleep(Duration::from_millis(delay_ms)) => {}
        }

        let mut outputs = input.clone();
        outputs.insert("delayed_ms".to_string(), Value::from(delay_ms as i64));
        Ok(outputs)
    }
}
