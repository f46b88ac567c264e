use crate::breaker::BreakerConfig;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// What happens to the rest of a run after a node fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop starting new nodes; everything not yet started is skipped
    #[default]
    FailFast,
    /// Skip only the failed node's descendants
    ContinueOnError,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_fast" => Ok(FailurePolicy::FailFast),
            "continue_on_error" => Ok(FailurePolicy::ContinueOnError),
            other => Err(ConfigError::Invalid(format!("unknown failure policy: {}", other))),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid engine configuration: {0}")]
    Invalid(String),
}

/// Configuration for the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nodes of one run executing at the same time
    pub max_parallel_nodes: usize,
    pub execution_timeout_ms: u64,
    pub node_timeout_ms: u64,
    /// How long a cancelled node may keep running before it is abandoned
    pub cancel_grace_ms: u64,
    pub failure_policy: FailurePolicy,
    /// Retry whole execution attempts that fail with a node error
    pub enable_execution_retries: bool,
    pub max_execution_retries: u32,
    /// Backoff used for persistence and execution retries
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            execution_timeout_ms: 30 * 60 * 1000,
            node_timeout_ms: 5 * 60 * 1000,
            cancel_grace_ms: 5_000,
            failure_policy: FailurePolicy::FailFast,
            enable_execution_retries: true,
            max_execution_retries: 3,
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `ENGINE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Values that do not parse
    /// or fall outside their range keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        overlay(&lookup, "ENGINE_MAX_PARALLEL_NODES", &mut config.max_parallel_nodes, |v| *v > 0);
        overlay(&lookup, "ENGINE_EXECUTION_TIMEOUT_MS", &mut config.execution_timeout_ms, |v| *v > 0);
        overlay(&lookup, "ENGINE_NODE_TIMEOUT_MS", &mut config.node_timeout_ms, |v| *v > 0);
        overlay(&lookup, "ENGINE_CANCEL_GRACE_MS", &mut config.cancel_grace_ms, |_| true);
        overlay(&lookup, "ENGINE_FAILURE_POLICY", &mut config.failure_policy, |_| true);
        overlay(&lookup, "ENGINE_ENABLE_RETRIES", &mut config.enable_execution_retries, |_| true);
        overlay(&lookup, "ENGINE_MAX_RETRIES", &mut config.max_execution_retries, |_| true);
        overlay(&lookup, "ENGINE_RETRY_BACKOFF_MS", &mut config.retry.delay_ms, |_| true);
        overlay(&lookup, "ENGINE_ENABLE_CIRCUIT_BREAKER", &mut config.breaker.enabled, |_| true);
        overlay(&lookup, "ENGINE_ERROR_THRESHOLD", &mut config.breaker.failure_ratio, |v| {
            *v > 0.0 && *v < 1.0
        });
        overlay(&lookup, "ENGINE_BREAK_DURATION_MS", &mut config.breaker.open_timeout_ms, |v| *v > 0);

        config
    }

    /// Cross-field checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_nodes == 0 {
            return Err(ConfigError::Invalid("max_parallel_nodes must be positive".to_string()));
        }
        if self.execution_timeout_ms == 0 || self.node_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if self.node_timeout_ms >= self.execution_timeout_ms {
            return Err(ConfigError::Invalid(
                "node timeout must be less than execution timeout".to_string(),
            ));
        }
        if self.enable_execution_retries && self.max_execution_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_execution_retries must be positive when retries are enabled".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be positive".to_string()));
        }
        if self.breaker.enabled
            && !(self.breaker.failure_ratio > 0.0 && self.breaker.failure_ratio < 1.0)
        {
            return Err(ConfigError::Invalid(
                "circuit breaker error threshold must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

fn overlay<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
    accept: impl Fn(&T) -> bool,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => *target = value,
        _ => warn!(key, value = %raw, "ignoring invalid engine setting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.execution_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.node_timeout(), Duration::from_secs(5 * 60));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
    }

    #[test]
    fn env_overrides_apply() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ENGINE_MAX_PARALLEL_NODES", "4"),
            ("ENGINE_NODE_TIMEOUT_MS", "1500"),
            ("ENGINE_FAILURE_POLICY", "continue_on_error"),
            ("ENGINE_ENABLE_CIRCUIT_BREAKER", "false"),
            ("ENGINE_ERROR_THRESHOLD", "0.5"),
        ]));

        assert_eq!(config.max_parallel_nodes, 4);
        assert_eq!(config.node_timeout_ms, 1500);
        assert_eq!(config.failure_policy, FailurePolicy::ContinueOnError);
        assert!(!config.breaker.enabled);
        assert_eq!(config.breaker.failure_ratio, 0.5);
    }

    #[test]
    fn invalid_env_values_keep_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ENGINE_MAX_PARALLEL_NODES", "0"),
            ("ENGINE_EXECUTION_TIMEOUT_MS", "soon"),
            ("ENGINE_ERROR_THRESHOLD", "1.5"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn node_timeout_must_be_below_execution_timeout() {
        let config = EngineConfig {
            node_timeout_ms: 10_000,
            execution_timeout_ms: 10_000,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_parallel_nodes": 2, "retry": {"backoff": "exponential"}}"#)
                .unwrap();
        assert_eq!(config.max_parallel_nodes, 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.node_timeout_ms, EngineConfig::default().node_timeout_ms);
    }
}
