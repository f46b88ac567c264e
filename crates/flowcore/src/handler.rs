use crate::node::{Node, NodeId, NodeType};
use crate::value::ConfigMap;
use crate::{NodeError, Value, WorkflowId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Executable behaviour for one node type.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The node type this handler runs
    fn node_type(&self) -> NodeType;

    /// One-line summary shown in listings
    fn description(&self) -> &str {
        ""
    }

    /// Execute the node with given context
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;

    /// Optional: stricter configuration checks than the required-key rule
    fn validate_config(&self, _config: &ConfigMap) -> Result<(), NodeError> {
        Ok(())
    }
}

/// External action executor used by action and AI task handlers.
///
/// Treated as a black box; the executor's per-node timeout bounds every call.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        config: &ConfigMap,
        input: &ConfigMap,
    ) -> Result<ConfigMap, NodeError>;
}

/// Execution context passed to each node
#[derive(Clone, Debug)]
pub struct NodeContext {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    pub node_type: NodeType,

    /// Merged outputs of upstream nodes, or the run inputs for root nodes
    pub inputs: ConfigMap,

    /// Snapshot of the node configuration
    pub config: ConfigMap,

    /// Cancelled when the run is stopped or times out
    pub cancellation: CancellationToken,
}

impl NodeContext {
    pub fn new(
        execution_id: ExecutionId,
        node: &Node,
        inputs: ConfigMap,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            workflow_id: node.workflow_id(),
            node_id: node.id(),
            node_type: node.node_type(),
            inputs,
            config: node.config(),
            cancellation,
        }
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, NodeError> {
        self.config
            .get(name)
            .ok_or_else(|| NodeError::InvalidConfig(format!("missing config: {}", name)))
    }

    pub fn require_config_str(&self, name: &str) -> Result<&str, NodeError> {
        self.require_config(name)?
            .as_str()
            .ok_or_else(|| NodeError::InvalidConfig(format!("config '{}' must be a string", name)))
    }

    /// Get config with default
    pub fn get_config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }
}

/// Output from node execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Values handed to downstream nodes
    pub outputs: ConfigMap,

    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_outputs(outputs: ConfigMap) -> Self {
        Self {
            outputs,
            metadata: NodeMetadata::default(),
        }
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(port.into(), value.into());
        self
    }
}

/// Metadata about node execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub execution_time_ms: u64,
    #[serde(default)]
    pub custom: ConfigMap,
}

/// Per-node state within one execution instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for NodeRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRunStatus::Pending => "pending",
            NodeRunStatus::Running => "running",
            NodeRunStatus::Completed => "completed",
            NodeRunStatus::Failed => "failed",
            NodeRunStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}
