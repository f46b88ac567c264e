// Shared fixtures for the runtime integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use flowcore::{
    ConfigMap, Node, NodeContext, NodeError, NodeHandler, NodeId, NodeOutput, NodeType, Value,
    Workflow, WorkflowStatus,
};
use flowruntime::{EngineConfig, Executor, HandlerRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("flowruntime=debug")
        .with_test_writer()
        .try_init();
}

/// Passes run inputs through and flags that it fired.
pub struct PassTrigger;

#[async_trait]
impl NodeHandler for PassTrigger {
    fn node_type(&self) -> NodeType {
        NodeType::Trigger
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::from_outputs(ctx.inputs).with_output("triggered", true))
    }
}

/// Action whose behaviour is chosen by its `action_type`:
/// `ok`, `fail`, `flaky` (fails while `failures_left` > 0) or `sleep` (`sleep_ms`).
#[derive(Default)]
pub struct ScriptedAction {
    pub calls: AtomicUsize,
    pub failures_left: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ScriptedAction {
    pub fn flaky(failures: usize) -> Self {
        let action = Self::default();
        action.failures_left.store(failures, Ordering::SeqCst);
        action
    }
}

#[async_trait]
impl NodeHandler for ScriptedAction {
    fn node_type(&self) -> NodeType {
        NodeType::Action
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = match ctx.require_config_str("action_type")? {
            "fail" => Err(NodeError::ExecutionFailed("scripted failure".to_string())),
            "flaky" => {
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    Err(NodeError::ExecutionFailed("transient failure".to_string()))
                } else {
                    Ok(NodeOutput::new().with_output("ok", true))
                }
            }
            "sleep" => {
                let millis = ctx
                    .config
                    .get("sleep_ms")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0) as u64;
                tokio::select! {
                    _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(millis)) => {
                        Ok(NodeOutput::new().with_output("slept_ms", millis as i64))
                    }
                }
            }
            _ => Ok(NodeOutput::new().with_output("ok", true)),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn registry(action: Arc<ScriptedAction>) -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(PassTrigger));
    registry.register(action);
    Arc::new(registry)
}

pub fn executor(action: Arc<ScriptedAction>, config: EngineConfig) -> Arc<Executor> {
    Arc::new(Executor::new(registry(action), config))
}

pub fn draft(user_id: Uuid) -> Workflow {
    Workflow::new(user_id, "integration", "built by the test suite").unwrap()
}

pub fn active(workflow: Workflow) -> Arc<Workflow> {
    workflow.update_status(WorkflowStatus::Active).unwrap();
    Arc::new(workflow)
}

pub fn add_trigger(workflow: &Workflow) -> NodeId {
    let mut config = ConfigMap::new();
    config.insert("trigger_type".to_string(), Value::from("manual"));
    let node = Node::new(workflow.id(), NodeType::Trigger, "start", config).unwrap();
    workflow.add_node(node).unwrap().id()
}

pub fn add_action(workflow: &Workflow, name: &str, action_type: &str) -> NodeId {
    add_action_with(workflow, name, action_type, ConfigMap::new())
}

pub fn add_sleeper(workflow: &Workflow, name: &str, millis: i64) -> NodeId {
    let mut extra = ConfigMap::new();
    extra.insert("sleep_ms".to_string(), Value::from(millis));
    add_action_with(workflow, name, "sleep", extra)
}

fn add_action_with(
    workflow: &Workflow,
    name: &str,
    action_type: &str,
    mut config: ConfigMap,
) -> NodeId {
    config.insert("action_type".to_string(), Value::from(action_type));
    let node = Node::new(workflow.id(), NodeType::Action, name, config).unwrap();
    workflow.add_node(node).unwrap().id()
}
