use crate::handler::{ExecutionId, NodeRunStatus};
use crate::{NodeId, NodeType, WorkflowId, WorkflowStatus};
use std::time::Duration;

/// Tracer/metrics sink called by the executor around every run and node.
///
/// Every method defaults to a no-op. Implementations must not block.
pub trait ExecutionHooks: Send + Sync {
    fn workflow_started(&self, _execution_id: ExecutionId, _workflow_id: WorkflowId) {}

    fn workflow_finished(
        &self,
        _execution_id: ExecutionId,
        _workflow_id: WorkflowId,
        _status: WorkflowStatus,
        _duration: Duration,
    ) {
    }

    fn node_started(&self, _execution_id: ExecutionId, _node_id: NodeId, _node_type: NodeType) {}

    fn node_finished(
        &self,
        _execution_id: ExecutionId,
        _node_id: NodeId,
        _status: NodeRunStatus,
        _duration: Duration,
        _error: Option<&str>,
    ) {
    }
}

/// Hooks that record nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ExecutionHooks for NoopHooks {}
