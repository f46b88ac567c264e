use crate::handler::{ExecutionId, NodeRunStatus};
use crate::{NodeId, NodeType, WorkflowId, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

use super::hooks::ExecutionHooks;

/// Events emitted during workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        timestamp: DateTime<Utc>,
    },
    WorkflowFinished {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        status: WorkflowStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: NodeType,
        timestamp: DateTime<Utc>,
    },
    NodeFinished {
        execution_id: ExecutionId,
        node_id: NodeId,
        status: NodeRunStatus,
        duration_ms: u64,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::WorkflowStarted { execution_id, .. }
            | ExecutionEvent::WorkflowFinished { execution_id, .. }
            | ExecutionEvent::NodeStarted { execution_id, .. }
            | ExecutionEvent::NodeFinished { execution_id, .. } => *execution_id,
        }
    }
}

/// Broadcast event bus. Sending never blocks and is a no-op without subscribers.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ExecutionHooks for EventBus {
    fn workflow_started(&self, execution_id: ExecutionId, workflow_id: WorkflowId) {
        self.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow_id,
            timestamp: Utc::now(),
        });
    }

    fn workflow_finished(
        &self,
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        status: WorkflowStatus,
        duration: Duration,
    ) {
        self.emit(ExecutionEvent::WorkflowFinished {
            execution_id,
            workflow_id,
            status,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        });
    }

    fn node_started(&self, execution_id: ExecutionId, node_id: NodeId, node_type: NodeType) {
        self.emit(ExecutionEvent::NodeStarted {
            execution_id,
            node_id,
            node_type,
            timestamp: Utc::now(),
        });
    }

    fn node_finished(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
        status: NodeRunStatus,
        duration: Duration,
        error: Option<&str>,
    ) {
        self.emit(ExecutionEvent::NodeFinished {
            execution_id,
            node_id,
            status,
            duration_ms: duration.as_millis() as u64,
            error: error.map(str::to_string),
            timestamp: Utc::now(),
        });
    }
}
