use crate::node::{Node, NodeId, NodeSpec, NodeType};
use crate::value::{serialized_size, ConfigMap};
use crate::WorkflowError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type UserId = Uuid;

/// Maximum number of nodes in one workflow
pub const MAX_NODES: usize = 100;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Maximum size of the serialized workflow metadata in bytes
pub const MAX_METADATA_SIZE: usize = 1024 * 1024;

/// Workflow lifecycle status.
///
/// ```text
/// draft -> active -> running -> {completed, failed, canceled}
/// draft | active | running -> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 6] = [
        WorkflowStatus::Draft,
        WorkflowStatus::Active,
        WorkflowStatus::Running,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
        WorkflowStatus::Canceled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Canceled
        )
    }

    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        match (self, next) {
            (Draft, Active) | (Active, Running) => true,
            (Running, Completed) | (Running, Canceled) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable snapshot of a workflow and its nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub id: WorkflowId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: WorkflowStatus,
    pub version: u64,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub metadata: ConfigMap,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct WorkflowFields {
    name: String,
    description: String,
    status: WorkflowStatus,
    version: u64,
    nodes: Vec<Arc<Node>>,
    metadata: ConfigMap,
    last_executed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

/// A named, versioned graph of nodes owned by a user.
///
/// Status, version and node membership sit behind a lock scoped to this
/// workflow; each node carries its own lock for its fields. The workflow lock
/// is always taken before any node lock.
pub struct Workflow {
    id: WorkflowId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    fields: RwLock<WorkflowFields>,
}

fn check_details(name: &str, description: &str) -> Result<(), WorkflowError> {
    if name.trim().is_empty() {
        return Err(WorkflowError::InvalidArgument("workflow name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(WorkflowError::InvalidArgument(format!(
            "workflow name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(WorkflowError::InvalidArgument(format!(
            "workflow description exceeds {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

fn check_metadata(metadata: &ConfigMap) -> Result<(), WorkflowError> {
    let size = serialized_size(metadata).map_err(|e| {
        WorkflowError::InvalidArgument(format!("metadata is not serializable: {}", e))
    })?;
    if size > MAX_METADATA_SIZE {
        return Err(WorkflowError::MetadataTooLarge {
            limit: MAX_METADATA_SIZE,
        });
    }
    Ok(())
}

impl Workflow {
    /// Create an empty draft workflow.
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, WorkflowError> {
        if user_id.is_nil() {
            return Err(WorkflowError::InvalidArgument("user ID is required".to_string()));
        }
        let name = name.into();
        let description = description.into();
        check_details(&name, &description)?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            created_at: now,
            fields: RwLock::new(WorkflowFields {
                name,
                description,
                status: WorkflowStatus::Draft,
                version: 1,
                nodes: Vec::with_capacity(10),
                metadata: ConfigMap::new(),
                last_executed_at: None,
                updated_at: now,
            }),
        })
    }

    /// Rebuild a workflow from a snapshot, re-running every entity check.
    pub fn from_spec(spec: WorkflowSpec) -> Result<Self, WorkflowError> {
        if spec.id.is_nil() || spec.user_id.is_nil() {
            return Err(WorkflowError::InvalidArgument(
                "workflow and user IDs are required".to_string(),
            ));
        }
        check_details(&spec.name, &spec.description)?;
        check_metadata(&spec.metadata)?;
        if spec.nodes.len() > MAX_NODES {
            return Err(WorkflowError::NodeLimitExceeded { limit: MAX_NODES });
        }

        let mut nodes: Vec<Arc<Node>> = Vec::with_capacity(spec.nodes.len());
        for node_spec in spec.nodes {
            let node_id = node_spec.id;
            if node_spec.workflow_id != spec.id {
                return Err(WorkflowError::InvalidArgument(format!(
                    "node {} belongs to workflow {}",
                    node_id, node_spec.workflow_id
                )));
            }
            if nodes.iter().any(|n| n.id() == node_id) {
                return Err(WorkflowError::InvalidArgument(format!(
                    "duplicate node ID {}",
                    node_id
                )));
            }
            let node = Node::from_spec(node_spec)
                .map_err(|source| WorkflowError::InvalidNode { node_id, source })?;
            nodes.push(Arc::new(node));
        }

        Ok(Self {
            id: spec.id,
            user_id: spec.user_id,
            created_at: spec.created_at,
            fields: RwLock::new(WorkflowFields {
                name: spec.name,
                description: spec.description,
                status: spec.status,
                version: spec.version,
                nodes,
                metadata: spec.metadata,
                last_executed_at: spec.last_executed_at,
                updated_at: spec.updated_at,
            }),
        })
    }

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn name(&self) -> String {
        self.fields.read().name.clone()
    }

    pub fn description(&self) -> String {
        self.fields.read().description.clone()
    }

    pub fn status(&self) -> WorkflowStatus {
        self.fields.read().status
    }

    pub fn version(&self) -> u64 {
        self.fields.read().version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.fields.read().updated_at
    }

    pub fn last_executed_at(&self) -> Option<DateTime<Utc>> {
        self.fields.read().last_executed_at
    }

    pub fn metadata(&self) -> ConfigMap {
        self.fields.read().metadata.clone()
    }

    /// Handles to the current nodes, in insertion order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.fields.read().nodes.clone()
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.fields.read().nodes.iter().find(|n| n.id() == id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.fields.read().nodes.len()
    }

    pub fn has_trigger(&self) -> bool {
        self.fields
            .read()
            .nodes
            .iter()
            .any(|n| n.node_type() == NodeType::Trigger)
    }

    /// Consistent snapshot of the workflow and all of its nodes.
    pub fn spec(&self) -> WorkflowSpec {
        let fields = self.fields.read();
        WorkflowSpec {
            id: self.id,
            user_id: self.user_id,
            name: fields.name.clone(),
            description: fields.description.clone(),
            status: fields.status,
            version: fields.version,
            nodes: fields.nodes.iter().map(|n| n.spec()).collect(),
            metadata: fields.metadata.clone(),
            last_executed_at: fields.last_executed_at,
            created_at: self.created_at,
            updated_at: fields.updated_at,
        }
    }

    /// Add a node owned by this workflow.
    pub fn add_node(&self, node: Node) -> Result<Arc<Node>, WorkflowError> {
        if node.workflow_id() != self.id {
            return Err(WorkflowError::InvalidArgument(format!(
                "node {} belongs to workflow {}, not {}",
                node.id(),
                node.workflow_id(),
                self.id
            )));
        }
        node.validate().map_err(|source| WorkflowError::InvalidNode {
            node_id: node.id(),
            source,
        })?;

        let mut fields = self.fields.write();
        if fields.nodes.len() >= MAX_NODES {
            return Err(WorkflowError::NodeLimitExceeded { limit: MAX_NODES });
        }
        if fields.nodes.iter().any(|n| n.id() == node.id()) {
            return Err(WorkflowError::InvalidArgument(format!(
                "node {} already exists",
                node.id()
            )));
        }

        let node = Arc::new(node);
        fields.nodes.push(Arc::clone(&node));
        fields.version += 1;
        fields.updated_at = Utc::now();
        Ok(node)
    }

    /// Remove a node and every edge that references it.
    pub fn remove_node(&self, id: NodeId) -> Result<Arc<Node>, WorkflowError> {
        let mut fields = self.fields.write();
        let index = fields
            .nodes
            .iter()
            .position(|n| n.id() == id)
            .ok_or(WorkflowError::NodeNotFound(id))?;

        let removed = fields.nodes.remove(index);
        for node in &fields.nodes {
            node.remove_connection(id);
        }
        fields.version += 1;
        fields.updated_at = Utc::now();
        Ok(removed)
    }

    /// Add a directed edge `from -> to`, updating both endpoints.
    pub fn connect(&self, from: NodeId, to: NodeId) -> Result<(), WorkflowError> {
        let mut fields = self.fields.write();
        let find = |id: NodeId| {
            fields
                .nodes
                .iter()
                .find(|n| n.id() == id)
                .cloned()
                .ok_or(WorkflowError::NodeNotFound(id))
        };
        let source = find(from)?;
        let target = find(to)?;

        source
            .add_output_connection(to)
            .map_err(|e| WorkflowError::InvalidNode {
                node_id: from,
                source: e,
            })?;
        if let Err(e) = target.add_input_connection(from) {
            source.remove_output_connection(to);
            return Err(WorkflowError::InvalidNode {
                node_id: to,
                source: e,
            });
        }

        fields.version += 1;
        fields.updated_at = Utc::now();
        Ok(())
    }

    /// Move to `next` if the lifecycle permits it.
    pub fn update_status(&self, next: WorkflowStatus) -> Result<(), WorkflowError> {
        let mut fields = self.fields.write();
        if !fields.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition {
                from: fields.status,
                to: next,
            });
        }

        debug!(workflow_id = %self.id, from = %fields.status, to = %next, "workflow status changed");
        fields.status = next;
        fields.version += 1;
        fields.updated_at = Utc::now();
        Ok(())
    }

    pub fn update_metadata(&self, metadata: ConfigMap) -> Result<(), WorkflowError> {
        check_metadata(&metadata)?;

        let mut fields = self.fields.write();
        fields.metadata = metadata;
        fields.version += 1;
        fields.updated_at = Utc::now();
        Ok(())
    }

    pub fn update_details(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        let name = name.into();
        let description = description.into();
        check_details(&name, &description)?;

        let mut fields = self.fields.write();
        fields.name = name;
        fields.description = description;
        fields.version += 1;
        fields.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_executed(&self) {
        let mut fields = self.fields.write();
        let now = Utc::now();
        fields.last_executed_at = Some(now);
        fields.updated_at = now;
    }

    /// Reset to a freshly persisted state: `draft`, version 1.
    pub fn reset_revision(&self) {
        let mut fields = self.fields.write();
        fields.status = WorkflowStatus::Draft;
        fields.version = 1;
        fields.updated_at = Utc::now();
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.read();
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &fields.name)
            .field("status", &fields.status)
            .field("version", &fields.version)
            .field("nodes", &fields.nodes.len())
            .finish()
    }
}
