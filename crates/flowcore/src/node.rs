use crate::value::{serialized_size, ConfigMap};
use crate::{NodeError, WorkflowId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type NodeId = Uuid;

/// Maximum combined number of input and output connections per node
pub const MAX_CONNECTIONS: usize = 100;

/// Maximum size of the serialized node configuration in bytes
pub const MAX_CONFIG_SIZE: usize = 1024 * 1024;

/// Closed set of node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Action,
    Condition,
    AiTask,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::Trigger,
        NodeType::Action,
        NodeType::Condition,
        NodeType::AiTask,
    ];

    /// Configuration key every node of this type must carry
    pub fn required_config_key(self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger_type",
            NodeType::Action => "action_type",
            NodeType::Condition => "condition",
            NodeType::AiTask => "ai_model",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger",
            NodeType::Action => "action",
            NodeType::Condition => "condition",
            NodeType::AiTask => "ai_task",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| NodeError::InvalidArgument(format!("unsupported node type: {}", s)))
    }
}

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// Check the type-specific configuration requirements and the size ceiling.
pub fn validate_config(node_type: NodeType, config: &ConfigMap) -> Result<(), NodeError> {
    let size = serialized_size(config)
        .map_err(|e| NodeError::InvalidConfig(format!("configuration is not serializable: {}", e)))?;
    if size > MAX_CONFIG_SIZE {
        return Err(NodeError::InvalidConfig(format!(
            "configuration is {} bytes, limit is {}",
            size, MAX_CONFIG_SIZE
        )));
    }

    let key = node_type.required_config_key();
    if !config.contains_key(key) {
        return Err(NodeError::InvalidConfig(format!(
            "{} node requires '{}'",
            node_type, key
        )));
    }

    Ok(())
}

fn validate_position(position: Position) -> Result<(), NodeError> {
    if position.x < 0 || position.y < 0 {
        return Err(NodeError::InvalidPosition {
            x: position.x,
            y: position.y,
        });
    }
    Ok(())
}

/// Serializable snapshot of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub workflow_id: WorkflowId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(default)]
    pub input_connections: Vec<NodeId>,
    #[serde(default)]
    pub output_connections: Vec<NodeId>,
    #[serde(default)]
    pub position: Position,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NodeSpec {
    /// Re-check every node invariant, collecting all failures.
    pub fn validate(&self) -> Result<(), NodeError> {
        let mut errors = Vec::new();

        if let Err(e) = validate_config(self.node_type, &self.config) {
            errors.push(e);
        }
        if self.input_connections.len() + self.output_connections.len() > MAX_CONNECTIONS {
            errors.push(NodeError::ConnectionLimitExceeded {
                limit: MAX_CONNECTIONS,
            });
        }
        if let Err(e) = validate_position(self.position) {
            errors.push(e);
        }

        NodeError::aggregate(errors)
    }
}

struct NodeFields {
    name: String,
    config: ConfigMap,
    input_connections: Vec<NodeId>,
    output_connections: Vec<NodeId>,
    position: Position,
    updated_at: DateTime<Utc>,
}

/// A single workflow graph vertex.
///
/// Identity, owner and type are fixed at construction. Everything else sits
/// behind a lock scoped to this node, so concurrent callers on the same node
/// never observe a half-applied mutation and never contend with other nodes.
pub struct Node {
    id: NodeId,
    workflow_id: WorkflowId,
    node_type: NodeType,
    created_at: DateTime<Utc>,
    fields: RwLock<NodeFields>,
}

impl Node {
    /// Create a node, rejecting any invalid combination of arguments.
    pub fn new(
        workflow_id: WorkflowId,
        node_type: NodeType,
        name: impl Into<String>,
        config: ConfigMap,
    ) -> Result<Self, NodeError> {
        if workflow_id.is_nil() {
            return Err(NodeError::InvalidArgument("workflow ID is required".to_string()));
        }

        let name = name.into();
        if name.trim().is_empty() {
            return Err(NodeError::InvalidArgument("node name is required".to_string()));
        }

        validate_config(node_type, &config)?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            workflow_id,
            node_type,
            created_at: now,
            fields: RwLock::new(NodeFields {
                name,
                config,
                input_connections: Vec::new(),
                output_connections: Vec::new(),
                position: Position::default(),
                updated_at: now,
            }),
        })
    }

    /// Rebuild a node from a snapshot, applying the same checks as `new`
    /// plus connection and position invariants.
    pub fn from_spec(spec: NodeSpec) -> Result<Self, NodeError> {
        if spec.id.is_nil() {
            return Err(NodeError::InvalidArgument("node ID is required".to_string()));
        }
        if spec.workflow_id.is_nil() {
            return Err(NodeError::InvalidArgument("workflow ID is required".to_string()));
        }
        if spec.name.trim().is_empty() {
            return Err(NodeError::InvalidArgument("node name is required".to_string()));
        }
        for side in [&spec.input_connections, &spec.output_connections] {
            for (i, peer) in side.iter().enumerate() {
                if peer.is_nil() {
                    return Err(NodeError::InvalidArgument("connection to nil node ID".to_string()));
                }
                if side[..i].contains(peer) {
                    return Err(NodeError::DuplicateConnection(*peer));
                }
            }
        }
        spec.validate()?;

        Ok(Self {
            id: spec.id,
            workflow_id: spec.workflow_id,
            node_type: spec.node_type,
            created_at: spec.created_at,
            fields: RwLock::new(NodeFields {
                name: spec.name,
                config: spec.config,
                input_connections: spec.input_connections,
                output_connections: spec.output_connections,
                position: spec.position,
                updated_at: spec.updated_at,
            }),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn name(&self) -> String {
        self.fields.read().name.clone()
    }

    pub fn config(&self) -> ConfigMap {
        self.fields.read().config.clone()
    }

    pub fn position(&self) -> Position {
        self.fields.read().position
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.fields.read().updated_at
    }

    pub fn input_connections(&self) -> Vec<NodeId> {
        self.fields.read().input_connections.clone()
    }

    pub fn output_connections(&self) -> Vec<NodeId> {
        self.fields.read().output_connections.clone()
    }

    pub fn connection_count(&self) -> usize {
        let fields = self.fields.read();
        fields.input_connections.len() + fields.output_connections.len()
    }

    /// Consistent snapshot of the node taken under a single read lock.
    pub fn spec(&self) -> NodeSpec {
        let fields = self.fields.read();
        NodeSpec {
            id: self.id,
            workflow_id: self.workflow_id,
            node_type: self.node_type,
            name: fields.name.clone(),
            config: fields.config.clone(),
            input_connections: fields.input_connections.clone(),
            output_connections: fields.output_connections.clone(),
            position: fields.position,
            created_at: self.created_at,
            updated_at: fields.updated_at,
        }
    }

    pub fn add_input_connection(&self, source_id: NodeId) -> Result<(), NodeError> {
        self.add_connection(source_id, Side::Input)
    }

    pub fn add_output_connection(&self, target_id: NodeId) -> Result<(), NodeError> {
        self.add_connection(target_id, Side::Output)
    }

    fn add_connection(&self, peer: NodeId, side: Side) -> Result<(), NodeError> {
        if peer.is_nil() {
            return Err(NodeError::InvalidArgument(format!(
                "invalid {} node ID",
                side.peer_label()
            )));
        }

        let mut fields = self.fields.write();
        if fields.input_connections.len() + fields.output_connections.len() >= MAX_CONNECTIONS {
            return Err(NodeError::ConnectionLimitExceeded {
                limit: MAX_CONNECTIONS,
            });
        }

        let connections = match side {
            Side::Input => &mut fields.input_connections,
            Side::Output => &mut fields.output_connections,
        };
        if connections.contains(&peer) {
            return Err(NodeError::DuplicateConnection(peer));
        }
        connections.push(peer);
        fields.updated_at = Utc::now();
        Ok(())
    }

    /// Remove `peer` from both connection lists. Returns whether anything changed.
    pub fn remove_connection(&self, peer: NodeId) -> bool {
        let mut fields = self.fields.write();
        let before = fields.input_connections.len() + fields.output_connections.len();
        fields.input_connections.retain(|id| *id != peer);
        fields.output_connections.retain(|id| *id != peer);
        let changed = before != fields.input_connections.len() + fields.output_connections.len();
        if changed {
            fields.updated_at = Utc::now();
        }
        changed
    }

    pub(crate) fn remove_output_connection(&self, peer: NodeId) {
        let mut fields = self.fields.write();
        fields.output_connections.retain(|id| *id != peer);
    }

    /// Replace the configuration. On failure the stored configuration is left as is.
    pub fn update_config(&self, config: ConfigMap) -> Result<(), NodeError> {
        validate_config(self.node_type, &config)?;

        let mut fields = self.fields.write();
        fields.config = config;
        fields.updated_at = Utc::now();
        Ok(())
    }

    pub fn update_position(&self, x: i64, y: i64) -> Result<(), NodeError> {
        let position = Position { x, y };
        validate_position(position)?;

        let mut fields = self.fields.write();
        fields.position = position;
        fields.updated_at = Utc::now();
        Ok(())
    }

    pub fn rename(&self, name: impl Into<String>) -> Result<(), NodeError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(NodeError::InvalidArgument("node name is required".to_string()));
        }

        let mut fields = self.fields.write();
        fields.name = name;
        fields.updated_at = Utc::now();
        Ok(())
    }

    /// Re-check every invariant and report all failures at once.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.spec().validate()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("workflow_id", &self.workflow_id)
            .field("node_type", &self.node_type)
            .field("name", &self.name())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Input,
    Output,
}

impl Side {
    fn peer_label(self) -> &'static str {
        match self {
            Side::Input => "source",
            Side::Output => "target",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, Value};
    use std::sync::Arc;

    fn config(key: &str) -> ConfigMap {
        let mut config = ConfigMap::new();
        config.insert(key.to_string(), Value::from("x"));
        config
    }

    fn action_node() -> Node {
        Node::new(Uuid::new_v4(), NodeType::Action, "send", config("action_type")).unwrap()
    }

    #[test]
    fn new_requires_type_specific_key() {
        for node_type in NodeType::ALL {
            let wf = Uuid::new_v4();
            assert!(Node::new(wf, node_type, "n", config(node_type.required_config_key())).is_ok());

            let err = Node::new(wf, node_type, "n", config("unrelated")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn new_rejects_missing_identity() {
        let err = Node::new(Uuid::nil(), NodeType::Action, "n", config("action_type")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = Node::new(Uuid::new_v4(), NodeType::Action, "  ", config("action_type")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn unknown_type_string_is_rejected() {
        assert_eq!("ai_task".parse::<NodeType>().unwrap(), NodeType::AiTask);
        let err = "webhook".parse::<NodeType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn oversized_config_is_rejected() {
        let mut big = config("action_type");
        big.insert("blob".to_string(), Value::from("a".repeat(MAX_CONFIG_SIZE)));

        let err = Node::new(Uuid::new_v4(), NodeType::Action, "n", big).unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }

    #[test]
    fn duplicate_and_nil_connections_are_rejected() {
        let node = action_node();
        let peer = Uuid::new_v4();

        node.add_input_connection(peer).unwrap();
        assert_eq!(
            node.add_input_connection(peer).unwrap_err(),
            NodeError::DuplicateConnection(peer)
        );
        // the same peer on the other side is a different edge
        node.add_output_connection(peer).unwrap();

        let err = node.add_output_connection(Uuid::nil()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn combined_connection_limit() {
        let node = action_node();
        for i in 0..MAX_CONNECTIONS {
            if i % 2 == 0 {
                node.add_input_connection(Uuid::new_v4()).unwrap();
            } else {
                node.add_output_connection(Uuid::new_v4()).unwrap();
            }
        }

        let err = node.add_output_connection(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionLimitExceeded);
        assert_eq!(node.connection_count(), MAX_CONNECTIONS);
        assert!(node.validate().is_ok());
    }

    #[test]
    fn update_config_is_atomic() {
        let node = action_node();
        let before = node.config();

        assert!(node.update_config(config("condition")).is_err());
        assert_eq!(node.config(), before);

        let mut next = config("action_type");
        next.insert("url".to_string(), Value::from("https://example.com"));
        node.update_config(next.clone()).unwrap();
        assert_eq!(node.config(), next);
    }

    #[test]
    fn update_position_rejects_negative() {
        let node = action_node();
        node.update_position(10, 20).unwrap();
        assert_eq!(node.position(), Position { x: 10, y: 20 });

        assert!(matches!(
            node.update_position(-1, 5),
            Err(NodeError::InvalidPosition { x: -1, y: 5 })
        ));
        assert_eq!(node.position(), Position { x: 10, y: 20 });
    }

    #[test]
    fn validate_aggregates_failures() {
        let mut spec = action_node().spec();
        spec.config.clear();
        spec.position = Position { x: -3, y: 0 };

        let err = spec.validate().unwrap_err();
        assert_eq!(err.kinds(), vec![ErrorKind::InvalidArgument, ErrorKind::InvalidArgument]);
        assert!(Node::from_spec(spec).is_err());
    }

    #[test]
    fn spec_round_trip() {
        let node = action_node();
        node.add_input_connection(Uuid::new_v4()).unwrap();
        node.update_position(4, 2).unwrap();

        let json = serde_json::to_string(&node.spec()).unwrap();
        let restored = Node::from_spec(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.spec(), node.spec());
    }

    #[test]
    fn concurrent_connections_are_not_lost() {
        let node = Arc::new(action_node());
        let peers: Vec<NodeId> = (0..64).map(|_| Uuid::new_v4()).collect();

        let handles: Vec<_> = peers
            .iter()
            .map(|peer| {
                let node = Arc::clone(&node);
                let peer = *peer;
                std::thread::spawn(move || node.add_input_connection(peer))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let mut recorded = node.input_connections();
        recorded.sort();
        let mut expected = peers;
        expected.sort();
        assert_eq!(recorded, expected);
    }
}
