use flowcore::{Node, NodeError, NodeHandler, NodeType};
use std::collections::HashMap;
use std::sync::Arc;

/// Summary of a registered node type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    pub node_type: NodeType,
    pub description: String,
    pub required_config: &'static str,
}

/// Registry of node handlers, one per node type
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler for the same type
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let node_type = handler.node_type();
        tracing::info!("Registering node handler: {}", node_type);
        self.handlers.insert(node_type, handler);
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type).cloned()
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.handlers.contains_key(&node_type)
    }

    /// Run the handler-specific configuration check for `node`.
    pub fn validate_node_config(&self, node: &Node) -> Result<(), NodeError> {
        match self.handlers.get(&node.node_type()) {
            Some(handler) => handler.validate_config(&node.config()),
            None => Err(NodeError::InvalidArgument(format!(
                "no handler registered for node type {}",
                node.node_type()
            ))),
        }
    }

    /// Registered node types in declaration order
    pub fn list(&self) -> Vec<HandlerInfo> {
        NodeType::ALL
            .into_iter()
            .filter_map(|node_type| {
                self.handlers.get(&node_type).map(|handler| HandlerInfo {
                    node_type,
                    description: handler.description().to_string(),
                    required_config: node_type.required_config_key(),
                })
            })
            .collect()
    }
}
