//! Core abstractions for the flow engine
//!
//! This crate provides the workflow and node entities, the error taxonomy
//! and the traits that the runtime and node crates plug into.

mod error;
pub mod events;
mod handler;
mod node;
mod value;
mod workflow;

pub use error::{ErrorKind, FlowError, NodeError, RepositoryError, WorkflowError};
pub use handler::{
    ActionInvoker, ExecutionId, NodeContext, NodeHandler, NodeMetadata, NodeOutput, NodeRunStatus,
};
pub use node::{
    validate_config, Node, NodeId, NodeSpec, NodeType, Position, MAX_CONFIG_SIZE, MAX_CONNECTIONS,
};
pub use value::{serialized_size, ConfigMap, Value};
pub use workflow::{
    UserId, Workflow, WorkflowId, WorkflowSpec, WorkflowStatus, MAX_DESCRIPTION_LEN,
    MAX_METADATA_SIZE, MAX_NAME_LEN, MAX_NODES,
};
pub use events::*;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
