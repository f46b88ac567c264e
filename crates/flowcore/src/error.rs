use crate::{NodeId, WorkflowId, WorkflowStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-facing error category, preserved through every wrapping layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    InvalidTransition,
    ConnectionLimitExceeded,
    NodeLimitExceeded,
    DuplicateConnection,
    CircularDependency,
    NoTriggerNode,
    NodeExecutionFailed,
    WorkflowNotFound,
    Unauthorized,
    CircuitOpen,
    DeadlineExceeded,
    Canceled,
    Persistence,
    Internal,
}

impl ErrorKind {
    /// Whether an operation failing with this kind may succeed if repeated.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::NodeExecutionFailed | ErrorKind::Persistence)
    }

    /// Whether the failure was caused by the caller rather than a dependency.
    pub fn is_caller_error(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidArgument
                | ErrorKind::InvalidTransition
                | ErrorKind::ConnectionLimitExceeded
                | ErrorKind::NodeLimitExceeded
                | ErrorKind::DuplicateConnection
                | ErrorKind::CircularDependency
                | ErrorKind::NoTriggerNode
                | ErrorKind::WorkflowNotFound
                | ErrorKind::Unauthorized
        )
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Node {node_id} failed: {source}")]
    NodeFailed {
        node_id: NodeId,
        #[source]
        source: NodeError,
    },

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Deadline exceeded after {millis}ms")]
    DeadlineExceeded { millis: u64 },

    #[error("Execution canceled")]
    Canceled,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FlowError>,
    },
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::Node(e) => e.kind(),
            FlowError::Workflow(e) => e.kind(),
            FlowError::Repository(e) => e.kind(),
            FlowError::NodeFailed { source, .. } => match source {
                NodeError::Cancelled => ErrorKind::Canceled,
                _ => ErrorKind::NodeExecutionFailed,
            },
            FlowError::CircuitOpen => ErrorKind::CircuitOpen,
            FlowError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            FlowError::Canceled => ErrorKind::Canceled,
            FlowError::Unauthorized(_) => ErrorKind::Unauthorized,
            FlowError::Execution(_) => ErrorKind::Internal,
            FlowError::Serialization(_) => ErrorKind::InvalidArgument,
            FlowError::Context { source, .. } => source.kind(),
        }
    }

    /// Wrap with a human-readable context, keeping the kind of `self`.
    pub fn context(self, context: impl Into<String>) -> Self {
        FlowError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error below any `Context` layers.
    pub fn root(&self) -> &FlowError {
        match self {
            FlowError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_transient()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid position ({x}, {y}): coordinates must be non-negative")]
    InvalidPosition { x: i64, y: i64 },

    #[error("Connection limit of {limit} exceeded")]
    ConnectionLimitExceeded { limit: usize },

    #[error("Duplicate connection to {0}")]
    DuplicateConnection(NodeId),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Skipped: upstream node {0} did not complete")]
    Skipped(NodeId),

    #[error("{}", join_messages(.0))]
    Invalid(Vec<NodeError>),
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::InvalidArgument(_)
            | NodeError::InvalidConfig(_)
            | NodeError::InvalidPosition { .. } => ErrorKind::InvalidArgument,
            NodeError::ConnectionLimitExceeded { .. } => ErrorKind::ConnectionLimitExceeded,
            NodeError::DuplicateConnection(_) => ErrorKind::DuplicateConnection,
            NodeError::MissingInput(_) | NodeError::ExecutionFailed(_) => {
                ErrorKind::NodeExecutionFailed
            }
            NodeError::Timeout { .. } => ErrorKind::DeadlineExceeded,
            NodeError::Cancelled => ErrorKind::Canceled,
            NodeError::Skipped(_) => ErrorKind::NodeExecutionFailed,
            NodeError::Invalid(errors) => errors
                .first()
                .map(NodeError::kind)
                .unwrap_or(ErrorKind::InvalidArgument),
        }
    }

    /// Every kind contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self {
            NodeError::Invalid(errors) => errors.iter().flat_map(NodeError::kinds).collect(),
            other => vec![other.kind()],
        }
    }

    /// Collapse a list of failures: none is `Ok`, one is returned as is.
    pub fn aggregate(mut errors: Vec<NodeError>) -> Result<(), NodeError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(NodeError::Invalid(errors)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Node limit of {limit} exceeded")]
    NodeLimitExceeded { limit: usize },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("Circular dependency detected involving node {0}")]
    CircularDependency(NodeId),

    #[error("Workflow must contain at least one trigger node")]
    NoTriggerNode,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Metadata exceeds size limit of {limit} bytes")]
    MetadataTooLarge { limit: usize },

    #[error("Node {node_id} is invalid: {source}")]
    InvalidNode {
        node_id: NodeId,
        #[source]
        source: NodeError,
    },

    #[error("Compliance violation ({level}): {message}")]
    ComplianceViolation { level: String, message: String },

    #[error("{}", join_messages(.0))]
    Validation(Vec<WorkflowError>),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::NotFound(_) => ErrorKind::WorkflowNotFound,
            WorkflowError::InvalidArgument(_)
            | WorkflowError::NodeNotFound(_)
            | WorkflowError::InvalidConnection(_)
            | WorkflowError::MetadataTooLarge { .. }
            | WorkflowError::ComplianceViolation { .. } => ErrorKind::InvalidArgument,
            WorkflowError::NodeLimitExceeded { .. } => ErrorKind::NodeLimitExceeded,
            WorkflowError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            WorkflowError::CircularDependency(_) => ErrorKind::CircularDependency,
            WorkflowError::NoTriggerNode => ErrorKind::NoTriggerNode,
            WorkflowError::InvalidNode { source, .. } => source.kind(),
            WorkflowError::Validation(errors) => errors
                .first()
                .map(WorkflowError::kind)
                .unwrap_or(ErrorKind::InvalidArgument),
        }
    }

    /// Every kind contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self {
            WorkflowError::Validation(errors) => {
                errors.iter().flat_map(WorkflowError::kinds).collect()
            }
            WorkflowError::InvalidNode { source, .. } => source.kinds(),
            other => vec![other.kind()],
        }
    }

    /// Collapse a list of failures: none is `Ok`, one is returned as is.
    pub fn aggregate(mut errors: Vec<WorkflowError>) -> Result<(), WorkflowError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(WorkflowError::Validation(errors)),
        }
    }
}

/// Errors reported by the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Workflow already exists: {0}")]
    Conflict(WorkflowId),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound(_) => ErrorKind::WorkflowNotFound,
            RepositoryError::Unauthorized(_) => ErrorKind::Unauthorized,
            RepositoryError::Conflict(_) => ErrorKind::InvalidArgument,
            RepositoryError::Unavailable(_) => ErrorKind::Persistence,
        }
    }
}

fn join_messages<E: std::fmt::Display>(errors: &[E]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} errors: [{}]", errors.len(), messages.join("; "))
}
