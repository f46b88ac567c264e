//! Workflow execution runtime
//!
//! This crate provides the validator, the DAG executor, the failure-handling
//! policies (retry, circuit breaker) and the service that ties them to a
//! workflow repository.

mod breaker;
mod config;
mod executor;
mod registry;
mod repository;
mod retry;
mod service;
mod validator;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, Counts};
pub use config::{ConfigError, EngineConfig, FailurePolicy};
pub use executor::{
    ExecutionReport, ExecutionSummary, Executor, ExecutorMetrics, NodeResult, RunHandle,
};
pub use registry::{HandlerInfo, HandlerRegistry};
pub use repository::{InMemoryRepository, WorkflowRepository};
pub use retry::{Backoff, RetryPolicy};
pub use service::WorkflowService;
pub use validator::{
    detect_cycle, validate_connections, ComplianceLevel, CompliancePolicy, PermissivePolicy,
    Validator,
};
