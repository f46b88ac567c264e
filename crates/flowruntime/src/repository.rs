use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flowcore::{RepositoryError, Workflow, WorkflowId, WorkflowSpec};

/// Persistence collaborator for workflows.
///
/// Errors other than `NotFound` and `Unauthorized` are treated as transient
/// by the service and retried.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create(&self, workflow: &Workflow) -> Result<(), RepositoryError>;

    async fn get(&self, id: WorkflowId) -> Result<Workflow, RepositoryError>;

    async fn update(&self, workflow: &Workflow) -> Result<(), RepositoryError>;

    async fn delete(&self, id: WorkflowId) -> Result<(), RepositoryError>;

    /// Liveness probe used by health reporting
    async fn health(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Repository keeping workflow snapshots in memory
#[derive(Default)]
pub struct InMemoryRepository {
    workflows: DashMap<WorkflowId, WorkflowSpec>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryRepository {
    async fn create(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        match self.workflows.entry(workflow.id()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(workflow.id())),
            Entry::Vacant(slot) => {
                slot.insert(workflow.spec());
                Ok(())
            }
        }
    }

    async fn get(&self, id: WorkflowId) -> Result<Workflow, RepositoryError> {
        let spec = self
            .workflows
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(RepositoryError::NotFound(id))?;

        Workflow::from_spec(spec).map_err(|e| {
            RepositoryError::Unavailable(format!("stored workflow {} is invalid: {}", id, e))
        })
    }

    async fn update(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        match self.workflows.get_mut(&workflow.id()) {
            Some(mut entry) => {
                *entry = workflow.spec();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(workflow.id())),
        }
    }

    async fn delete(&self, id: WorkflowId) -> Result<(), RepositoryError> {
        self.workflows
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound(id))
    }
}
