use crate::breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::executor::{ExecutionReport, Executor, RunHandle};
use crate::repository::WorkflowRepository;
use crate::validator::{ComplianceLevel, Validator};
use flowcore::{
    ConfigMap, ErrorKind, FlowError, RepositoryError, UserId, Workflow, WorkflowError, WorkflowId,
    WorkflowStatus,
};
use futures::TryFutureExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const INVALID_REQUEST: &str = "invalid workflow request";

/// Orchestrates validate, persist and execute for workflows.
///
/// Repository calls are retried per the configured [`crate::RetryPolicy`];
/// repository and execution calls both pass through one circuit breaker.
pub struct WorkflowService {
    repository: Arc<dyn WorkflowRepository>,
    executor: Arc<Executor>,
    validator: Validator,
    compliance: ComplianceLevel,
    breaker: CircuitBreaker,
    config: EngineConfig,
}

impl WorkflowService {
    pub fn new(repository: Arc<dyn WorkflowRepository>, executor: Arc<Executor>) -> Self {
        let config = executor.config().clone();
        Self {
            repository,
            breaker: CircuitBreaker::new("workflow-service", config.breaker.clone()),
            executor,
            validator: Validator::new(),
            compliance: ComplianceLevel::Basic,
            config,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_compliance(mut self, level: ComplianceLevel) -> Self {
        self.compliance = level;
        self
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Validate and persist a new workflow as `draft`, version 1.
    #[instrument(skip(self, cancel, workflow), fields(workflow_id = %workflow.id()))]
    pub async fn create_workflow(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        workflow: Workflow,
    ) -> Result<Workflow, FlowError> {
        authorize(user_id, &workflow)?;
        self.validate(&workflow).await?;
        workflow.reset_revision();

        self.guarded(cancel, "create workflow", || self.repository.create(&workflow))
            .await
            .map_err(|e| e.context("failed to create workflow"))?;

        info!(name = %workflow.name(), nodes = workflow.node_count(), "Workflow created");
        Ok(workflow)
    }

    pub async fn get_workflow(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        workflow_id: WorkflowId,
    ) -> Result<Workflow, FlowError> {
        let workflow = self
            .guarded(cancel, "get workflow", || self.repository.get(workflow_id))
            .await?;
        authorize(user_id, &workflow)?;
        Ok(workflow)
    }

    /// Re-validate and persist an edited workflow. Running workflows cannot be updated.
    #[instrument(skip(self, cancel, workflow), fields(workflow_id = %workflow.id()))]
    pub async fn update_workflow(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        workflow: &Workflow,
    ) -> Result<(), FlowError> {
        authorize(user_id, workflow)?;
        if self.executor.is_running(workflow.id()) {
            return Err(FlowError::from(WorkflowError::InvalidArgument(
                "workflow is running".to_string(),
            ))
            .context(INVALID_REQUEST));
        }
        self.validate(workflow).await?;

        self.guarded(cancel, "update workflow", || self.repository.update(workflow))
            .await
            .map_err(|e| e.context("failed to update workflow"))
    }

    /// Delete a workflow, stopping its current run first.
    #[instrument(skip(self, cancel))]
    pub async fn delete_workflow(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        workflow_id: WorkflowId,
    ) -> Result<(), FlowError> {
        self.get_workflow(cancel, user_id, workflow_id).await?;
        if self.executor.is_running(workflow_id) {
            if let Err(e) = self.executor.stop_workflow(workflow_id) {
                warn!(%workflow_id, error = %e, "could not stop workflow before delete");
            }
        }

        self.guarded(cancel, "delete workflow", || self.repository.delete(workflow_id))
            .await
            .map_err(|e| e.context("failed to delete workflow"))?;
        info!("Workflow deleted");
        Ok(())
    }

    /// Validate, require a trigger node, and move a draft workflow to `active`.
    #[instrument(skip(self, cancel))]
    pub async fn activate_workflow(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        workflow_id: WorkflowId,
    ) -> Result<Workflow, FlowError> {
        let workflow = self.get_workflow(cancel, user_id, workflow_id).await?;
        self.validate(&workflow).await?;
        if !workflow.has_trigger() {
            return Err(FlowError::from(WorkflowError::NoTriggerNode).context(INVALID_REQUEST));
        }
        workflow.update_status(WorkflowStatus::Active)?;

        self.guarded(cancel, "activate workflow", || self.repository.update(&workflow))
            .await
            .map_err(|e| e.context("failed to activate workflow"))?;
        info!("Workflow activated");
        Ok(workflow)
    }

    /// Run an active workflow to a terminal status.
    ///
    /// Attempts that fail with a node error are repeated, while the workflow
    /// stays `running`, up to the configured execution retry limit.
    #[instrument(skip(self, cancel, inputs))]
    pub async fn start_workflow(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        workflow_id: WorkflowId,
        inputs: ConfigMap,
    ) -> Result<ExecutionReport, FlowError> {
        let workflow = Arc::new(self.get_workflow(cancel, user_id, workflow_id).await?);
        self.validate(&workflow).await?;

        let abandoned = AbandonedRun {
            repository: Arc::clone(&self.repository),
            workflow: Arc::clone(&workflow),
            armed: true,
        };
        let result = self
            .breaker
            .call(async {
                let mut run = self.executor.begin_run(cancel, Arc::clone(&workflow))?;
                self.persist_status(&workflow).await;

                let mut outcome = self.executor.run_attempt(&mut run, &inputs).await;
                while let Err(e) = &outcome {
                    if !self.should_retry(e, &run) {
                        break;
                    }
                    let delay = self.config.retry.delay_for(run.attempts());
                    warn!(
                        attempt = run.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "workflow execution failed, retrying"
                    );
                    tokio::select! {
                        _ = run.cancellation().cancelled() => {
                            outcome = Err(FlowError::Canceled);
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    outcome = self.executor.run_attempt(&mut run, &inputs).await;
                }

                self.executor.finish_run(run, outcome)
            })
            .await;
        abandoned.disarm();

        if workflow.status().is_terminal() {
            self.persist_status(&workflow).await;
        }
        result
    }

    /// Cancel the current run of a workflow.
    #[instrument(skip(self, cancel))]
    pub async fn stop_workflow(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        workflow_id: WorkflowId,
    ) -> Result<(), FlowError> {
        self.get_workflow(cancel, user_id, workflow_id).await?;
        self.executor.stop_workflow(workflow_id)
    }

    /// Live status from the executor, falling back to the persisted status.
    pub async fn get_workflow_status(
        &self,
        cancel: &CancellationToken,
        workflow_id: WorkflowId,
    ) -> Result<WorkflowStatus, FlowError> {
        match self.executor.get_workflow_status(workflow_id) {
            Ok(status) => Ok(status),
            Err(e) if e.kind() == ErrorKind::WorkflowNotFound => {
                let workflow = self
                    .guarded(cancel, "get workflow status", || self.repository.get(workflow_id))
                    .await?;
                Ok(workflow.status())
            }
            Err(e) => Err(e),
        }
    }

    /// Diagnostic snapshot of the service and its dependencies.
    pub async fn get_health(&self) -> BTreeMap<String, String> {
        let mut health = BTreeMap::new();

        let breaker = if self.breaker.is_enabled() {
            self.breaker.state().to_string()
        } else {
            "disabled".to_string()
        };
        health.insert("circuit_breaker".to_string(), breaker);

        let repository = match self.repository.health().await {
            Ok(()) => "healthy".to_string(),
            Err(e) => format!("unhealthy: {}", e),
        };
        health.insert("repository".to_string(), repository);

        health.insert("executor".to_string(), "healthy".to_string());
        health.insert(
            "active_executions".to_string(),
            self.executor.active_runs().to_string(),
        );
        health
    }

    async fn validate(&self, workflow: &Workflow) -> Result<(), FlowError> {
        self.validator
            .validate_workflow(workflow, &self.compliance)
            .await
            .map_err(|e| FlowError::from(e).context(INVALID_REQUEST))
    }

    fn should_retry(&self, err: &FlowError, run: &RunHandle) -> bool {
        self.config.enable_execution_retries
            && err.kind() == ErrorKind::NodeExecutionFailed
            && run.attempts() <= self.config.max_execution_retries
            && !run.cancellation().is_cancelled()
    }

    /// Repository call with retries, through the circuit breaker.
    async fn guarded<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        f: F,
    ) -> Result<T, FlowError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        self.breaker
            .call(
                self.config
                    .retry
                    .run(cancel, operation, |_| f().map_err(FlowError::from)),
            )
            .await
    }

    /// Best-effort write of the current status; failures are logged.
    async fn persist_status(&self, workflow: &Workflow) {
        let result = self
            .config
            .retry
            .run(&CancellationToken::new(), "persist status", |_| {
                self.repository.update(workflow).map_err(FlowError::from)
            })
            .await;
        if let Err(e) = result {
            warn!(workflow_id = %workflow.id(), error = %e, "failed to persist workflow status");
        }
    }
}

/// Persists the outcome of a `start_workflow` call that was dropped mid-run.
/// The executor cancels the run itself; this only records the `canceled`
/// status, on a background task.
struct AbandonedRun {
    repository: Arc<dyn WorkflowRepository>,
    workflow: Arc<Workflow>,
    armed: bool,
}

impl AbandonedRun {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonedRun {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.workflow.status() == WorkflowStatus::Running {
            let _ = self.workflow.update_status(WorkflowStatus::Canceled);
        }
        if !self.workflow.status().is_terminal() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let repository = Arc::clone(&self.repository);
        let workflow = Arc::clone(&self.workflow);
        runtime.spawn(async move {
            if let Err(e) = repository.update(&workflow).await {
                warn!(workflow_id = %workflow.id(), error = %e, "failed to persist abandoned run");
            }
        });
    }
}

fn authorize(user_id: UserId, workflow: &Workflow) -> Result<(), FlowError> {
    if workflow.user_id() != user_id {
        return Err(FlowError::Unauthorized(format!(
            "user {} does not own workflow {}",
            user_id,
            workflow.id()
        )));
    }
    Ok(())
}
