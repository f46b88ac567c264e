use crate::config::{EngineConfig, FailurePolicy};
use crate::registry::HandlerRegistry;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flowcore::{
    ConfigMap, ErrorKind, ExecutionHooks, ExecutionId, FlowError, Node, NodeContext, NodeError,
    NodeHandler, NodeId, NodeOutput, NodeRunStatus, NodeType, NoopHooks, Workflow, WorkflowError,
    WorkflowId, WorkflowStatus,
};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one node within a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub status: NodeRunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub outputs: ConfigMap,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl NodeResult {
    fn pending(node: &Node) -> Self {
        Self {
            node_id: node.id(),
            node_type: node.node_type(),
            status: NodeRunStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: 0,
            outputs: ConfigMap::new(),
            error: None,
            error_kind: None,
        }
    }

    fn skip(&mut self, reason: NodeError) {
        self.status = NodeRunStatus::Skipped;
        self.error_kind = Some(reason.kind());
        self.error = Some(reason.to_string());
    }
}

/// Full record of one execution instance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Results of the last attempt, in workflow node order
    pub nodes: Vec<NodeResult>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl ExecutionReport {
    pub fn node(&self, node_id: NodeId) -> Option<&NodeResult> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// Nodes that ran to a result, successful or not
    pub fn nodes_executed(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.status, NodeRunStatus::Completed | NodeRunStatus::Failed))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.status == NodeRunStatus::Failed)
            .count()
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            id: self.execution_id,
            status: self.status,
            nodes_executed: self.nodes_executed(),
            error_count: self.error_count(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
        }
    }
}

/// Status structure handed to API callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub id: ExecutionId,
    pub status: WorkflowStatus,
    pub nodes_executed: usize,
    pub error_count: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters accumulated since creation or the last reset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorMetrics {
    pub workflows_executed: u64,
    pub nodes_executed: u64,
    pub error_count: u64,
    pub last_execution_duration_ms: u64,
}

/// Dependency graph of one run. Graph index `i` is `nodes[i]`.
struct ExecutionPlan {
    graph: DiGraph<NodeId, ()>,
    nodes: Vec<Arc<Node>>,
}

impl ExecutionPlan {
    fn build(workflow: &Workflow) -> Result<Self, WorkflowError> {
        let nodes = workflow.nodes();
        let mut graph = DiGraph::with_capacity(nodes.len(), nodes.len());
        let mut index: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(nodes.len());

        for node in &nodes {
            index.insert(node.id(), graph.add_node(node.id()));
        }

        // edges listed on either endpoint count; unknown peers are ignored
        for node in &nodes {
            let this = index[&node.id()];
            for target in node.output_connections() {
                if let Some(&to) = index.get(&target) {
                    graph.update_edge(this, to, ());
                }
            }
            for source in node.input_connections() {
                if let Some(&from) = index.get(&source) {
                    graph.update_edge(from, this, ());
                }
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(WorkflowError::CircularDependency(graph[cycle.node_id()]));
        }

        Ok(Self { graph, nodes })
    }

    /// Upstream plan indices in ascending order
    fn upstream(&self, idx: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(idx), Direction::Incoming)
            .map(|n| n.index())
            .collect();
        deps.sort_unstable();
        deps
    }

    fn descendants(&self, idx: usize) -> Vec<usize> {
        let mut dfs = Dfs::new(&self.graph, NodeIndex::new(idx));
        let mut found = Vec::new();
        while let Some(next) = dfs.next(&self.graph) {
            if next.index() != idx {
                found.push(next.index());
            }
        }
        found
    }
}

struct ActiveRun {
    execution_id: ExecutionId,
    workflow: Arc<Workflow>,
    cancel: CancellationToken,
}

type RunTable = Arc<DashMap<WorkflowId, ActiveRun>>;

/// One execution instance between `begin_run` and `finish_run`.
///
/// Dropping a handle that never reached `finish_run` cancels the run, marks
/// the workflow `canceled` and releases its slot.
pub struct RunHandle {
    runs: RunTable,
    finished: bool,
    execution_id: ExecutionId,
    workflow: Arc<Workflow>,
    cancel: CancellationToken,
    plan: ExecutionPlan,
    started: Instant,
    started_at: DateTime<Utc>,
    deadline: Instant,
    attempts: u32,
    nodes: Vec<NodeResult>,
}

impl RunHandle {
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Cancelled by `stop_workflow`, the caller's token or the run deadline.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Results of the most recent attempt
    pub fn node_results(&self) -> &[NodeResult] {
        &self.nodes
    }

    fn release(&self) {
        let workflow_id = self.workflow.id();
        self.runs
            .remove_if(&workflow_id, |_, active| active.execution_id == self.execution_id);
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.cancel.cancel();
        // fails harmlessly when a stop already committed `canceled`
        let _ = self.workflow.update_status(WorkflowStatus::Canceled);
        self.release();
        warn!(
            workflow_id = %self.workflow.id(),
            execution_id = %self.execution_id,
            "workflow run abandoned before it finished, cancelled"
        );
    }
}

struct NodeRun {
    started_at: Option<DateTime<Utc>>,
    completed_at: DateTime<Utc>,
    elapsed: Duration,
    result: Result<NodeOutput, NodeError>,
}

/// Executes workflows as DAGs with parallel execution
pub struct Executor {
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
    hooks: Arc<dyn ExecutionHooks>,
    runs: RunTable,
    reports: DashMap<WorkflowId, ExecutionReport>,
    metrics: Mutex<ExecutorMetrics>,
}

impl Executor {
    pub fn new(registry: Arc<HandlerRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            hooks: Arc::new(NoopHooks),
            runs: Arc::new(DashMap::new()),
            reports: DashMap::new(),
            metrics: Mutex::new(ExecutorMetrics::default()),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ExecutionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Execute an active workflow once, with no run inputs.
    pub async fn execute_workflow(
        &self,
        cancel: &CancellationToken,
        workflow: Arc<Workflow>,
    ) -> Result<ExecutionReport, FlowError> {
        self.execute_workflow_with_inputs(cancel, workflow, ConfigMap::new())
            .await
    }

    /// Execute an active workflow once. Root nodes receive `inputs`.
    ///
    /// Returns the report when the run completes; otherwise the error that
    /// ended it. The report of a failed run is available from
    /// [`Executor::execution_report`].
    pub async fn execute_workflow_with_inputs(
        &self,
        cancel: &CancellationToken,
        workflow: Arc<Workflow>,
        inputs: ConfigMap,
    ) -> Result<ExecutionReport, FlowError> {
        let mut run = self.begin_run(cancel, workflow)?;
        let outcome = self.run_attempt(&mut run, &inputs).await;
        self.finish_run(run, outcome)
    }

    /// Check run preconditions, move the workflow to `running` and register
    /// the run so it can be stopped and queried.
    ///
    /// A workflow has at most one live run per executor; a second start while
    /// one is registered fails with `InvalidTransition`.
    pub fn begin_run(
        &self,
        cancel: &CancellationToken,
        workflow: Arc<Workflow>,
    ) -> Result<RunHandle, FlowError> {
        if !workflow.has_trigger() {
            return Err(WorkflowError::NoTriggerNode.into());
        }
        let plan = ExecutionPlan::build(&workflow)?;
        for node in &plan.nodes {
            self.registry
                .validate_node_config(node)
                .map_err(|source| WorkflowError::InvalidNode {
                    node_id: node.id(),
                    source,
                })?;
        }

        let execution_id = Uuid::new_v4();
        let run_cancel = cancel.child_token();
        match self.runs.entry(workflow.id()) {
            Entry::Occupied(live) => {
                return Err(WorkflowError::InvalidTransition {
                    from: live.get().workflow.status(),
                    to: WorkflowStatus::Running,
                }
                .into());
            }
            Entry::Vacant(slot) => {
                workflow.update_status(WorkflowStatus::Running)?;
                slot.insert(ActiveRun {
                    execution_id,
                    workflow: Arc::clone(&workflow),
                    cancel: run_cancel.clone(),
                });
            }
        }
        workflow.mark_executed();

        info!(
            workflow_id = %workflow.id(),
            %execution_id,
            nodes = plan.nodes.len(),
            "Starting workflow execution"
        );
        self.hooks.workflow_started(execution_id, workflow.id());

        let started = Instant::now();
        Ok(RunHandle {
            runs: Arc::clone(&self.runs),
            finished: false,
            execution_id,
            workflow,
            cancel: run_cancel,
            plan,
            started,
            started_at: Utc::now(),
            deadline: started + self.config.execution_timeout(),
            attempts: 0,
            nodes: Vec::new(),
        })
    }

    /// Run every node of the plan once, in dependency order.
    pub async fn run_attempt(&self, run: &mut RunHandle, inputs: &ConfigMap) -> Result<(), FlowError> {
        run.attempts += 1;
        let plan = &run.plan;
        let max_parallel = self.config.max_parallel_nodes.max(1);

        let mut results: Vec<NodeResult> = plan.nodes.iter().map(|n| NodeResult::pending(n)).collect();
        let mut outputs: Vec<Option<ConfigMap>> = vec![None; plan.nodes.len()];
        let mut running = FuturesUnordered::new();
        let mut failure: Option<FlowError> = None;
        let mut first_failed: Option<NodeId> = None;
        let mut halted = false;
        let mut cancel_seen = false;
        let mut deadline_hit = false;

        let deadline = tokio::time::sleep_until(run.deadline);
        tokio::pin!(deadline);

        if run.cancel.is_cancelled() {
            halted = true;
            cancel_seen = true;
            failure = Some(if Instant::now() >= run.deadline {
                deadline_hit = true;
                self.deadline_error()
            } else {
                FlowError::Canceled
            });
        }

        loop {
            if !halted {
                for idx in 0..plan.nodes.len() {
                    if running.len() >= max_parallel {
                        break;
                    }
                    if results[idx].status != NodeRunStatus::Pending {
                        continue;
                    }
                    let deps = plan.upstream(idx);
                    if !deps.iter().all(|d| results[*d].status == NodeRunStatus::Completed) {
                        continue;
                    }

                    let node_inputs = if deps.is_empty() {
                        inputs.clone()
                    } else {
                        let mut merged = ConfigMap::new();
                        for dep in &deps {
                            if let Some(out) = &outputs[*dep] {
                                merged.extend(out.iter().map(|(k, v)| (k.clone(), v.clone())));
                            }
                        }
                        merged
                    };

                    results[idx].status = NodeRunStatus::Running;
                    let handle = self.spawn_node(run, &plan.nodes[idx], node_inputs);
                    running.push(async move { (idx, handle.await) });
                }
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = &mut deadline, if !deadline_hit => {
                    deadline_hit = true;
                    halted = true;
                    warn!(
                        workflow_id = %run.workflow.id(),
                        timeout_ms = self.config.execution_timeout_ms,
                        "workflow execution timed out, cancelling in-flight nodes"
                    );
                    failure = Some(self.deadline_error());
                    run.cancel.cancel();
                }
                _ = run.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    halted = true;
                    failure.get_or_insert(FlowError::Canceled);
                }
                Some((idx, joined)) = running.next() => {
                    let node_run = joined.unwrap_or_else(|e| NodeRun {
                        started_at: None,
                        completed_at: Utc::now(),
                        elapsed: Duration::ZERO,
                        result: Err(NodeError::ExecutionFailed(format!("node task aborted: {}", e))),
                    });

                    let result = &mut results[idx];
                    result.started_at = node_run.started_at;
                    result.completed_at = Some(node_run.completed_at);
                    result.duration_ms = node_run.elapsed.as_millis() as u64;

                    match node_run.result {
                        Ok(output) => {
                            debug!(node_id = %result.node_id, duration_ms = result.duration_ms, "Node completed");
                            result.status = NodeRunStatus::Completed;
                            result.outputs = output.outputs.clone();
                            outputs[idx] = Some(output.outputs);
                        }
                        Err(e) => {
                            let node_id = result.node_id;
                            error!(%node_id, error = %e, "Node failed");
                            result.status = NodeRunStatus::Failed;
                            result.error = Some(e.to_string());
                            result.error_kind = Some(e.kind());
                            first_failed.get_or_insert(node_id);
                            if failure.is_none() {
                                failure = Some(FlowError::NodeFailed { node_id, source: e });
                            }

                            match self.config.failure_policy {
                                FailurePolicy::FailFast => halted = true,
                                FailurePolicy::ContinueOnError => {
                                    for desc in plan.descendants(idx) {
                                        let skipped = &mut results[desc];
                                        if skipped.status != NodeRunStatus::Pending {
                                            continue;
                                        }
                                        skipped.skip(NodeError::Skipped(node_id));
                                        self.hooks.node_finished(
                                            run.execution_id,
                                            skipped.node_id,
                                            NodeRunStatus::Skipped,
                                            Duration::ZERO,
                                            skipped.error.as_deref(),
                                        );
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        for result in results.iter_mut().filter(|r| r.status == NodeRunStatus::Pending) {
            let reason = match first_failed {
                Some(node_id) => NodeError::Skipped(node_id),
                None => NodeError::Cancelled,
            };
            result.skip(reason);
            self.hooks.node_finished(
                run.execution_id,
                result.node_id,
                NodeRunStatus::Skipped,
                Duration::ZERO,
                result.error.as_deref(),
            );
        }

        {
            let mut metrics = self.metrics.lock();
            metrics.nodes_executed += results
                .iter()
                .filter(|r| matches!(r.status, NodeRunStatus::Completed | NodeRunStatus::Failed))
                .count() as u64;
            metrics.error_count += results
                .iter()
                .filter(|r| r.status == NodeRunStatus::Failed)
                .count() as u64;
        }

        run.nodes = results;
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Commit the terminal status, unless a stop already did, and record the report.
    pub fn finish_run(
        &self,
        mut run: RunHandle,
        outcome: Result<(), FlowError>,
    ) -> Result<ExecutionReport, FlowError> {
        let workflow_id = run.workflow.id();
        let target = match &outcome {
            Ok(()) => WorkflowStatus::Completed,
            Err(e) if e.kind() == ErrorKind::Canceled => WorkflowStatus::Canceled,
            Err(_) => WorkflowStatus::Failed,
        };
        let status = match run.workflow.update_status(target) {
            Ok(()) => target,
            Err(_) => run.workflow.status(),
        };

        let error = match (status, outcome) {
            (WorkflowStatus::Completed, _) => None,
            (WorkflowStatus::Canceled, Err(e)) if e.kind() == ErrorKind::Canceled => Some(e),
            (WorkflowStatus::Canceled, _) => Some(FlowError::Canceled),
            (_, Err(e)) => Some(e),
            (other, Ok(())) => Some(FlowError::Execution(format!(
                "workflow ended in unexpected status {}",
                other
            ))),
        };

        let elapsed = run.started.elapsed();
        let report = ExecutionReport {
            execution_id: run.execution_id,
            workflow_id,
            status,
            attempts: run.attempts,
            started_at: run.started_at,
            completed_at: Some(Utc::now()),
            duration_ms: elapsed.as_millis() as u64,
            nodes: std::mem::take(&mut run.nodes),
            error: error.as_ref().map(ToString::to_string),
            error_kind: error.as_ref().map(FlowError::kind),
        };

        self.reports.insert(workflow_id, report.clone());
        run.release();
        run.finished = true;
        {
            let mut metrics = self.metrics.lock();
            metrics.workflows_executed += 1;
            metrics.last_execution_duration_ms = report.duration_ms;
        }

        self.hooks
            .workflow_finished(run.execution_id, workflow_id, status, elapsed);
        info!(
            %workflow_id,
            execution_id = %run.execution_id,
            %status,
            attempts = report.attempts,
            duration_ms = report.duration_ms,
            "Workflow execution finished"
        );

        match error {
            None => Ok(report),
            Some(e) => Err(e),
        }
    }

    /// Dispatch a single node to its handler under the per-node timeout.
    pub async fn execute_node(
        &self,
        cancel: &CancellationToken,
        node: &Node,
        inputs: ConfigMap,
    ) -> Result<NodeOutput, FlowError> {
        let handler = self.registry.get(node.node_type()).ok_or_else(|| {
            WorkflowError::InvalidArgument(format!(
                "no handler registered for node type {}",
                node.node_type()
            ))
        })?;
        let ctx = NodeContext::new(Uuid::new_v4(), node, inputs, cancel.child_token());

        dispatch(handler, ctx, self.config.node_timeout(), self.config.cancel_grace())
            .await
            .map_err(|source| FlowError::NodeFailed {
                node_id: node.id(),
                source,
            })
    }

    /// Cancel the current run of a workflow and mark it `canceled`.
    pub fn stop_workflow(&self, workflow_id: WorkflowId) -> Result<(), FlowError> {
        let run = self
            .runs
            .get(&workflow_id)
            .ok_or(WorkflowError::NotFound(workflow_id))?;

        run.workflow
            .update_status(WorkflowStatus::Canceled)
            .map_err(|_| WorkflowError::NotFound(workflow_id))?;
        run.cancel.cancel();

        info!(%workflow_id, execution_id = %run.execution_id, "Workflow execution stopped");
        Ok(())
    }

    /// Latest committed status of a running or previously executed workflow.
    pub fn get_workflow_status(&self, workflow_id: WorkflowId) -> Result<WorkflowStatus, FlowError> {
        if let Some(run) = self.runs.get(&workflow_id) {
            return Ok(run.workflow.status());
        }
        self.reports
            .get(&workflow_id)
            .map(|report| report.status)
            .ok_or_else(|| WorkflowError::NotFound(workflow_id).into())
    }

    /// Report of the most recent finished run of a workflow
    pub fn execution_report(&self, workflow_id: WorkflowId) -> Option<ExecutionReport> {
        self.reports.get(&workflow_id).map(|r| r.value().clone())
    }

    pub fn is_running(&self, workflow_id: WorkflowId) -> bool {
        self.runs.contains_key(&workflow_id)
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn get_metrics(&self) -> ExecutorMetrics {
        self.metrics.lock().clone()
    }

    pub fn reset_metrics(&self) {
        *self.metrics.lock() = ExecutorMetrics::default();
    }

    fn deadline_error(&self) -> FlowError {
        FlowError::DeadlineExceeded {
            millis: self.config.execution_timeout_ms,
        }
    }

    fn spawn_node(&self, run: &RunHandle, node: &Arc<Node>, inputs: ConfigMap) -> JoinHandle<NodeRun> {
        let handler = self.registry.get(node.node_type());
        let hooks = Arc::clone(&self.hooks);
        let ctx = NodeContext::new(run.execution_id, node, inputs, run.cancel.child_token());
        let node_timeout = self.config.node_timeout();
        let grace = self.config.cancel_grace();

        debug!(node_id = %ctx.node_id, node_type = %ctx.node_type, "Dispatching node");
        tokio::spawn(async move {
            let started_at = Utc::now();
            let start = Instant::now();
            let (execution_id, node_id) = (ctx.execution_id, ctx.node_id);
            hooks.node_started(execution_id, node_id, ctx.node_type);

            let result = match handler {
                Some(handler) => dispatch(handler, ctx, node_timeout, grace).await,
                None => Err(NodeError::ExecutionFailed(format!(
                    "no handler registered for node type {}",
                    ctx.node_type
                ))),
            };

            let elapsed = start.elapsed();
            let status = if result.is_ok() {
                NodeRunStatus::Completed
            } else {
                NodeRunStatus::Failed
            };
            let message = result.as_ref().err().map(ToString::to_string);
            hooks.node_finished(execution_id, node_id, status, elapsed, message.as_deref());

            NodeRun {
                started_at: Some(started_at),
                completed_at: Utc::now(),
                elapsed,
                result,
            }
        })
    }
}

/// Run a handler under the node timeout. Once the context is cancelled the
/// handler gets `grace` to return before it is abandoned.
async fn dispatch(
    handler: Arc<dyn NodeHandler>,
    ctx: NodeContext,
    node_timeout: Duration,
    grace: Duration,
) -> Result<NodeOutput, NodeError> {
    let cancel = ctx.cancellation.clone();
    let node_id = ctx.node_id;
    let execution = timeout(node_timeout, handler.execute(ctx));
    tokio::pin!(execution);

    let outcome = tokio::select! {
        biased;
        outcome = &mut execution => outcome,
        _ = cancel.cancelled() => match timeout(grace, &mut execution).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(%node_id, grace_ms = grace.as_millis() as u64, "Node ignored cancellation, abandoning it");
                return Err(NodeError::Cancelled);
            }
        },
    };

    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!(%node_id, timeout_ms = node_timeout.as_millis() as u64, "Node timed out");
            Err(NodeError::Timeout {
                millis: node_timeout.as_millis() as u64,
            })
        }
    }
}
