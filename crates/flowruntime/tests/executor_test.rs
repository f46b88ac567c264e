mod common;

use common::*;
use flowcore::{
    ConfigMap, ErrorKind, EventBus, ExecutionEvent, NodeRunStatus, Value, Workflow,
    WorkflowStatus,
};
use flowruntime::{
    ComplianceLevel, EngineConfig, Executor, ExecutorMetrics, FailurePolicy, Validator,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[tokio::test]
async fn test_trigger_then_action_completes_in_order() {
    init_tracing();
    let action = Arc::new(ScriptedAction::default());
    let executor = executor(Arc::clone(&action), EngineConfig::default());

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let step = add_action(&wf, "step", "ok");
    wf.connect(trigger, step).unwrap();
    let wf = active(wf);

    let mut inputs = ConfigMap::new();
    inputs.insert("order_id".to_string(), Value::from("A-17"));
    let report = executor
        .execute_workflow_with_inputs(&CancellationToken::new(), Arc::clone(&wf), inputs)
        .await
        .unwrap();

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(wf.status(), WorkflowStatus::Completed);
    assert!(wf.last_executed_at().is_some());
    assert_eq!(report.attempts, 1);

    let first = report.node(trigger).unwrap();
    let second = report.node(step).unwrap();
    assert_eq!(first.status, NodeRunStatus::Completed);
    assert_eq!(second.status, NodeRunStatus::Completed);
    assert!(second.started_at.unwrap() >= first.completed_at.unwrap());
    assert_eq!(first.outputs.get("order_id"), Some(&Value::from("A-17")));

    let summary = report.summary();
    assert_eq!(summary.nodes_executed, 2);
    assert_eq!(summary.error_count, 0);
    assert_eq!(executor.get_workflow_status(wf.id()).unwrap(), WorkflowStatus::Completed);
    assert_eq!(action.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_workflow_has_no_trigger() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());
    let wf = active(draft(Uuid::new_v4()));

    let err = executor
        .execute_workflow(&CancellationToken::new(), Arc::clone(&wf))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTriggerNode);
    assert_eq!(wf.status(), WorkflowStatus::Active);
    assert!(!executor.is_running(wf.id()));
}

#[tokio::test]
async fn test_cycle_is_rejected_before_execution() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());
    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let step = add_action(&wf, "step", "ok");
    wf.connect(trigger, step).unwrap();
    wf.connect(step, trigger).unwrap();

    let err = Validator::new()
        .validate_workflow(&wf, &ComplianceLevel::Basic)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircularDependency);

    let wf = active(wf);
    let err = executor
        .execute_workflow(&CancellationToken::new(), Arc::clone(&wf))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircularDependency);
    assert_eq!(wf.status(), WorkflowStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_fail_fast_skips_downstream_and_lets_running_nodes_finish() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let broken = add_action(&wf, "broken", "fail");
    let after_broken = add_action(&wf, "after broken", "ok");
    let slow = add_sleeper(&wf, "slow branch", 200);
    let after_slow = add_action(&wf, "after slow", "ok");
    wf.connect(trigger, broken).unwrap();
    wf.connect(broken, after_broken).unwrap();
    wf.connect(trigger, slow).unwrap();
    wf.connect(slow, after_slow).unwrap();
    let wf = active(wf);

    let err = executor
        .execute_workflow(&CancellationToken::new(), Arc::clone(&wf))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NodeExecutionFailed);
    assert_eq!(wf.status(), WorkflowStatus::Failed);

    let report = executor.execution_report(wf.id()).unwrap();
    assert_eq!(report.status, WorkflowStatus::Failed);
    assert_eq!(report.node(broken).unwrap().status, NodeRunStatus::Failed);
    assert_eq!(report.node(after_broken).unwrap().status, NodeRunStatus::Skipped);
    // already running when the failure landed
    assert_eq!(report.node(slow).unwrap().status, NodeRunStatus::Completed);
    // not yet started, so fail-fast never starts it
    assert_eq!(report.node(after_slow).unwrap().status, NodeRunStatus::Skipped);
    assert_eq!(report.error_count(), 1);
    assert!(report.error.unwrap().contains("scripted failure"));
}

#[tokio::test(start_paused = true)]
async fn test_continue_on_error_runs_independent_branches() {
    let config = EngineConfig {
        failure_policy: FailurePolicy::ContinueOnError,
        ..EngineConfig::default()
    };
    let executor = executor(Arc::new(ScriptedAction::default()), config);

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let broken = add_action(&wf, "broken", "fail");
    let after_broken = add_action(&wf, "after broken", "ok");
    let slow = add_sleeper(&wf, "slow branch", 200);
    let after_slow = add_action(&wf, "after slow", "ok");
    wf.connect(trigger, broken).unwrap();
    wf.connect(broken, after_broken).unwrap();
    wf.connect(trigger, slow).unwrap();
    wf.connect(slow, after_slow).unwrap();
    let wf = active(wf);

    let err = executor
        .execute_workflow(&CancellationToken::new(), Arc::clone(&wf))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NodeExecutionFailed);

    let report = executor.execution_report(wf.id()).unwrap();
    assert_eq!(report.status, WorkflowStatus::Failed);
    assert_eq!(report.node(after_broken).unwrap().status, NodeRunStatus::Skipped);
    assert_eq!(report.node(after_slow).unwrap().status, NodeRunStatus::Completed);
    assert_eq!(report.nodes_executed(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_node_timeout_fails_the_node_and_the_workflow() {
    let config = EngineConfig {
        node_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let executor = executor(Arc::new(ScriptedAction::default()), config);

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let slow = add_sleeper(&wf, "slow call", 1_000);
    let after = add_action(&wf, "after", "ok");
    wf.connect(trigger, slow).unwrap();
    wf.connect(slow, after).unwrap();
    let wf = active(wf);

    let err = executor
        .execute_workflow(&CancellationToken::new(), Arc::clone(&wf))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NodeExecutionFailed);

    let report = executor.execution_report(wf.id()).unwrap();
    let timed_out = report.node(slow).unwrap();
    assert_eq!(timed_out.status, NodeRunStatus::Failed);
    assert_eq!(timed_out.error_kind, Some(ErrorKind::DeadlineExceeded));
    assert_eq!(report.node(after).unwrap().status, NodeRunStatus::Skipped);

    assert_eq!(executor.get_workflow_status(wf.id()).unwrap(), WorkflowStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_execution_deadline_cancels_in_flight_nodes() {
    let config = EngineConfig {
        execution_timeout_ms: 100,
        ..EngineConfig::default()
    };
    let executor = executor(Arc::new(ScriptedAction::default()), config);

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let slow = add_sleeper(&wf, "long job", 60_000);
    wf.connect(trigger, slow).unwrap();
    let wf = active(wf);

    let err = executor
        .execute_workflow(&CancellationToken::new(), Arc::clone(&wf))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert_eq!(wf.status(), WorkflowStatus::Failed);

    let report = executor.execution_report(wf.id()).unwrap();
    assert_eq!(report.node(slow).unwrap().error_kind, Some(ErrorKind::Canceled));
    assert_eq!(report.error_kind, Some(ErrorKind::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_a_running_workflow() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let slow = add_sleeper(&wf, "long job", 60_000);
    wf.connect(trigger, slow).unwrap();
    let wf = active(wf);

    let task = {
        let executor = Arc::clone(&executor);
        let wf = Arc::clone(&wf);
        tokio::spawn(async move {
            executor
                .execute_workflow(&CancellationToken::new(), wf)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(executor.is_running(wf.id()));
    assert_eq!(executor.get_workflow_status(wf.id()).unwrap(), WorkflowStatus::Running);
    assert_eq!(executor.active_runs(), 1);

    executor.stop_workflow(wf.id()).unwrap();
    assert_eq!(executor.get_workflow_status(wf.id()).unwrap(), WorkflowStatus::Canceled);

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert_eq!(wf.status(), WorkflowStatus::Canceled);
    assert!(!executor.is_running(wf.id()));

    let report = executor.execution_report(wf.id()).unwrap();
    assert_eq!(report.status, WorkflowStatus::Canceled);
    assert_eq!(report.node(trigger).unwrap().status, NodeRunStatus::Completed);

    let err = executor.stop_workflow(wf.id()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WorkflowNotFound);
}

#[tokio::test]
async fn test_caller_cancellation_propagates_to_the_run() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());
    let wf = draft(Uuid::new_v4());
    add_trigger(&wf);
    let wf = active(wf);

    let token = CancellationToken::new();
    token.cancel();
    let err = executor
        .execute_workflow(&token, Arc::clone(&wf))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert_eq!(wf.status(), WorkflowStatus::Canceled);
}

#[tokio::test]
async fn test_unknown_workflow_status_is_not_found() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());
    let err = executor.get_workflow_status(Uuid::new_v4()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WorkflowNotFound);
    assert!(executor.stop_workflow(Uuid::new_v4()).is_err());
}

#[tokio::test]
async fn test_draft_workflow_cannot_run() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());
    let wf = draft(Uuid::new_v4());
    add_trigger(&wf);

    let err = executor
        .execute_workflow(&CancellationToken::new(), Arc::new(wf))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_cap_bounds_in_flight_nodes() {
    let config = EngineConfig {
        max_parallel_nodes: 2,
        ..EngineConfig::default()
    };
    let action = Arc::new(ScriptedAction::default());
    let executor = executor(Arc::clone(&action), config);

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    for i in 0..6 {
        let id = add_sleeper(&wf, &format!("fan-out {}", i), 100);
        wf.connect(trigger, id).unwrap();
    }
    let wf = active(wf);

    let report = executor
        .execute_workflow(&CancellationToken::new(), wf)
        .await
        .unwrap();
    assert_eq!(report.nodes_executed(), 7);
    assert_eq!(action.calls.load(Ordering::SeqCst), 6);
    assert!(action.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_metrics_accumulate_and_reset() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());

    for action_type in ["ok", "fail"] {
        let wf = draft(Uuid::new_v4());
        let trigger = add_trigger(&wf);
        let step = add_action(&wf, "step", action_type);
        wf.connect(trigger, step).unwrap();
        let _ = executor
            .execute_workflow(&CancellationToken::new(), active(wf))
            .await;
    }

    let metrics = executor.get_metrics();
    assert_eq!(metrics.workflows_executed, 2);
    assert_eq!(metrics.nodes_executed, 4);
    assert_eq!(metrics.error_count, 1);

    executor.reset_metrics();
    assert_eq!(executor.get_metrics(), ExecutorMetrics::default());
}

#[tokio::test]
async fn test_execute_node_dispatches_to_handler() {
    let executor = executor(Arc::new(ScriptedAction::default()), EngineConfig::default());
    let wf = draft(Uuid::new_v4());
    let step = add_action(&wf, "step", "fail");
    let node = wf.node(step).unwrap();

    let err = executor
        .execute_node(&CancellationToken::new(), &node, ConfigMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NodeExecutionFailed);

    let trigger = wf.node(add_trigger(&wf)).unwrap();
    let mut inputs = ConfigMap::new();
    inputs.insert("x".to_string(), Value::from(1i64));
    let output = executor
        .execute_node(&CancellationToken::new(), &trigger, inputs)
        .await
        .unwrap();
    assert_eq!(output.outputs.get("triggered"), Some(&Value::from(true)));
    assert_eq!(output.outputs.get("x"), Some(&Value::from(1i64)));
}

#[tokio::test]
async fn test_event_bus_sees_run_lifecycle() {
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    let executor = Executor::new(
        registry(Arc::new(ScriptedAction::default())),
        EngineConfig::default(),
    )
    .with_hooks(bus.clone());

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let step = add_action(&wf, "step", "ok");
    wf.connect(trigger, step).unwrap();
    let report = executor
        .execute_workflow(&CancellationToken::new(), active(wf))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.execution_id(), report.execution_id);
        seen.push(event);
    }

    assert_eq!(seen.len(), 6);
    assert!(matches!(seen.first(), Some(ExecutionEvent::WorkflowStarted { .. })));
    assert!(matches!(
        seen.last(),
        Some(ExecutionEvent::WorkflowFinished {
            status: WorkflowStatus::Completed,
            ..
        })
    ));
    let node_finishes = seen
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::NodeFinished { status: NodeRunStatus::Completed, .. }))
        .count();
    assert_eq!(node_finishes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_second_copy_cannot_start_while_a_run_is_live() {
    let action = Arc::new(ScriptedAction::default());
    let executor = executor(Arc::clone(&action), EngineConfig::default());

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let slow = add_sleeper(&wf, "long job", 1_000);
    wf.connect(trigger, slow).unwrap();
    let wf = active(wf);
    let copy = Arc::new(Workflow::from_spec(wf.spec()).unwrap());

    let first = {
        let executor = Arc::clone(&executor);
        let wf = Arc::clone(&wf);
        tokio::spawn(async move { executor.execute_workflow(&CancellationToken::new(), wf).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = executor
        .execute_workflow(&CancellationToken::new(), Arc::clone(&copy))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(copy.status(), WorkflowStatus::Active);
    assert_eq!(executor.active_runs(), 1);

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(action.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_run_is_cancelled_and_released() {
    let action = Arc::new(ScriptedAction::default());
    let executor = executor(Arc::clone(&action), EngineConfig::default());

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let slow = add_sleeper(&wf, "long job", 60_000);
    wf.connect(trigger, slow).unwrap();
    let wf = active(wf);

    let task = {
        let executor = Arc::clone(&executor);
        let wf = Arc::clone(&wf);
        tokio::spawn(async move { executor.execute_workflow(&CancellationToken::new(), wf).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(executor.is_running(wf.id()));

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(!executor.is_running(wf.id()));
    assert_eq!(executor.active_runs(), 0);
    assert_eq!(wf.status(), WorkflowStatus::Canceled);

    // the orphaned node task sees the cancellation instead of sleeping on
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    let err = executor.stop_workflow(wf.id()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WorkflowNotFound);
}

#[tokio::test(start_paused = true)]
async fn test_continue_on_error_reports_skipped_nodes_to_hooks() {
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    let config = EngineConfig {
        failure_policy: FailurePolicy::ContinueOnError,
        ..EngineConfig::default()
    };
    let executor =
        Executor::new(registry(Arc::new(ScriptedAction::default())), config).with_hooks(bus.clone());

    let wf = draft(Uuid::new_v4());
    let trigger = add_trigger(&wf);
    let broken = add_action(&wf, "broken", "fail");
    let after_broken = add_action(&wf, "after broken", "ok");
    let side = add_action(&wf, "side", "ok");
    wf.connect(trigger, broken).unwrap();
    wf.connect(broken, after_broken).unwrap();
    wf.connect(trigger, side).unwrap();
    executor
        .execute_workflow(&CancellationToken::new(), active(wf))
        .await
        .unwrap_err();

    let mut skipped = Vec::new();
    let mut finished = 0;
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeFinished { node_id, status, .. } = event {
            finished += 1;
            if status == NodeRunStatus::Skipped {
                skipped.push(node_id);
            }
        }
    }
    assert_eq!(skipped, vec![after_broken]);
    assert_eq!(finished, 4);
}
