//! End-to-end workflow runs against real checkpoint stores.

use meshflow_checkpoint::{
    CheckpointStatus, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
use meshflow_core::{AutoApprove, DenyAll, MeshflowError};
use meshflow_workflow::{
    HanoiBenchmark, TemplateParameters, TemplateRegistry, WorkflowDefinition, WorkflowEngine,
    WorkflowStepResult, WorkflowTemplate,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn counting_workflow(id: &str, steps: u32, calls: Arc<AtomicU32>) -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new("counting").with_workflow_id(id);
    for _ in 0..steps {
        let calls = Arc::clone(&calls);
        def = def.then("count", move |ctx, _| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(WorkflowStepResult::ok().with_state("step", ctx.step_number.into()))
            }
        });
    }
    def
}

#[tokio::test]
async fn test_n_steps_produce_n_completed_checkpoints() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let engine = WorkflowEngine::new(store.clone());
    let calls = Arc::new(AtomicU32::new(0));

    let def = counting_workflow("wf-n", 7, calls.clone());
    let result = engine
        .execute_workflow(&def, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.completed_steps, 7);
    assert_eq!(result.checkpoints_created, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 7);

    let history = store.list("wf-n").await.unwrap();
    let numbers: Vec<u32> = history.iter().map(|c| c.step_number).collect();
    assert_eq!(numbers, (1..=7).collect::<Vec<_>>());
    assert!(history
        .iter()
        .all(|c| c.status == CheckpointStatus::Completed));
}

#[tokio::test]
async fn test_crash_and_resume_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let first_calls = Arc::new(AtomicU32::new(0));

    // First process: steps 1-3 succeed, step 4 fails.
    {
        let store = Arc::new(FileCheckpointStore::new(dir.path().to_path_buf()).await.unwrap());
        let engine = WorkflowEngine::new(store);
        let calls = Arc::clone(&first_calls);
        let mut def = counting_workflow("wf-crash", 3, calls);
        def = def.then("flaky", |_, _| async {
            Ok(WorkflowStepResult::failure("disk full"))
        });
        let result = engine
            .execute_workflow(&def, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.completed_steps, 3);
        assert_eq!(result.steps_failed, 1);
        assert!(result.error.unwrap().contains("disk full"));
    }
    assert_eq!(first_calls.load(Ordering::SeqCst), 3);

    // Second process: same workflow id, step 4 now works.
    let store = Arc::new(FileCheckpointStore::new(dir.path().to_path_buf()).await.unwrap());
    let latest = store.get_latest_checkpoint("wf-crash").await.unwrap().unwrap();
    assert_eq!(latest.step_number, 4);
    assert_eq!(latest.status, CheckpointStatus::Failed);

    let engine = WorkflowEngine::new(store.clone());
    let second_calls = Arc::new(AtomicU32::new(0));
    let mut def = counting_workflow("wf-crash", 3, Arc::clone(&second_calls));
    let flaky_calls = Arc::new(AtomicU32::new(0));
    let flaky = Arc::clone(&flaky_calls);
    def = def.then("flaky", move |_, _| {
        let flaky = Arc::clone(&flaky);
        async move {
            flaky.fetch_add(1, Ordering::SeqCst);
            Ok(WorkflowStepResult::ok())
        }
    });

    let result = engine
        .execute_workflow(&def, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.resumed_from_step, Some(4));
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 1);

    let latest = store.get_latest_checkpoint("wf-crash").await.unwrap().unwrap();
    assert_eq!(latest.step_number, 4);
    assert_eq!(latest.status, CheckpointStatus::Completed);
}

#[tokio::test]
async fn test_rerun_of_finished_workflow_executes_nothing() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let engine = WorkflowEngine::new(store);
    let calls = Arc::new(AtomicU32::new(0));
    let def = counting_workflow("wf-done", 4, calls.clone());

    engine
        .execute_workflow(&def, &CancellationToken::new())
        .await
        .unwrap();
    let again = engine
        .execute_workflow(&def, &CancellationToken::new())
        .await
        .unwrap();

    assert!(again.success);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(again.checkpoints_created, 0);
}

#[tokio::test]
async fn test_template_workflow_skips_governance() {
    let registry = TemplateRegistry::new();
    registry.register_template(
        WorkflowTemplate::new("report", "Nightly report", |params: &TemplateParameters| {
            let day = params
                .get("day")
                .and_then(|v| v.as_str())
                .unwrap_or("today")
                .to_string();
            Ok(WorkflowDefinition::new("nightly-report").then("render", move |_, _| {
                let day = day.clone();
                async move { Ok(WorkflowStepResult::ok().with_state("day", day.into())) }
            }))
        })
        .approved_by("ops-lead"),
    );

    let mut params = TemplateParameters::new();
    params.insert("day".into(), "monday".into());
    let def = registry.create_workflow_from_token("report", &params).unwrap();
    assert!(def.is_pre_approved);

    // A deny-all approver would stop any ad-hoc workflow.
    let engine = WorkflowEngine::new(Arc::new(InMemoryCheckpointStore::new()))
        .with_approval(Arc::new(DenyAll));
    let result = engine
        .execute_workflow(&def, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.state, meshflow_workflow::RunState::Completed);

    let ad_hoc = WorkflowDefinition::new("ad-hoc")
        .then("render", |_, _| async { Ok(WorkflowStepResult::ok()) });
    let denied = engine
        .execute_workflow(&ad_hoc, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!denied.success);
    assert_eq!(denied.completed_steps, 0);
}

#[tokio::test]
async fn test_auto_approve_lets_ad_hoc_workflow_run() {
    let engine = WorkflowEngine::new(Arc::new(InMemoryCheckpointStore::new()))
        .with_approval(Arc::new(AutoApprove));
    let def = WorkflowDefinition::new("ad-hoc")
        .then("one", |_, _| async { Ok(WorkflowStepResult::ok()) })
        .then("two", |_, _| async { Ok(WorkflowStepResult::ok()) });
    let result = engine
        .execute_workflow(&def, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.completed_steps, 2);
}

#[tokio::test]
async fn test_unknown_template_is_rejected() {
    let registry = TemplateRegistry::new();
    let err = registry
        .create_workflow_from_token("missing", &TemplateParameters::new())
        .unwrap_err();
    assert!(matches!(err, MeshflowError::Validation(_)));
}

#[tokio::test]
async fn test_hanoi_ten_discs() {
    let bench = HanoiBenchmark::in_memory();
    let result = bench
        .run_tower_of_hanoi(10, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.benchmark_name, "TowerOfHanoi");
    assert_eq!(result.total_steps_required, 1023);
    assert_eq!(result.steps_completed, 1023);
    assert_eq!(result.checkpoints_created, 1023);
    assert_eq!(result.steps_failed, 0);
    assert_eq!(result.maker_score, 100.0);
}

#[tokio::test]
async fn test_progressive_benchmark() {
    let bench = HanoiBenchmark::in_memory();
    let result = bench
        .run_progressive_benchmark(6, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.max_discs_completed, 6);
    assert_eq!(result.max_steps_completed, 63);
    assert_eq!(result.results.len(), 6);
    assert_eq!(result.overall_maker_score, 60.0);
    assert!(result.summary.contains("6/6"));
}

#[tokio::test]
async fn test_hanoi_respects_cancellation() {
    let bench = HanoiBenchmark::in_memory();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = bench.run_tower_of_hanoi(4, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
}
