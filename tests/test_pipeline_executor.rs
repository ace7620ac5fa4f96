//! Pipeline executor behavior tests
//!
//! Covers output threading, stop-on-first-failure, request validation,
//! snapshot emission and cancellation against scripted completion backends.


use agentflow::error::ErrorKind;
use agentflow::llm::{CompletionBackend, LlmError};
use agentflow::pipeline::{
    cancellation, CancelSignal, PipelineRun, RunHandle, RunState, StageStatus, SNAPSHOT_BUFFER,
};
use agentflow::testing::ScriptedBackend;
use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_helpers::{executor_with, ids};
use tokio::sync::{mpsc, Semaphore};

const BUILTIN_IDS: [&str; 4] = ["research", "summary", "factcheck", "writer"];

/// Wraps its input in brackets and fails on one chosen call
struct FailOnCall {
    fail_at: Option<usize>,
    calls: AtomicUsize,
    inputs: std::sync::Mutex<Vec<String>>,
}

impl FailOnCall {
    fn new(fail_at: Option<usize>) -> Self {
        Self {
            fail_at,
            calls: AtomicUsize::new(0),
            inputs: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for FailOnCall {
    async fn complete(
        &self,
        _system_directive: &str,
        user_content: &str,
    ) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(user_content.to_string());
        if Some(call) == self.fail_at {
            return Err(LlmError::ApiError(format!("call {call} failed")));
        }
        Ok(format!("[{user_content}]"))
    }
}

fn statuses(run: &PipelineRun) -> Vec<StageStatus> {
    run.stages.iter().map(|s| s.status).collect()
}

// Scenario A
#[tokio::test]
async fn test_single_agent_pipeline_succeeds() {
    let backend = Arc::new(ScriptedBackend::new().respond("summary", "short text"));
    let report = executor_with(backend.clone())
        .run_to_completion(ids(&["summary"]), "long text".to_string())
        .await
        .unwrap();

    assert_eq!(report.run.state, RunState::Succeeded);
    assert_eq!(statuses(&report.run), vec![StageStatus::Succeeded]);
    assert_eq!(report.run.stages[0].output.as_deref(), Some("short text"));
    assert_eq!(report.run.final_output(), Some("short text"));
    assert_eq!(backend.calls().await[0].user_content, "long text");
}

// Scenario B
#[tokio::test]
async fn test_second_stage_receives_first_stage_output() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .respond("research", "facts")
            .respond("summary", "brief"),
    );
    let report = executor_with(backend.clone())
        .run_to_completion(ids(&["research", "summary"]), "topic".to_string())
        .await
        .unwrap();

    assert_eq!(
        statuses(&report.run),
        vec![StageStatus::Succeeded, StageStatus::Succeeded]
    );
    assert_eq!(report.run.final_output(), Some("brief"));

    let calls = backend.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].user_content, "topic");
    assert_eq!(calls[1].user_content, "facts");
}

// Scenario C
#[tokio::test]
async fn test_backend_timeout_halts_pipeline() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .respond("research", "facts")
            .fail("factcheck", LlmError::Timeout("deadline elapsed".to_string())),
    );
    let report = executor_with(backend.clone())
        .run_to_completion(ids(&["research", "factcheck"]), "topic".to_string())
        .await
        .unwrap();

    let run = &report.run;
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.stages[0].status, StageStatus::Succeeded);
    assert_eq!(run.stages[0].output.as_deref(), Some("facts"));
    assert_eq!(run.stages[1].status, StageStatus::Failed);
    assert_eq!(run.stages[1].error_kind, Some(ErrorKind::BackendError));
    assert!(run.stages[1]
        .output
        .as_deref()
        .unwrap()
        .contains("deadline elapsed"));
    assert!(run.final_output().is_none());
    assert_eq!(backend.call_count().await, 2);
}

// Scenario D
#[tokio::test]
async fn test_unknown_agent_fails_stage_without_backend_call() {
    let backend = Arc::new(ScriptedBackend::new());
    let report = executor_with(backend.clone())
        .run_to_completion(ids(&["nonexistent"]), "x".to_string())
        .await
        .unwrap();

    assert_eq!(report.run.state, RunState::Failed);
    assert_eq!(report.run.stages.len(), 1);
    assert_eq!(report.run.stages[0].status, StageStatus::Failed);
    assert_eq!(report.run.stages[0].error_kind, Some(ErrorKind::UnknownAgent));
    assert!(report.run.stages[0]
        .output
        .as_deref()
        .unwrap()
        .contains("nonexistent"));
    assert_eq!(backend.call_count().await, 0);
}

#[tokio::test]
async fn test_unknown_agent_mid_pipeline_freezes_later_stages() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .respond("research", "facts")
            .respond("writer", "never used"),
    );
    let report = executor_with(backend.clone())
        .run_to_completion(ids(&["research", "ghost", "writer"]), "topic".to_string())
        .await
        .unwrap();

    assert_eq!(
        statuses(&report.run),
        vec![
            StageStatus::Succeeded,
            StageStatus::Failed,
            StageStatus::Pending
        ]
    );
    assert!(report.run.stages[2].output.is_none());
    assert_eq!(backend.call_count().await, 1);
}

#[tokio::test]
async fn test_invalid_requests_create_no_stages() {
    let backend = Arc::new(ScriptedBackend::new().with_fallback(|_, c| Ok(c.to_string())));
    let executor = executor_with(backend.clone());

    for (agents, input) in [
        (ids(&[]), "topic"),
        (ids(&["summary"]), ""),
        (ids(&["summary"]), "   "),
        (ids(&["summary", ""]), "topic"),
    ] {
        let (tx, mut rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let err = executor
            .run(agents, input.to_string(), tx, CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(rx.recv().await.is_none(), "no snapshot may be emitted");
    }

    assert!(executor.start(ids(&[]), "topic".to_string()).is_err());
    assert_eq!(backend.call_count().await, 0);
}

#[tokio::test]
async fn test_running_snapshot_precedes_dispatch_result() {
    let gate = Arc::new(Semaphore::new(0));
    let backend = Arc::new(
        ScriptedBackend::new()
            .respond("summary", "done")
            .gated(gate.clone()),
    );
    let mut handle = executor_with(backend)
        .start(ids(&["summary"]), "text".to_string())
        .unwrap();

    // Observable while the backend call is still blocked
    let running = handle.snapshots.recv().await.unwrap();
    assert_eq!(statuses(&running), vec![StageStatus::Running]);
    assert!(running.stages[0].started_at.is_some());

    gate.add_permits(1);
    let finished = handle.snapshots.recv().await.unwrap();
    assert_eq!(statuses(&finished), vec![StageStatus::Succeeded]);
    assert!(handle.snapshots.recv().await.is_none());
    assert_eq!(handle.outcome.await.unwrap(), finished);
}

#[tokio::test]
async fn test_cancel_discards_in_flight_result() {
    let gate = Arc::new(Semaphore::new(0));
    let backend = Arc::new(
        ScriptedBackend::new()
            .respond("research", "facts")
            .respond("summary", "brief")
            .gated(gate.clone()),
    );
    let mut handle = executor_with(backend.clone())
        .start(ids(&["research", "summary"]), "topic".to_string())
        .unwrap();

    let first = handle.snapshots.recv().await.unwrap();
    assert_eq!(first.stages[0].status, StageStatus::Running);

    handle.cancel.cancel();
    gate.add_permits(1);

    let run = handle.outcome.await.unwrap();
    assert_eq!(run.state, RunState::Cancelled);
    assert_eq!(statuses(&run), vec![StageStatus::Pending, StageStatus::Pending]);
    assert!(run.stages[0].output.is_none());
    assert_eq!(backend.call_count().await, 1);

    // The executor leaves a final cancelled snapshot for a live receiver
    let last = handle.snapshots.recv().await.unwrap();
    assert_eq!(last.state, RunState::Cancelled);
}

#[tokio::test]
async fn test_dropping_snapshot_receiver_cancels_run() {
    let gate = Arc::new(Semaphore::new(0));
    let backend = Arc::new(
        ScriptedBackend::new()
            .respond("research", "facts")
            .respond("writer", "prose")
            .gated(gate.clone()),
    );
    let RunHandle {
        mut snapshots,
        cancel,
        outcome,
    } = executor_with(backend.clone())
        .start(ids(&["research", "writer"]), "topic".to_string())
        .unwrap();

    snapshots.recv().await.unwrap();
    drop(snapshots);
    gate.add_permits(2);

    let run = outcome.await.unwrap();
    assert_eq!(run.state, RunState::Cancelled);
    assert!(!cancel.is_cancelled());
    assert_eq!(backend.call_count().await, 1);
}

#[tokio::test]
async fn test_cancel_finishes_run_when_snapshots_are_not_drained() {
    let backend = Arc::new(
        ScriptedBackend::new().with_fallback(|_, input| Ok(format!("{input}."))),
    );
    let handle = executor_with(backend.clone())
        .start(vec!["summary".to_string(); 30], "text".to_string())
        .unwrap();

    // Let the executor fill the snapshot buffer and park on the next send
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.cancel.cancel();

    let run = tokio::time::timeout(std::time::Duration::from_secs(3), handle.outcome)
        .await
        .expect("executor should stop after cancel")
        .unwrap();

    assert_eq!(run.state, RunState::Cancelled);
    assert!(run.is_well_formed());
    assert!(backend.call_count().await < 30);
    drop(handle.snapshots);
}

#[tokio::test]
async fn test_cancel_before_run_issues_no_calls() {
    let backend = Arc::new(ScriptedBackend::new().respond("summary", "x"));
    let (handle, signal) = cancellation();
    handle.cancel();
    let (tx, mut rx) = mpsc::channel(SNAPSHOT_BUFFER);

    let run = executor_with(backend.clone())
        .run(ids(&["summary"]), "text".to_string(), tx, signal)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::Cancelled);
    assert_eq!(backend.call_count().await, 0);
    assert_eq!(rx.recv().await.unwrap().state, RunState::Cancelled);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let backend = Arc::new(ScriptedBackend::new().with_fallback(|_, c| Ok(format!("{c}!"))));
    let executor = executor_with(backend.clone());

    let (left, right) = tokio::join!(
        executor.run_to_completion(ids(&["research", "summary"]), "left".to_string()),
        executor.run_to_completion(ids(&["writer", "factcheck", "summary"]), "right".to_string()),
    );
    let (left, right) = (left.unwrap(), right.unwrap());

    assert_ne!(left.run.run_id, right.run.run_id);
    assert_eq!(left.run.final_output(), Some("left!!"));
    assert_eq!(right.run.final_output(), Some("right!!!"));
    assert_eq!(backend.call_count().await, 5);
}

#[tokio::test]
async fn test_repeated_agent_receives_its_own_previous_output() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .respond("writer", "draft one")
            .respond("writer", "draft two"),
    );
    let report = executor_with(backend.clone())
        .run_to_completion(ids(&["writer", "writer"]), "notes".to_string())
        .await
        .unwrap();

    let calls = backend.calls().await;
    assert_eq!(calls[0].user_content, "notes");
    assert_eq!(calls[1].user_content, "draft one");
    assert_eq!(report.run.final_output(), Some("draft two"));
}

fn agent_lists() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(BUILTIN_IDS.to_vec()), 1..6)
        .prop_map(|v| v.into_iter().map(String::from).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn all_successful_dispatches_complete_the_run(
        agents in agent_lists(),
        input in "[a-z]{1,12}",
    ) {
        let backend = Arc::new(FailOnCall::new(None));
        let executor = executor_with(backend.clone());
        let report = tokio_test::block_on(
            executor.run_to_completion(agents.clone(), input.clone())
        ).unwrap();

        let n = agents.len();
        prop_assert_eq!(report.run.state, RunState::Succeeded);
        prop_assert!(report.run.stages.iter().all(|s| s.status == StageStatus::Succeeded));
        let expected = format!("{}{}{}", "[".repeat(n), input, "]".repeat(n));
        prop_assert_eq!(report.run.final_output(), Some(expected.as_str()));
        prop_assert_eq!(report.run.final_output(), report.run.stages[n - 1].output.as_deref());

        // Stage i's input is exactly stage i-1's output
        let inputs = backend.inputs();
        prop_assert_eq!(&inputs[0], &input);
        for i in 1..n {
            prop_assert_eq!(Some(inputs[i].as_str()), report.run.stages[i - 1].output.as_deref());
        }

        // Two snapshots per stage, each well formed
        prop_assert_eq!(report.snapshots.len(), 2 * n);
        prop_assert!(report.snapshots.iter().all(|s| s.is_well_formed()));
    }

    #[test]
    fn failure_keeps_exactly_the_successful_prefix(
        agents in agent_lists(),
        fail_seed in any::<prop::sample::Index>(),
    ) {
        let k = fail_seed.index(agents.len());
        let backend = Arc::new(FailOnCall::new(Some(k)));
        let executor = executor_with(backend.clone());
        let report = tokio_test::block_on(
            executor.run_to_completion(agents.clone(), "seed".to_string())
        ).unwrap();

        let run = &report.run;
        prop_assert_eq!(run.state, RunState::Failed);
        for (i, stage) in run.stages.iter().enumerate() {
            let expected = match i.cmp(&k) {
                std::cmp::Ordering::Less => StageStatus::Succeeded,
                std::cmp::Ordering::Equal => StageStatus::Failed,
                std::cmp::Ordering::Greater => StageStatus::Pending,
            };
            prop_assert_eq!(stage.status, expected);
        }
        prop_assert_eq!(run.stages[k].error_kind, Some(ErrorKind::BackendError));
        prop_assert_eq!(backend.inputs().len(), k + 1);

        // Later stages never leave Pending in any snapshot
        for snapshot in &report.snapshots {
            prop_assert!(snapshot.stages[k + 1..].iter().all(|s| s.status == StageStatus::Pending));
        }
    }

    #[test]
    fn unknown_agent_halts_without_calling_backend(
        agents in agent_lists(),
        position in any::<prop::sample::Index>(),
    ) {
        let mut agents = agents;
        let k = position.index(agents.len() + 1);
        agents.insert(k, "ghost".to_string());

        let backend = Arc::new(FailOnCall::new(None));
        let executor = executor_with(backend.clone());
        let run = tokio_test::block_on(
            executor.run_to_completion(agents.clone(), "seed".to_string())
        ).unwrap().run;

        prop_assert_eq!(run.stages[k].status, StageStatus::Failed);
        prop_assert_eq!(run.stages[k].error_kind, Some(ErrorKind::UnknownAgent));
        prop_assert_eq!(run.succeeded_count(), k);
        prop_assert_eq!(backend.inputs().len(), k);
    }
}
