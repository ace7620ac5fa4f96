//! Pipeline executor
//!
//! Drives one run as a strict chain: each stage's output becomes the next
//! stage's input, and the first failure halts the run. Progress is reported
//! by sending a cloned `PipelineRun` snapshot after every transition.

use crate::dispatcher::AgentDispatcher;
use crate::error::{AgentError, AgentResult};
use crate::observability::metrics::metrics;
use crate::pipeline::stage::{PipelineRun, RunState};
use crate::pipeline_span;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Snapshot channel capacity used by `start` and `run_to_completion`
pub const SNAPSHOT_BUFFER: usize = 16;

/// Requests cancellation of a run
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace works even when every receiver is gone
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Executor side of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that is never raised
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if it never can be
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|raised| *raised).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Send a snapshot unless cancellation wins first. Returns whether it was delivered.
async fn emit(
    snapshots: &mpsc::Sender<PipelineRun>,
    cancel: &CancelSignal,
    run: &PipelineRun,
) -> bool {
    tokio::select! {
        sent = snapshots.send(run.clone()) => sent.is_ok(),
        _ = cancel.cancelled() => false,
    }
}

/// Create a linked cancel handle and signal
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

/// Terminal run plus every snapshot emitted while it executed, in order
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run: PipelineRun,
    pub snapshots: Vec<PipelineRun>,
}

/// A run executing on a background task
pub struct RunHandle {
    /// Snapshot stream; dropping it cancels the run
    pub snapshots: mpsc::Receiver<PipelineRun>,
    pub cancel: CancelHandle,
    pub outcome: JoinHandle<PipelineRun>,
}

/// Sequential pipeline driver over a shared dispatcher
#[derive(Clone)]
pub struct PipelineExecutor {
    dispatcher: Arc<AgentDispatcher>,
}

impl PipelineExecutor {
    pub fn new(dispatcher: Arc<AgentDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<AgentDispatcher> {
        &self.dispatcher
    }

    /// Check run preconditions. Nothing is created when this fails.
    pub fn validate(agent_ids: &[String], initial_input: &str) -> AgentResult<()> {
        if agent_ids.is_empty() {
            return Err(AgentError::invalid_request("agentIds must not be empty"));
        }
        if let Some(position) = agent_ids.iter().position(|id| id.trim().is_empty()) {
            return Err(AgentError::invalid_request(format!(
                "agentIds[{position}] must not be empty"
            )));
        }
        if initial_input.trim().is_empty() {
            return Err(AgentError::invalid_request("input is required"));
        }
        Ok(())
    }

    /// Execute a run, sending a snapshot after every transition.
    ///
    /// Returns `Err` only for `InvalidRequest`, before any stage exists.
    /// Stage failures and cancellation are reported in the returned run.
    /// Raising `cancel` or dropping the snapshot receiver stops the run before
    /// the next stage starts, and a result that returns after cancellation is
    /// discarded.
    pub async fn run(
        &self,
        agent_ids: Vec<String>,
        initial_input: String,
        snapshots: mpsc::Sender<PipelineRun>,
        cancel: CancelSignal,
    ) -> AgentResult<PipelineRun> {
        if let Err(e) = Self::validate(&agent_ids, &initial_input) {
            metrics().run_rejected();
            warn!(error = %e, "Rejected pipeline run");
            return Err(e);
        }

        let run = PipelineRun::new(agent_ids, initial_input);
        let span = pipeline_span!(run_id = %run.run_id, stages = run.stages.len());
        Ok(self.drive(run, snapshots, cancel).instrument(span).await)
    }

    async fn drive(
        &self,
        mut run: PipelineRun,
        snapshots: mpsc::Sender<PipelineRun>,
        cancel: CancelSignal,
    ) -> PipelineRun {
        let collector = metrics();
        collector.run_started();
        let started = Instant::now();
        info!(run_id = %run.run_id, stages = run.stages.len(), "Pipeline run started");

        let abandoned = |snapshots: &mpsc::Sender<PipelineRun>| {
            cancel.is_cancelled() || snapshots.is_closed()
        };

        loop {
            if abandoned(&snapshots) {
                run.cancel();
                break;
            }
            let Some(index) = run.start_next_stage() else {
                break;
            };
            let agent_id = run.stages[index].agent_id.clone();
            info!(run_id = %run.run_id, stage = index, agent_id = %agent_id, status = "running", "Stage started");
            if !emit(&snapshots, &cancel, &run).await {
                run.cancel();
                break;
            }

            let input = run.current_input().to_string();
            let result = self.dispatcher.dispatch(&agent_id, &input).await;

            if abandoned(&snapshots) {
                debug!(run_id = %run.run_id, stage = index, "Discarding result of cancelled stage");
                run.cancel();
                break;
            }

            match result {
                Ok(output) => {
                    run.record_success(output);
                    info!(run_id = %run.run_id, stage = index, agent_id = %agent_id, status = "succeeded", "Stage succeeded");
                }
                Err(e) => {
                    run.record_failure(&e);
                    warn!(run_id = %run.run_id, stage = index, agent_id = %agent_id, status = "failed", error = %e, "Stage failed");
                }
            }

            // An undelivered snapshot is picked up at the top of the loop
            emit(&snapshots, &cancel, &run).await;
        }

        // Final notice for an explicit cancel; a full or dropped receiver gets nothing
        if run.state == RunState::Cancelled && snapshots.try_send(run.clone()).is_err() {
            debug!(run_id = %run.run_id, "Cancelled snapshot not delivered");
        }

        let elapsed = started.elapsed();
        match run.state {
            RunState::Succeeded => collector.run_succeeded(elapsed),
            RunState::Failed => collector.run_failed(elapsed),
            RunState::Cancelled | RunState::Running => collector.run_cancelled(elapsed),
        }
        info!(
            run_id = %run.run_id,
            state = ?run.state,
            succeeded = run.succeeded_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Pipeline run finished"
        );
        run
    }

    /// Validate and spawn a run on the tokio runtime
    pub fn start(&self, agent_ids: Vec<String>, initial_input: String) -> AgentResult<RunHandle> {
        if let Err(e) = Self::validate(&agent_ids, &initial_input) {
            metrics().run_rejected();
            return Err(e);
        }

        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let (cancel, signal) = cancellation();
        let executor = self.clone();
        let outcome = tokio::spawn(async move {
            let run = PipelineRun::new(agent_ids, initial_input);
            let span = pipeline_span!(run_id = %run.run_id, stages = run.stages.len());
            executor.drive(run, tx, signal).instrument(span).await
        });

        Ok(RunHandle {
            snapshots: rx,
            cancel,
            outcome,
        })
    }

    /// Non-streaming binding: the terminal run plus the ordered snapshot log
    pub async fn run_to_completion(
        &self,
        agent_ids: Vec<String>,
        initial_input: String,
    ) -> AgentResult<PipelineReport> {
        let (tx, mut rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let collect = async move {
            let mut log = Vec::new();
            while let Some(snapshot) = rx.recv().await {
                log.push(snapshot);
            }
            log
        };

        let (result, snapshots) = tokio::join!(
            self.run(agent_ids, initial_input, tx, CancelSignal::never()),
            collect
        );

        Ok(PipelineReport {
            run: result?,
            snapshots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AgentCatalog;
    use crate::error::ErrorKind;
    use crate::pipeline::stage::StageStatus;
    use crate::testing::mocks::ScriptedBackend;

    fn executor(backend: Arc<ScriptedBackend>) -> PipelineExecutor {
        let dispatcher = AgentDispatcher::new(Arc::new(AgentCatalog::builtin().clone()), backend);
        PipelineExecutor::new(Arc::new(dispatcher))
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_validate_rejects_blank_entries() {
        assert!(PipelineExecutor::validate(&ids(&["summary"]), "text").is_ok());
        let err = PipelineExecutor::validate(&ids(&["summary", " "]), "text").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("agentIds[1]"));
    }

    #[tokio::test]
    async fn test_snapshots_follow_transitions() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .respond("research", "facts")
                .respond("summary", "brief"),
        );
        let report = executor(backend)
            .run_to_completion(ids(&["research", "summary"]), "topic".to_string())
            .await
            .unwrap();

        let statuses: Vec<Vec<StageStatus>> = report
            .snapshots
            .iter()
            .map(|s| s.stages.iter().map(|st| st.status).collect())
            .collect();
        use StageStatus::*;
        assert_eq!(
            statuses,
            vec![
                vec![Running, Pending],
                vec![Succeeded, Pending],
                vec![Succeeded, Running],
                vec![Succeeded, Succeeded],
            ]
        );
        assert!(report.snapshots.iter().all(|s| s.run_id == report.run.run_id));
        assert_eq!(report.snapshots.last(), Some(&report.run));
    }

    #[tokio::test]
    async fn test_cancel_before_start_creates_no_calls() {
        let backend = Arc::new(ScriptedBackend::new().respond("summary", "x"));
        let (tx, _rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let (handle, signal) = cancellation();
        handle.cancel();

        let run = executor(backend.clone())
            .run(ids(&["summary"]), "text".to_string(), tx, signal)
            .await
            .unwrap();

        assert_eq!(run.state, RunState::Cancelled);
        assert_eq!(run.stages[0].status, StageStatus::Pending);
        assert_eq!(backend.call_count().await, 0);
    }
}
