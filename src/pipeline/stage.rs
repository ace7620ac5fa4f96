//! Stage and run records
//!
//! A run only changes through the transition methods below, which always act
//! on the first `Pending` stage or the single `Running` stage. That keeps the
//! ordering invariant structural: every stage before the running one has
//! succeeded and every stage after it is still pending.

use crate::error::{AgentError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-stage lifecycle: `Pending → Running → Succeeded | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StageStatus {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Running)
                | (StageStatus::Running, StageStatus::Succeeded)
                | (StageStatus::Running, StageStatus::Failed)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Failed)
    }
}

/// One element of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub agent_id: String,
    pub status: StageStatus,
    /// Produced text on success, failure description on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Stage {
    fn pending(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: StageStatus::Pending,
            output: None,
            error_kind: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn advance(&mut self, next: StageStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}

/// Run-level state derived from the stage sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Running)
    }
}

/// One pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub initial_input: String,
    pub stages: Vec<Stage>,
    pub state: RunState,
}

impl PipelineRun {
    /// Fresh run with one `Pending` stage per agent id, in the given order
    pub fn new<I, S>(agent_ids: I, initial_input: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            run_id: Uuid::new_v4(),
            initial_input: initial_input.into(),
            stages: agent_ids.into_iter().map(Stage::pending).collect(),
            state: RunState::Running,
        }
    }

    /// Output of the last stage once every stage has succeeded
    pub fn final_output(&self) -> Option<&str> {
        if self.state != RunState::Succeeded {
            return None;
        }
        self.stages.last().and_then(|s| s.output.as_deref())
    }

    /// Input for the next stage to run: the latest successful output, or the initial input
    pub fn current_input(&self) -> &str {
        self.stages
            .iter()
            .rev()
            .find(|s| s.status == StageStatus::Succeeded)
            .and_then(|s| s.output.as_deref())
            .unwrap_or(&self.initial_input)
    }

    pub fn running_stage(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.status == StageStatus::Running)
    }

    /// Index and record of the failed stage, if the run halted on one
    pub fn failed_stage(&self) -> Option<(usize, &Stage)> {
        self.stages
            .iter()
            .enumerate()
            .find(|(_, s)| s.status == StageStatus::Failed)
    }

    pub fn succeeded_count(&self) -> usize {
        self.stages
            .iter()
            .take_while(|s| s.status == StageStatus::Succeeded)
            .count()
    }

    /// Mark the first pending stage `Running` and return its index.
    ///
    /// Returns `None` when the run is terminal, a stage is already running,
    /// or no pending stage remains.
    pub(crate) fn start_next_stage(&mut self) -> Option<usize> {
        if self.state.is_terminal() || self.running_stage().is_some() {
            return None;
        }
        let index = self.succeeded_count();
        let stage = self.stages.get_mut(index)?;
        if !stage.advance(StageStatus::Running) {
            return None;
        }
        stage.started_at = Some(Utc::now());
        Some(index)
    }

    /// Apply a successful output to the running stage
    pub(crate) fn record_success(&mut self, output: String) -> bool {
        let Some(index) = self.running_stage() else {
            return false;
        };
        let stage = &mut self.stages[index];
        stage.advance(StageStatus::Succeeded);
        stage.output = Some(output);
        stage.finished_at = Some(Utc::now());

        if index + 1 == self.stages.len() {
            self.state = RunState::Succeeded;
        }
        true
    }

    /// Attach a failure to the running stage and freeze the rest of the run
    pub(crate) fn record_failure(&mut self, error: &AgentError) -> bool {
        let Some(index) = self.running_stage() else {
            return false;
        };
        let stage = &mut self.stages[index];
        stage.advance(StageStatus::Failed);
        stage.output = Some(error.description());
        stage.error_kind = Some(error.kind());
        stage.finished_at = Some(Utc::now());
        self.state = RunState::Failed;
        true
    }

    /// Abandon the run. An in-flight stage goes back to `Pending` with no result applied.
    pub(crate) fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if let Some(index) = self.running_stage() {
            let stage = &mut self.stages[index];
            stage.status = StageStatus::Pending;
            stage.started_at = None;
        }
        self.state = RunState::Cancelled;
    }

    /// Check the ordering invariant: succeeded prefix, at most one running or
    /// failed stage, pending suffix.
    pub fn is_well_formed(&self) -> bool {
        let prefix = self.succeeded_count();
        // The first non-succeeded stage may be in any state; everything after it waits
        self.stages
            .iter()
            .skip(prefix + 1)
            .all(|s| s.status == StageStatus::Pending)
    }
}
