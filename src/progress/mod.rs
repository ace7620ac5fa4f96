//! Read-only views over pipeline snapshots
//!
//! `StatusBoard` renders one chip per stage; `ConversationLog` renders the
//! chat transcript. Both are rebuilt from a `PipelineRun` snapshot and hold
//! no state of their own.

use crate::catalog::AgentCatalog;
use crate::pipeline::{PipelineRun, StageStatus};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipState {
    Pending,
    Processing,
    Done,
    Error,
}

impl From<StageStatus> for ChipState {
    fn from(status: StageStatus) -> Self {
        match status {
            StageStatus::Pending => ChipState::Pending,
            StageStatus::Running => ChipState::Processing,
            StageStatus::Succeeded => ChipState::Done,
            StageStatus::Failed => ChipState::Error,
        }
    }
}

impl fmt::Display for ChipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChipState::Pending => "pending",
            ChipState::Processing => "processing",
            ChipState::Done => "done",
            ChipState::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChip {
    pub agent_id: String,
    pub name: String,
    pub icon: String,
    pub state: ChipState,
}

impl fmt::Display for StatusChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.icon.is_empty() {
            write!(f, "{} [{}]", self.name, self.state)
        } else {
            write!(f, "{} {} [{}]", self.icon, self.name, self.state)
        }
    }
}

/// Pipeline status chips in stage order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBoard {
    pub chips: Vec<StatusChip>,
}

impl StatusBoard {
    pub fn project(run: &PipelineRun, catalog: &AgentCatalog) -> Self {
        let chips = run
            .stages
            .iter()
            .map(|stage| {
                let profile = catalog.lookup(&stage.agent_id);
                StatusChip {
                    agent_id: stage.agent_id.clone(),
                    name: profile
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| stage.agent_id.clone()),
                    icon: profile.map(|p| p.icon.clone()).unwrap_or_default(),
                    state: stage.status.into(),
                }
            })
            .collect();
        Self { chips }
    }
}

impl fmt::Display for StatusBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chip) in self.chips.iter().enumerate() {
            if i > 0 {
                f.write_str(" → ")?;
            }
            write!(f, "{chip}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Agent display name for assistant messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// User prompt followed by one assistant message per succeeded stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationLog {
    pub messages: Vec<ConversationMessage>,
}

impl ConversationLog {
    pub fn project(run: &PipelineRun, catalog: &AgentCatalog) -> Self {
        let user = ConversationMessage {
            role: Role::User,
            content: run.initial_input.clone(),
            agent: None,
        };
        let replies = run
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Succeeded)
            .filter_map(|stage| {
                let content = stage.output.clone()?;
                let name = catalog
                    .lookup(&stage.agent_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| stage.agent_id.clone());
                Some(ConversationMessage {
                    role: Role::Assistant,
                    content,
                    agent: Some(name),
                })
            });

        Self {
            messages: std::iter::once(user).chain(replies).collect(),
        }
    }
}

impl fmt::Display for ConversationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.messages {
            match (&message.role, &message.agent) {
                (Role::Assistant, Some(agent)) => writeln!(f, "[{agent}]")?,
                (Role::User, _) => writeln!(f, "[you]")?,
                _ => {}
            }
            writeln!(f, "{}", message.content)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
