//! Task record: lifecycle state + accumulated evidence.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classify::Classification;
use super::errors::SwitchboardError;
use super::ids::TaskId;

/// Task lifecycle state.
///
/// State transitions (forward only):
/// - New -> Assigned -> InProgress -> Completed
/// - any non-terminal state -> Failed
///
/// Steps may be skipped (New -> Completed is fine); moving back is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    New,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::New,
        TaskState::Assigned,
        TaskState::InProgress,
        TaskState::Completed,
        TaskState::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskState::New => 0,
            TaskState::Assigned => 1,
            TaskState::InProgress => 2,
            TaskState::Completed | TaskState::Failed => 3,
        }
    }

    /// Whether `self -> next` moves strictly forward.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::New => "new",
            TaskState::Assigned => "assigned",
            TaskState::InProgress => "in_progress",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = SwitchboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| SwitchboardError::Validation(format!("unknown task state {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// A status report from an agent.
    Report,
    /// A report that carried a commit message.
    Commit,
}

/// One immutable fragment of agent-reported progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

/// Result of applying a classified report to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State moved forward.
    Applied { from: TaskState, to: TaskState },
    /// Report restated the current state.
    Unchanged(TaskState),
    /// Report asked to move backward or out of a terminal state.
    Rejected { from: TaskState, to: TaskState },
    /// Status text carried no recognizable state.
    NoSignal(TaskState),
}

impl Transition {
    pub fn completed(self) -> bool {
        matches!(
            self,
            Transition::Applied {
                to: TaskState::Completed,
                ..
            }
        )
    }
}

/// Task record.
///
/// Design: same pattern as the message record. The orchestrator mutates it only
/// through the methods below and persists it after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub intent: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    pub last_update: DateTime<Utc>,
    /// Set once the verification record for this task has been written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        task_id: TaskId,
        intent: impl Into<String>,
        project: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            project,
            intent: intent.into(),
            state: TaskState::New,
            owner: None,
            created_at: now,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            failed_at: None,
            evidence: Vec::new(),
            last_update: now,
            verified_at: None,
        }
    }

    /// Apply a classified report from `agent`.
    ///
    /// Lifecycle timestamps are stamped only the first time a state is entered.
    pub fn apply(
        &mut self,
        classification: Classification,
        agent: &str,
        now: DateTime<Utc>,
    ) -> Transition {
        let from = self.state;
        let to = match classification {
            Classification::Unknown => return Transition::NoSignal(from),
            Classification::Transition(to) => to,
        };
        if to == from {
            return Transition::Unchanged(from);
        }
        if !from.can_advance_to(to) {
            return Transition::Rejected { from, to };
        }

        self.state = to;
        self.last_update = now;
        match to {
            TaskState::New => {}
            TaskState::Assigned => {
                self.assigned_at.get_or_insert(now);
                self.owner = Some(agent.to_string());
            }
            TaskState::InProgress => {
                self.started_at.get_or_insert(now);
            }
            TaskState::Completed => {
                self.completed_at.get_or_insert(now);
            }
            TaskState::Failed => {
                self.failed_at.get_or_insert(now);
            }
        }
        if self.owner.is_none() {
            self.owner = Some(agent.to_string());
        }
        Transition::Applied { from, to }
    }

    pub fn append_evidence(&mut self, evidence: Evidence) {
        self.last_update = self.last_update.max(evidence.timestamp);
        self.evidence.push(evidence);
    }

    pub fn mark_verified(&mut self, now: DateTime<Utc>) {
        self.verified_at.get_or_insert(now);
    }

    /// Distinct agents that contributed evidence, in first-seen order.
    pub fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = Vec::new();
        for e in &self.evidence {
            if !agents.contains(&e.agent) {
                agents.push(e.agent.clone());
            }
        }
        agents
    }

    /// Intent normalised for matching restated reports against existing tasks.
    pub fn normalized_intent(intent: &str) -> String {
        intent
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}
