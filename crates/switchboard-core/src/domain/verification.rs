//! Verification record written to the outbox when a task completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::task::{Task, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Verification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationDetails {
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commit_messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub task_id: TaskId,
    pub agent: String,
    pub status: TaskState,
    pub timestamp: DateTime<Utc>,
    pub evidence_count: usize,
    pub summary: String,
    pub details: VerificationDetails,
}

impl Verification {
    /// Build the record for `task`, credited to the agent whose report completed it.
    pub fn for_task(task: &Task, agent: &str, now: DateTime<Utc>) -> Self {
        let evidence_count = task.evidence.len();
        let summary = format!(
            "{} \"{}\" {} by {} ({} evidence {})",
            task.task_id,
            task.intent,
            task.state,
            agent,
            evidence_count,
            if evidence_count == 1 { "entry" } else { "entries" },
        );
        let commit_messages = task
            .evidence
            .iter()
            .filter_map(|e| e.commit_message.clone())
            .collect();
        Self {
            record_type: RecordType::Verification,
            task_id: task.task_id.clone(),
            agent: agent.to_string(),
            status: task.state,
            timestamp: now,
            evidence_count,
            summary,
            details: VerificationDetails {
                intent: task.intent.clone(),
                project: task.project.clone(),
                started_at: task.started_at,
                completed_at: task.completed_at,
                agents: task.agents(),
                commit_messages,
            },
        }
    }
}
