//! Inbox record: what an agent writes when it reports activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{Result, SwitchboardError};
use super::ids::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Unstructured chatter; observed, never applied to a task.
    Freeform,
    #[serde(alias = "report")]
    StructuredReport,
}

/// One agent report as found in the inbox.
///
/// ```json
/// {"event": "structured_report", "agent": "A1", "task": "Implement X",
///  "status": "Completed - done", "timestamp": "2024-05-01T10:00:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawUpdate {
    #[serde(rename = "event")]
    pub kind: UpdateKind,
    pub agent: String,
    /// Task reference: an explicit `task-<n>` id or the intent text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Explicit id issued by the producer; preferred over `task`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub raw: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl RawUpdate {
    /// Reject reports the orchestrator cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.agent.trim().is_empty() {
            return Err(SwitchboardError::Validation("update has no agent".into()));
        }
        if self.kind == UpdateKind::StructuredReport
            && self.task_id.is_none()
            && self.task_reference().is_none()
        {
            return Err(SwitchboardError::Validation(format!(
                "structured report from {} has no task reference",
                self.agent
            )));
        }
        Ok(())
    }

    /// Non-blank `task` text, if any.
    pub fn task_reference(&self) -> Option<&str> {
        self.task.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// One-line summary used for evidence and logs.
    pub fn summary(&self) -> String {
        let status = self.status.trim();
        match (status.is_empty(), self.commit_message.as_deref()) {
            (false, Some(commit)) => format!("{status} ({commit})"),
            (false, None) => status.to_string(),
            (true, Some(commit)) => commit.to_string(),
            (true, None) => "(no status)".to_string(),
        }
    }
}
