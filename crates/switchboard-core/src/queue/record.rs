//! Message record: what is persisted in the queue buckets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MessageStatus;
use crate::domain::MessageId;

/// A unit of inter-agent communication tracked through delivery.
///
/// Design:
/// - The record is the single source of truth for its own state.
/// - All state transitions go through the methods below; the dispatcher then
///   moves the record to the bucket matching the new `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub recipient: String,
    pub payload: String,
    #[serde(default)]
    pub tag: String,
    /// Higher is more urgent. Only used for ordering under `DispatchOrder::Priority`.
    #[serde(default)]
    pub priority: i32,
    pub status: MessageStatus,

    /// Failed delivery attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,
    /// When the latest delivery attempt started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Not eligible for delivery before this instant (retry backoff).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Last delivery error (if any).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MessageId,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: impl Into<String>,
        tag: impl Into<String>,
        priority: i32,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sender: sender.into(),
            recipient: recipient.into(),
            payload: payload.into(),
            tag: tag.into(),
            priority,
            status: MessageStatus::Pending,
            retry_count: 0,
            max_retries,
            created_at: now,
            processed_at: None,
            completed_at: None,
            next_attempt_at: None,
            error: None,
        }
    }

    /// Eligible for delivery at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_runnable() && self.next_attempt_at.is_none_or(|at| at <= now)
    }

    /// Mark as processing.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Processing;
        self.processed_at = Some(now);
        self.next_attempt_at = None;
    }

    /// Mark as completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Completed;
        self.completed_at = Some(now);
    }

    /// Count one failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1).min(self.max_retries);
        self.error = Some(error.into());
    }

    /// Back to pending, not before `next_attempt_at`.
    pub fn schedule_retry(&mut self, next_attempt_at: DateTime<Utc>) {
        self.status = MessageStatus::Pending;
        self.next_attempt_at = Some(next_attempt_at);
    }

    /// Mark as dead (retry budget exhausted).
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = MessageStatus::Failed;
        let reason = reason.into();
        self.error = Some(match self.error.take() {
            Some(last) => format!("{last} ({reason})"),
            None => reason,
        });
    }

    /// Put a message stranded in `processing` by a crash back in line.
    ///
    /// The interrupted attempt is not counted against the retry budget.
    pub fn requeue_orphan(&mut self) {
        self.status = MessageStatus::Pending;
        self.next_attempt_at = None;
    }

    /// Manual resurrection of a dead-lettered message with a fresh budget.
    pub fn revive(&mut self) {
        self.status = MessageStatus::Pending;
        self.retry_count = 0;
        self.next_attempt_at = None;
        self.completed_at = None;
    }
}
