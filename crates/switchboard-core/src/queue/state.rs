//! Message state machine for the queue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::SwitchboardError;

/// Message state. Each state is also the name of the bucket the record lives in.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Pending (retry, until max_retries)
/// - Pending -> Processing -> Failed (retry budget exhausted)
///
/// Design note: a record exists in exactly one bucket at a time, so the bucket
/// it is found in and its `status` field always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processing,
    Completed,
    /// Dead-letter.
    Failed,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 4] = [
        MessageStatus::Pending,
        MessageStatus::Processing,
        MessageStatus::Completed,
        MessageStatus::Failed,
    ];

    pub fn bucket(self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Processing => "processing",
            MessageStatus::Completed => "completed",
            MessageStatus::Failed => "failed",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Failed)
    }

    /// Is this message eligible for delivery?
    pub fn is_runnable(self) -> bool {
        matches!(self, MessageStatus::Pending)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.bucket())
    }
}

impl FromStr for MessageStatus {
    type Err = SwitchboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        MessageStatus::ALL
            .into_iter()
            .find(|status| status.bucket() == wanted)
            .ok_or_else(|| SwitchboardError::Validation(format!("unknown bucket {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_runnable() {
        assert!(MessageStatus::Pending.is_runnable());
        assert!(!MessageStatus::Processing.is_runnable());
        assert!(MessageStatus::Completed.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
        assert!(!MessageStatus::Pending.is_terminal());
    }

    #[test]
    fn buckets_parse_back() {
        for status in MessageStatus::ALL {
            assert_eq!(status.bucket().parse::<MessageStatus>().unwrap(), status);
        }
        assert!("archive".parse::<MessageStatus>().is_err());
    }
}
