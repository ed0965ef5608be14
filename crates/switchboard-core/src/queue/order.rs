//! Which pending message goes next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Message;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOrder {
    /// Oldest first; priority is stored but ignored.
    #[default]
    Fifo,
    /// Highest priority first, oldest first within a priority.
    Priority,
}

impl DispatchOrder {
    /// Pick the next message eligible at `now`.
    pub fn select<'a>(self, pending: &'a [Message], now: DateTime<Utc>) -> Option<&'a Message> {
        let due = pending.iter().filter(|m| m.is_due(now));
        match self {
            DispatchOrder::Fifo => due.min_by_key(|m| (m.created_at, m.id)),
            DispatchOrder::Priority => {
                due.min_by_key(|m| (std::cmp::Reverse(m.priority), m.created_at, m.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use chrono::Duration;
    use rstest::rstest;
    use ulid::Ulid;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn message(payload: &str, priority: i32, created: i64) -> Message {
        Message::new(
            MessageId::from(Ulid::new()),
            "A",
            "B",
            payload,
            "",
            priority,
            3,
            at(created),
        )
    }

    #[rstest]
    #[case(DispatchOrder::Fifo, "old")]
    #[case(DispatchOrder::Priority, "urgent")]
    fn picks_by_order(#[case] order: DispatchOrder, #[case] expected: &str) {
        let pending = vec![
            message("urgent", 10, 5),
            message("old", 0, 1),
            message("mid", 0, 3),
        ];

        let next = order.select(&pending, at(10)).unwrap();

        assert_eq!(next.payload, expected);
    }

    #[test]
    fn skips_messages_still_backing_off() {
        let mut waiting = message("waiting", 0, 0);
        waiting.schedule_retry(at(60));
        let ready = message("ready", 0, 5);
        let pending = vec![waiting, ready];

        assert_eq!(
            DispatchOrder::Fifo.select(&pending, at(10)).unwrap().payload,
            "ready"
        );
        assert_eq!(
            DispatchOrder::Fifo
                .select(&pending, at(10) + Duration::seconds(60))
                .unwrap()
                .payload,
            "waiting"
        );
    }

    #[test]
    fn ties_within_a_millisecond_follow_id_order() {
        let first = Message::new(
            MessageId::from(Ulid::from_parts(1, 1)),
            "A",
            "B",
            "first",
            "",
            0,
            3,
            at(0),
        );
        let second = Message::new(
            MessageId::from(Ulid::from_parts(1, 2)),
            "A",
            "B",
            "second",
            "",
            0,
            3,
            at(0),
        );
        let pending = vec![second, first];

        assert_eq!(
            DispatchOrder::Fifo.select(&pending, at(0)).unwrap().payload,
            "first"
        );
    }
}
