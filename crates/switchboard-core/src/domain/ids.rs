//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! Message の ID は ULID を使う。先頭が timestamp なので、生成順でソートすれば
//! そのまま enqueue 順（FIFO）になる。
//!
//! Task の ID はプロデューサが明示的に発行する文字列（`task-42` など）も
//! 受け付けるので、ULID ではなく検証済みの文字列 newtype にしている。

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use super::errors::SwitchboardError;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"msg-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のコストはゼロ。
#[repr(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

// derive だと `T: Clone` などを要求されてしまうので手で実装する
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = SwitchboardError;

    /// Accepts both the prefixed form (`msg-01J...`) and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|e| SwitchboardError::Validation(format!("invalid id {s:?}: {e}")))
    }
}

// 永続化ファイルでは Display 形式の文字列として保存する
impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Message のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Message {}

impl IdMarker for Message {
    fn prefix() -> &'static str {
        "msg-"
    }
}

/// Identifier of a queued message.
pub type MessageId = Id<Message>;

static TASK_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    // Requires at least one digit so prose like "task-based" never matches.
    Regex::new(r"(?i)\btask-[0-9a-z_]*[0-9][0-9a-z_]*\b").expect("task reference pattern")
});

/// Identifier of an orchestrated task.
///
/// Always lowercase and restricted to `[a-z0-9._-]` so it can double as a
/// record key on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, SwitchboardError> {
        let id = raw.as_ref().trim().to_ascii_lowercase();
        let valid = !id.is_empty()
            && id.len() <= 128
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(SwitchboardError::Validation(format!(
                "invalid task id {:?}",
                raw.as_ref()
            )));
        }
        Ok(Self(id))
    }

    /// Task id synthesized when a report carries no explicit reference.
    pub fn synthesized(ulid: Ulid) -> Self {
        Self(format!("task-{}", ulid.to_string().to_ascii_lowercase()))
    }

    /// Finds the first explicit `task-<n>` reference inside free text.
    pub fn find_reference(text: &str) -> Option<Self> {
        TASK_REFERENCE
            .find(text)
            .and_then(|m| Self::new(m.as_str()).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = SwitchboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TaskId::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn message_ids_display_with_prefix_and_parse_back() {
        let ulid = Ulid::new();
        let id = MessageId::from_ulid(ulid);
        let shown = id.to_string();
        assert!(shown.starts_with("msg-"));

        let parsed: MessageId = shown.parse().unwrap();
        assert_eq!(parsed, id);
        let bare: MessageId = ulid.to_string().parse().unwrap();
        assert_eq!(bare, id);
    }

    #[test]
    fn message_ids_serialize_as_strings() {
        let id = MessageId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = MessageId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = MessageId::from_ulid(Ulid::new());
        assert!(id1 < id2);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        assert_eq!(std::mem::size_of::<MessageId>(), std::mem::size_of::<Ulid>());
    }

    #[test]
    fn garbage_message_id_is_rejected() {
        assert!("msg-not-a-ulid".parse::<MessageId>().is_err());
    }

    #[rstest]
    #[case::plain("task-42", Some("task-42"))]
    #[case::embedded("Finish TASK-7b for the release", Some("task-7b"))]
    #[case::first_wins("task-1 then task-2", Some("task-1"))]
    #[case::prose("a task-based approach", None)]
    #[case::intent("Implement X", None)]
    fn finds_explicit_references(#[case] text: &str, #[case] expected: Option<&str>) {
        let found = TaskId::find_reference(text);
        assert_eq!(found.as_ref().map(TaskId::as_str), expected);
    }

    #[rstest]
    #[case("")]
    #[case("../escape")]
    #[case("a/b")]
    #[case(".hidden")]
    fn unsafe_task_ids_are_rejected(#[case] raw: &str) {
        assert!(TaskId::new(raw).is_err());
    }

    #[test]
    fn task_ids_are_normalised() {
        assert_eq!(TaskId::new("  Task-ABC1 ").unwrap().as_str(), "task-abc1");
        let synthesized = TaskId::synthesized(Ulid::new());
        assert!(synthesized.as_str().starts_with("task-"));
        assert!(TaskId::new(synthesized.as_str()).is_ok());
    }
}
