//! Inbox port - エージェントの報告が届く場所
//!
//! 取り出したエントリは必ず processed か error のどちらかへ移す。
//! 「処理済みかどうか」の判定は dedup ledger が正本で、processed は保管場所にすぎない。

use async_trait::async_trait;

use crate::domain::Result;

/// One raw record as found in the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    /// Locator within the inbox (file name for `FsInbox`).
    pub name: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Inbox: Send + Sync {
    /// Entries currently waiting, oldest first.
    async fn poll(&self) -> Result<Vec<InboxEntry>>;

    async fn mark_processed(&self, entry: &InboxEntry) -> Result<()>;

    async fn mark_error(&self, entry: &InboxEntry, reason: &str) -> Result<()>;
}
