//! DedupLedger - 処理済み inbox レコードの台帳（dedup の正本）
//!
//! キーはレコード本文の SHA-256。`ledger` bucket に永続化するので再起動しても残る。
//! `inbox/processed/` はただの保管場所で、dedup の判定には使わない。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec;
use crate::domain::{Result, TaskId};
use crate::ports::{Clock, RecordStore};

pub const LEDGER_BUCKET: &str = "ledger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOutcome {
    /// Recorded before processing; never replaced if processing was cut short.
    Claimed,
    Applied,
    Observed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub digest: String,
    /// Inbox file name when first seen.
    pub source: String,
    pub outcome: LedgerOutcome,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct DedupLedger {
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl DedupLedger {
    pub fn new(records: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { records, clock }
    }

    pub fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    pub async fn lookup(&self, digest: &str) -> Result<Option<LedgerEntry>> {
        match self.records.get(LEDGER_BUCKET, digest).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes, "ledger entry")?)),
            None => Ok(None),
        }
    }

    pub async fn record(
        &self,
        digest: &str,
        source: &str,
        outcome: LedgerOutcome,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry {
            digest: digest.to_string(),
            source: source.to_string(),
            outcome,
            recorded_at: self.clock.now(),
            task_id: None,
            reason: None,
        };
        self.write(&entry).await?;
        Ok(entry)
    }

    pub async fn write(&self, entry: &LedgerEntry) -> Result<()> {
        let bytes = codec::encode(entry)?;
        self.records.put(LEDGER_BUCKET, &entry.digest, &bytes).await
    }

    /// Forget a claim whose processing failed to persist.
    pub async fn withdraw(&self, digest: &str) -> Result<bool> {
        self.records.remove(LEDGER_BUCKET, digest).await
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.records.list(LEDGER_BUCKET).await?.len())
    }
}
