//! MessageStore - Message を bucket 単位で読み書きする型付きビュー
//!
//! bucket 名 = `MessageStatus::bucket()`。レコードの `status` と置き場所の bucket は
//! 常に一致させる（`move_to` が両方を 1 ステップで更新する）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Message, MessageStatus};
use crate::codec;
use crate::domain::{MessageId, Result};
use crate::ports::RecordStore;

/// Message count per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl BucketCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

#[derive(Clone)]
pub struct MessageStore {
    records: Arc<dyn RecordStore>,
}

impl MessageStore {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    /// Store a new message in the bucket matching its status.
    pub async fn insert(&self, message: &Message) -> Result<()> {
        let bytes = codec::encode(message)?;
        self.records
            .put(message.status.bucket(), &message.id.to_string(), &bytes)
            .await
    }

    pub async fn load(&self, status: MessageStatus, id: &MessageId) -> Result<Option<Message>> {
        match self.records.get(status.bucket(), &id.to_string()).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes, "message")?)),
            None => Ok(None),
        }
    }

    /// Find a message in whichever bucket holds it.
    pub async fn locate(&self, id: &MessageId) -> Result<Option<Message>> {
        for status in MessageStatus::ALL {
            if let Some(message) = self.load(status, id).await? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// All decodable messages in a bucket, in id order.
    ///
    /// A record that fails to decode is skipped with a warning; it stays on disk
    /// for an operator to inspect.
    pub async fn list(&self, status: MessageStatus) -> Result<Vec<Message>> {
        let bucket = status.bucket();
        let ids = self.records.list(bucket).await?;
        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(bytes) = self.records.get(bucket, &id).await? else {
                // moved by another process since listing
                continue;
            };
            match codec::decode::<Message>(&bytes, "message") {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!(bucket, id = %id, error = %e, "skipping unreadable message"),
            }
        }
        Ok(messages)
    }

    pub async fn count(&self, status: MessageStatus) -> Result<usize> {
        Ok(self.records.list(status.bucket()).await?.len())
    }

    pub async fn counts(&self) -> Result<BucketCounts> {
        Ok(BucketCounts {
            pending: self.count(MessageStatus::Pending).await?,
            processing: self.count(MessageStatus::Processing).await?,
            completed: self.count(MessageStatus::Completed).await?,
            failed: self.count(MessageStatus::Failed).await?,
        })
    }

    /// Persist `message` and move it from `from` into the bucket of its current status.
    pub async fn move_to(&self, from: MessageStatus, message: &Message) -> Result<()> {
        let bytes = codec::encode(message)?;
        let id = message.id.to_string();
        if from == message.status {
            return self.records.put(from.bucket(), &id, &bytes).await;
        }
        self.records
            .transfer(from.bucket(), message.status.bucket(), &id, &bytes)
            .await
    }

    pub async fn remove(&self, status: MessageStatus, id: &MessageId) -> Result<bool> {
        self.records.remove(status.bucket(), &id.to_string()).await
    }
}
