//! InMemoryRecordStore - テスト用の正本
//!
//! 全 bucket を 1 つの Mutex で守るので、`transfer` は自明にアトミック。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Result, SwitchboardError};
use crate::ports::RecordStore;
use crate::ports::record_store::validate_key;

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, bucket: &str, id: &str, record: &[u8]) -> Result<()> {
        validate_key("bucket", bucket)?;
        validate_key("id", id)?;
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(id.to_string(), record.to_vec());
        Ok(())
    }

    async fn get(&self, bucket: &str, id: &str) -> Result<Option<Vec<u8>>> {
        let buckets = self.buckets.lock().await;
        Ok(buckets.get(bucket).and_then(|b| b.get(id)).cloned())
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let buckets = self.buckets.lock().await;
        Ok(buckets
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn transfer(&self, from: &str, to: &str, id: &str, record: &[u8]) -> Result<()> {
        validate_key("bucket", to)?;
        let mut buckets = self.buckets.lock().await;
        let removed = buckets.get_mut(from).and_then(|b| b.remove(id));
        if removed.is_none() {
            return Err(SwitchboardError::NotFound {
                bucket: from.to_string(),
                id: id.to_string(),
            });
        }
        buckets
            .entry(to.to_string())
            .or_default()
            .insert(id.to_string(), record.to_vec());
        Ok(())
    }

    async fn remove(&self, bucket: &str, id: &str) -> Result<bool> {
        let mut buckets = self.buckets.lock().await;
        Ok(buckets
            .get_mut(bucket)
            .and_then(|b| b.remove(id))
            .is_some())
    }
}
