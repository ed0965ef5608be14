//! InMemoryOutbox - テスト用（emit されたものを覚えておくだけ）

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Result, Verification};
use crate::ports::{EmitOutcome, Outbox};

#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    records: Mutex<BTreeMap<String, Verification>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn emitted(&self) -> Vec<Verification> {
        self.records.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn emit(&self, verification: &Verification) -> Result<EmitOutcome> {
        let mut records = self.records.lock().await;
        let key = verification.task_id.to_string();
        if records.contains_key(&key) {
            return Ok(EmitOutcome::AlreadyPresent);
        }
        records.insert(key, verification.clone());
        Ok(EmitOutcome::Written)
    }
}
