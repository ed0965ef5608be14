//! InMemoryLeaseLock - テスト用の lease（期限は Clock で判定）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Lease, Result};
use crate::ports::{Clock, LeaseLock};

pub struct InMemoryLeaseLock {
    held: Mutex<Option<Lease>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLeaseLock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            held: Mutex::new(None),
            clock,
        }
    }
}

#[async_trait]
impl LeaseLock for InMemoryLeaseLock {
    async fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<Option<Lease>> {
        let now = self.clock.now();
        let mut held = self.held.lock().await;
        if held.as_ref().is_some_and(|l| !l.is_expired(now)) {
            return Ok(None);
        }
        let lease = Lease::new(holder, now, ttl);
        *held = Some(lease.clone());
        Ok(Some(lease))
    }

    async fn release(&self, lease: &Lease) -> Result<bool> {
        let mut held = self.held.lock().await;
        if held.as_ref().is_some_and(|l| l.token == lease.token) {
            *held = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn current(&self) -> Result<Option<Lease>> {
        let now = self.clock.now();
        let held = self.held.lock().await;
        Ok(held.clone().filter(|l| !l.is_expired(now)))
    }
}
