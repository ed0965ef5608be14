//! Status - 読み取り専用の集計
//!
//! 永続化されている状態（bucket、lease、tasks）からだけ組み立てる。
//! ループの running フラグだけはプロセス内の値。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::consumer::UpdateConsumer;
use super::dispatcher::{DispatcherStatus, QueueDispatcher};
use super::orchestrator::{FsmOrchestrator, TaskCounts};
use crate::domain::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub messages: DispatcherStatus,
    pub consumer_running: bool,
    pub tasks: TaskCounts,
    /// Freeform updates seen by this process.
    pub observed_updates: u64,
}

#[derive(Clone)]
pub struct StatusReporter {
    dispatcher: Arc<QueueDispatcher>,
    consumer: Arc<UpdateConsumer>,
    orchestrator: Arc<FsmOrchestrator>,
}

impl StatusReporter {
    pub fn new(
        dispatcher: Arc<QueueDispatcher>,
        consumer: Arc<UpdateConsumer>,
        orchestrator: Arc<FsmOrchestrator>,
    ) -> Self {
        Self {
            dispatcher,
            consumer,
            orchestrator,
        }
    }

    pub async fn report(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            messages: self.dispatcher.status().await?,
            consumer_running: self.consumer.is_running(),
            tasks: self.orchestrator.status_summary().await?,
            observed_updates: self.orchestrator.observed_count(),
        })
    }
}
