//! VerificationEmitter - 完了したタスクの verification を outbox へ

use std::sync::Arc;

use crate::domain::{Result, Task, Verification};
use crate::ports::{Clock, EmitOutcome, Outbox};

pub struct VerificationEmitter {
    outbox: Arc<dyn Outbox>,
    clock: Arc<dyn Clock>,
}

impl VerificationEmitter {
    pub fn new(outbox: Arc<dyn Outbox>, clock: Arc<dyn Clock>) -> Self {
        Self { outbox, clock }
    }

    /// Write the verification for `task`, credited to `agent`.
    pub async fn emit(&self, task: &Task, agent: &str) -> Result<EmitOutcome> {
        let record = Verification::for_task(task, agent, self.clock.now());
        let outcome = self.outbox.emit(&record).await?;
        match outcome {
            EmitOutcome::Written => tracing::info!(
                task_id = %task.task_id,
                agent,
                evidence_count = record.evidence_count,
                "verification emitted"
            ),
            EmitOutcome::AlreadyPresent => tracing::debug!(
                task_id = %task.task_id,
                "verification already present"
            ),
        }
        Ok(outcome)
    }
}
