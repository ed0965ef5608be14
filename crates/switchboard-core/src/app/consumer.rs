//! UpdateConsumer - inbox をポーリングして orchestrator へ流すループ
//!
//! # 1 エントリの扱い
//! - ledger に既にある → 重複。processed へ（元が rejected なら error へ）
//! - JSON として読めない → ledger に rejected、error へ
//! - ledger に claimed を記録 → `process_update`
//!   - 成功: ledger を applied / observed に更新、processed へ
//!   - Validation: ledger を rejected に更新、error へ（更新できなければ取り消して再試行）
//!   - それ以外（永続化失敗など）: ledger から取り消し、inbox に残して次の tick で再試行
//!
//! タスクが保存された時点で適用済み。verification の書き出しに失敗したものは
//! 毎回の poll の最初に `emit_pending_verifications` で拾い直す。
//!
//! 1 件の失敗がループを止めることはない。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::ledger::{DedupLedger, LedgerOutcome};
use super::orchestrator::{FsmOrchestrator, UpdateOutcome};
use crate::codec;
use crate::domain::{ErrorKind, RawUpdate, Result};
use crate::ports::{Inbox, InboxEntry};

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub poll_interval: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Tally of one `poll_once`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    pub processed: usize,
    pub duplicates: usize,
    pub rejected: usize,
    /// Left in the inbox after a persistence failure.
    pub deferred: usize,
    /// Verifications emitted for tasks completed by an earlier poll.
    pub verified: usize,
}

impl PollReport {
    pub fn is_empty(&self) -> bool {
        *self == PollReport::default()
    }
}

enum Handled {
    Processed,
    Duplicate,
    Rejected,
}

pub struct UpdateConsumer {
    inbox: Arc<dyn Inbox>,
    ledger: DedupLedger,
    orchestrator: Arc<FsmOrchestrator>,
    settings: ConsumerSettings,
    running: AtomicBool,
}

impl UpdateConsumer {
    pub fn new(
        inbox: Arc<dyn Inbox>,
        ledger: DedupLedger,
        orchestrator: Arc<FsmOrchestrator>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            inbox,
            ledger,
            orchestrator,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drain everything currently in the inbox once.
    pub async fn poll_once(&self) -> Result<PollReport> {
        let mut report = PollReport::default();
        match self.orchestrator.emit_pending_verifications().await {
            Ok(verified) => report.verified = verified,
            Err(e) => tracing::error!(error = %e, "pending verification sweep failed"),
        }
        for entry in self.inbox.poll().await? {
            match self.handle(&entry).await {
                Ok(Handled::Processed) => report.processed += 1,
                Ok(Handled::Duplicate) => report.duplicates += 1,
                Ok(Handled::Rejected) => report.rejected += 1,
                Err(e) => {
                    tracing::error!(
                        entry = %entry.name,
                        error = %e,
                        kind = ?e.kind(),
                        "update deferred"
                    );
                    report.deferred += 1;
                }
            }
        }
        Ok(report)
    }

    async fn handle(&self, entry: &InboxEntry) -> Result<Handled> {
        let digest = DedupLedger::digest(&entry.bytes);

        if let Some(seen) = self.ledger.lookup(&digest).await? {
            tracing::debug!(entry = %entry.name, first_seen = %seen.source, "duplicate update");
            if seen.outcome == LedgerOutcome::Rejected {
                let reason = format!("duplicate of rejected record {}", seen.source);
                self.inbox.mark_error(entry, &reason).await?;
            } else {
                self.inbox.mark_processed(entry).await?;
            }
            return Ok(Handled::Duplicate);
        }

        let update = match codec::decode::<RawUpdate>(&entry.bytes, "inbox record") {
            Ok(update) => update,
            Err(e) => return self.reject(entry, &digest, &e.to_string()).await,
        };

        let mut claim = self
            .ledger
            .record(&digest, &entry.name, LedgerOutcome::Claimed)
            .await?;

        match self.orchestrator.process_update(&update).await {
            Ok(outcome) => {
                match outcome {
                    UpdateOutcome::Observed => claim.outcome = LedgerOutcome::Observed,
                    UpdateOutcome::Applied { task_id, .. } => {
                        claim.outcome = LedgerOutcome::Applied;
                        claim.task_id = Some(task_id);
                    }
                }
                if let Err(e) = self.ledger.write(&claim).await {
                    // claim alone still blocks reprocessing
                    tracing::warn!(entry = %entry.name, error = %e, "ledger outcome not recorded");
                }
                self.inbox.mark_processed(entry).await?;
                Ok(Handled::Processed)
            }
            Err(e) if e.kind() == ErrorKind::Validation => {
                claim.outcome = LedgerOutcome::Rejected;
                claim.reason = Some(e.to_string());
                if let Err(write) = self.ledger.write(&claim).await {
                    // a bare claim would archive the next copy as processed
                    self.withdraw(entry, &digest).await;
                    return Err(write);
                }
                tracing::warn!(entry = %entry.name, agent = %update.agent, error = %e, "update rejected");
                self.inbox.mark_error(entry, &e.to_string()).await?;
                Ok(Handled::Rejected)
            }
            Err(e) => {
                self.withdraw(entry, &digest).await;
                Err(e)
            }
        }
    }

    async fn withdraw(&self, entry: &InboxEntry, digest: &str) {
        if let Err(undo) = self.ledger.withdraw(digest).await {
            tracing::error!(entry = %entry.name, error = %undo, "ledger claim not withdrawn");
        }
    }

    async fn reject(&self, entry: &InboxEntry, digest: &str, reason: &str) -> Result<Handled> {
        let mut claim = self
            .ledger
            .record(digest, &entry.name, LedgerOutcome::Rejected)
            .await?;
        claim.reason = Some(reason.to_string());
        if let Err(e) = self.ledger.write(&claim).await {
            tracing::warn!(entry = %entry.name, error = %e, "rejection reason not recorded");
        }
        tracing::warn!(entry = %entry.name, reason, "malformed update rejected");
        self.inbox.mark_error(entry, reason).await?;
        Ok(Handled::Rejected)
    }

    /// Poll until `shutdown` flips. Sleeping between polls is cut short by the signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "update consumer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(report) if report.is_empty() => {}
                Ok(report) => tracing::info!(
                    processed = report.processed,
                    verified = report.verified,
                    duplicates = report.duplicates,
                    rejected = report.rejected,
                    deferred = report.deferred,
                    "inbox polled"
                ),
                Err(e) => tracing::error!(error = %e, "inbox poll failed"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("update consumer stopped");
    }
}
