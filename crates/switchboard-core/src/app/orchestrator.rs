//! FsmOrchestrator - エージェントの報告をタスクの状態機械に適用する
//!
//! # structured_report の処理
//! 1. タスクの特定（上から順に）
//!    - `task_id` フィールド
//!    - `task` テキスト中の `task-<n>` 参照
//!    - 同じ intent + project の既存タスク（最新）
//!    - どれもなければ新規 ID を発行
//! 2. `classify(status)` → `Task::apply`（前進のみ、終端からは動かない）
//! 3. Evidence を追加して保存
//! 4. completed でまだ verification を出していなければ 1 回だけ出す
//!
//! freeform は数えてログに出すだけで、タスクには触らない。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::task_store::TaskStore;
use super::verification::VerificationEmitter;
use crate::domain::{
    Evidence, EvidenceKind, RawUpdate, Result, Task, TaskId, TaskState, Transition, UpdateKind,
    classify,
};
use crate::ports::{Clock, EmitOutcome, IdGenerator};

/// Result of processing one update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Freeform chatter; counted, nothing stored.
    Observed,
    Applied {
        task_id: TaskId,
        created: bool,
        transition: Transition,
        /// Set when this update caused a verification emission attempt.
        verification: Option<EmitOutcome>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub new: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    /// Not started yet (new + assigned).
    pub fn pending(&self) -> usize {
        self.new + self.assigned
    }

    fn add(&mut self, state: TaskState) {
        self.total += 1;
        match state {
            TaskState::New => self.new += 1,
            TaskState::Assigned => self.assigned += 1,
            TaskState::InProgress => self.in_progress += 1,
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
        }
    }
}

pub struct FsmOrchestrator {
    tasks: TaskStore,
    emitter: VerificationEmitter,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    observed: AtomicU64,
}

impl FsmOrchestrator {
    pub fn new(
        tasks: TaskStore,
        emitter: VerificationEmitter,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            emitter,
            ids,
            clock,
            observed: AtomicU64::new(0),
        }
    }

    /// Freeform updates seen since start.
    pub fn observed_count(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }

    pub async fn process_update(&self, update: &RawUpdate) -> Result<UpdateOutcome> {
        update.validate()?;

        if update.kind == UpdateKind::Freeform {
            self.observed.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                agent = %update.agent,
                status = %update.status,
                "freeform update observed"
            );
            return Ok(UpdateOutcome::Observed);
        }

        let (mut task, created) = self.resolve(update).await?;
        let transition = task.apply(classify(&update.status), &update.agent, update.timestamp);
        match transition {
            Transition::Applied { from, to } => tracing::info!(
                task_id = %task.task_id,
                agent = %update.agent,
                %from,
                %to,
                "task advanced"
            ),
            Transition::Rejected { from, to } => tracing::warn!(
                task_id = %task.task_id,
                agent = %update.agent,
                %from,
                %to,
                "backward transition ignored; kept as evidence"
            ),
            Transition::NoSignal(state) => tracing::debug!(
                task_id = %task.task_id,
                %state,
                status = %update.status,
                "status carried no state"
            ),
            Transition::Unchanged(_) => {}
        }

        task.append_evidence(evidence_from(update));
        self.tasks.save(&task).await?;

        // The update is applied once the task is saved. A failed emission is
        // picked up later by `emit_pending_verifications`.
        let mut verification = None;
        if task.state == TaskState::Completed && task.verified_at.is_none() {
            match self.verify(&mut task, &update.agent).await {
                Ok(outcome) => verification = Some(outcome),
                Err(e) => tracing::warn!(
                    task_id = %task.task_id,
                    error = %e,
                    "verification deferred"
                ),
            }
        }

        Ok(UpdateOutcome::Applied {
            task_id: task.task_id,
            created,
            transition,
            verification,
        })
    }

    async fn verify(&self, task: &mut Task, agent: &str) -> Result<EmitOutcome> {
        let outcome = self.emitter.emit(task, agent).await?;
        task.mark_verified(self.clock.now());
        self.tasks.save(task).await?;
        Ok(outcome)
    }

    /// Emit verifications for completed tasks whose emission failed earlier.
    ///
    /// Returns how many tasks were verified. A task that fails again stays
    /// pending for the next call.
    pub async fn emit_pending_verifications(&self) -> Result<usize> {
        let mut verified = 0;
        for mut task in self.tasks.list().await? {
            if task.state != TaskState::Completed || task.verified_at.is_some() {
                continue;
            }
            let agent = completing_agent(&task);
            match self.verify(&mut task, &agent).await {
                Ok(outcome) => {
                    tracing::info!(task_id = %task.task_id, ?outcome, "deferred verification emitted");
                    verified += 1;
                }
                Err(e) => tracing::warn!(
                    task_id = %task.task_id,
                    error = %e,
                    "verification still pending"
                ),
            }
        }
        Ok(verified)
    }

    async fn resolve(&self, update: &RawUpdate) -> Result<(Task, bool)> {
        let reference = update.task_reference();
        let intent = reference.unwrap_or_default();

        let explicit = update
            .task_id
            .clone()
            .or_else(|| reference.and_then(TaskId::find_reference));
        if let Some(id) = explicit {
            if let Some(task) = self.tasks.load(&id).await? {
                return Ok((task, false));
            }
            let intent = if intent.is_empty() { id.as_str() } else { intent };
            let task = Task::new(id.clone(), intent, update.project.clone(), update.timestamp);
            tracing::info!(task_id = %id, "task created from explicit id");
            return Ok((task, true));
        }

        if let Some(task) = self
            .tasks
            .find_by_intent(intent, update.project.as_deref())
            .await?
        {
            return Ok((task, false));
        }

        let id = self.ids.generate_task_id();
        tracing::info!(task_id = %id, intent, "task created");
        Ok((
            Task::new(id, intent, update.project.clone(), update.timestamp),
            true,
        ))
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.tasks.load(id).await
    }

    pub async fn list_tasks(&self, state: Option<TaskState>) -> Result<Vec<Task>> {
        let mut tasks = self.tasks.list().await?;
        if let Some(state) = state {
            tasks.retain(|t| t.state == state);
        }
        Ok(tasks)
    }

    pub async fn status_summary(&self) -> Result<TaskCounts> {
        let mut counts = TaskCounts::default();
        for task in self.tasks.list().await? {
            counts.add(task.state);
        }
        Ok(counts)
    }
}

/// Agent whose report completed the task; falls back to the owner.
fn completing_agent(task: &Task) -> String {
    task.evidence
        .iter()
        .find(|e| task.completed_at == Some(e.timestamp))
        .map(|e| e.agent.clone())
        .or_else(|| task.owner.clone())
        .unwrap_or_default()
}

fn evidence_from(update: &RawUpdate) -> Evidence {
    Evidence {
        kind: if update.commit_message.is_some() {
            EvidenceKind::Commit
        } else {
            EvidenceKind::Report
        },
        agent: update.agent.clone(),
        timestamp: update.timestamp,
        summary: update.summary(),
        raw: update.raw.clone(),
        commit_message: update.commit_message.clone(),
        actions: update.actions.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::impls::{InMemoryOutbox, InMemoryRecordStore};
    use crate::ports::{FixedClock, UlidGenerator};
    use crate::domain::{SwitchboardError, Verification};
    use crate::ports::Outbox;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::AtomicBool;

    /// Outbox whose writes fail while `fail` is set.
    #[derive(Default)]
    struct FailingOutbox {
        fail: AtomicBool,
        inner: InMemoryOutbox,
    }

    #[async_trait]
    impl Outbox for FailingOutbox {
        async fn emit(&self, verification: &Verification) -> Result<EmitOutcome> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SwitchboardError::io(
                    "write verification",
                    std::io::Error::other("disk full"),
                ));
            }
            self.inner.emit(verification).await
        }
    }

    struct Harness {
        outbox: Arc<InMemoryOutbox>,
        orchestrator: FsmOrchestrator,
    }

    fn harness() -> Harness {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let outbox = Arc::new(InMemoryOutbox::new());
        let orchestrator = FsmOrchestrator::new(
            TaskStore::new(Arc::new(InMemoryRecordStore::new())),
            VerificationEmitter::new(outbox.clone(), clock.clone()),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
        );
        Harness {
            outbox,
            orchestrator,
        }
    }

    fn report(agent: &str, task: &str, status: &str) -> RawUpdate {
        serde_json::from_value(serde_json::json!({
            "event": "structured_report",
            "agent": agent,
            "task": task,
            "status": status,
            "raw": format!("{agent}: {status}"),
        }))
        .unwrap()
    }

    fn applied(outcome: UpdateOutcome) -> (TaskId, bool, Transition, Option<EmitOutcome>) {
        match outcome {
            UpdateOutcome::Applied {
                task_id,
                created,
                transition,
                verification,
            } => (task_id, created, transition, verification),
            UpdateOutcome::Observed => panic!("expected an applied update"),
        }
    }

    #[tokio::test]
    async fn completed_report_creates_task_and_one_verification() {
        let h = harness();

        let outcome = h
            .orchestrator
            .process_update(&report("A1", "Implement X", "Completed - done"))
            .await
            .unwrap();

        let (task_id, created, transition, verification) = applied(outcome);
        assert!(created);
        assert!(transition.completed());
        assert_eq!(verification, Some(EmitOutcome::Written));

        let task = h.orchestrator.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.completed_at.is_some());
        assert!(task.verified_at.is_some());
        assert_eq!(task.evidence.len(), 1);

        let emitted = h.outbox.emitted().await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].task_id, task_id);
        assert_eq!(emitted[0].evidence_count, 1);
    }

    #[tokio::test]
    async fn restated_completion_does_not_emit_twice() {
        let h = harness();
        h.orchestrator
            .process_update(&report("A1", "task-5: Implement X", "done"))
            .await
            .unwrap();

        let (_, created, transition, verification) = applied(
            h.orchestrator
                .process_update(&report("A2", "task-5", "Completed, really"))
                .await
                .unwrap(),
        );

        assert!(!created);
        assert_eq!(transition, Transition::Unchanged(TaskState::Completed));
        assert_eq!(verification, None);
        assert_eq!(h.outbox.emitted().await.len(), 1);
        assert_eq!(h.orchestrator.status_summary().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn restated_intent_joins_open_task_only() {
        let h = harness();
        let (first, ..) = applied(
            h.orchestrator
                .process_update(&report("A1", "Implement X", "working"))
                .await
                .unwrap(),
        );
        let (joined, created, ..) = applied(
            h.orchestrator
                .process_update(&report("A2", "implement x", "done"))
                .await
                .unwrap(),
        );
        assert_eq!(joined, first);
        assert!(!created);

        let (next, created, transition, _) = applied(
            h.orchestrator
                .process_update(&report("A1", "Implement X", "assigned"))
                .await
                .unwrap(),
        );

        assert_ne!(next, first);
        assert!(created);
        assert!(matches!(transition, Transition::Applied { to: TaskState::Assigned, .. }));
        assert_eq!(h.orchestrator.status_summary().await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn failed_emission_keeps_update_applied_and_retries_later() {
        let outbox = Arc::new(FailingOutbox::default());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let orchestrator = FsmOrchestrator::new(
            TaskStore::new(Arc::new(InMemoryRecordStore::new())),
            VerificationEmitter::new(outbox.clone(), clock.clone()),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
        );
        outbox.fail.store(true, Ordering::SeqCst);

        let (task_id, _, transition, verification) = applied(
            orchestrator
                .process_update(&report("A1", "task-1", "done"))
                .await
                .unwrap(),
        );

        assert!(transition.completed());
        assert_eq!(verification, None);
        let task = orchestrator.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.verified_at.is_none());
        assert_eq!(task.evidence.len(), 1);

        // still failing: nothing verified, nothing lost
        assert_eq!(orchestrator.emit_pending_verifications().await.unwrap(), 0);

        outbox.fail.store(false, Ordering::SeqCst);
        assert_eq!(orchestrator.emit_pending_verifications().await.unwrap(), 1);
        assert_eq!(orchestrator.emit_pending_verifications().await.unwrap(), 0);

        let emitted = outbox.inner.emitted().await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].agent, "A1");
        let task = orchestrator.get_task(&task_id).await.unwrap().unwrap();
        assert!(task.verified_at.is_some());
    }

    #[tokio::test]
    async fn explicit_reference_in_task_text_is_used() {
        let h = harness();

        let (task_id, ..) = applied(
            h.orchestrator
                .process_update(&report("A1", "TASK-42: wire the inbox", "assigned"))
                .await
                .unwrap(),
        );
        assert_eq!(task_id.as_str(), "task-42");

        let (again, created, transition, _) = applied(
            h.orchestrator
                .process_update(&report("A1", "task-42", "working on it"))
                .await
                .unwrap(),
        );
        assert_eq!(again, task_id);
        assert!(!created);
        assert_eq!(
            transition,
            Transition::Applied {
                from: TaskState::Assigned,
                to: TaskState::InProgress
            }
        );

        let task = h.orchestrator.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.owner.as_deref(), Some("A1"));
        assert!(task.assigned_at.is_some());
        assert!(task.started_at.is_some());
        assert_eq!(task.intent, "TASK-42: wire the inbox");
    }

    #[tokio::test]
    async fn backward_report_is_kept_as_evidence_only() {
        let h = harness();
        h.orchestrator
            .process_update(&report("A1", "task-7", "done"))
            .await
            .unwrap();

        let (task_id, _, transition, _) = applied(
            h.orchestrator
                .process_update(&report("A1", "task-7", "in progress again"))
                .await
                .unwrap(),
        );

        assert_eq!(
            transition,
            Transition::Rejected {
                from: TaskState::Completed,
                to: TaskState::InProgress
            }
        );
        let task = h.orchestrator.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.evidence.len(), 2);
    }

    #[tokio::test]
    async fn unknown_status_records_evidence_without_moving() {
        let h = harness();

        let (task_id, _, transition, _) = applied(
            h.orchestrator
                .process_update(&report("A1", "Write docs", "thinking about it"))
                .await
                .unwrap(),
        );

        assert_eq!(transition, Transition::NoSignal(TaskState::New));
        let task = h.orchestrator.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.evidence.len(), 1);
        assert_eq!(h.orchestrator.status_summary().await.unwrap().pending(), 1);
    }

    #[tokio::test]
    async fn freeform_touches_nothing() {
        let h = harness();
        let update: RawUpdate = serde_json::from_value(serde_json::json!({
            "event": "freeform",
            "agent": "A1",
            "status": "lunch",
        }))
        .unwrap();

        let outcome = h.orchestrator.process_update(&update).await.unwrap();

        assert_eq!(outcome, UpdateOutcome::Observed);
        assert_eq!(h.orchestrator.observed_count(), 1);
        assert_eq!(h.orchestrator.status_summary().await.unwrap().total, 0);
        assert!(h.outbox.emitted().await.is_empty());
    }

    #[tokio::test]
    async fn report_without_task_is_a_validation_error() {
        let h = harness();
        let update: RawUpdate = serde_json::from_value(serde_json::json!({
            "event": "structured_report",
            "agent": "A1",
            "status": "done",
        }))
        .unwrap();

        let err = h.orchestrator.process_update(&update).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.orchestrator.status_summary().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn commit_message_becomes_commit_evidence() {
        let h = harness();
        let mut update = report("A1", "task-9", "working");
        update.commit_message = Some("feat: add inbox".into());
        update.timestamp = Utc::now() - Duration::minutes(1);

        let (task_id, ..) = applied(h.orchestrator.process_update(&update).await.unwrap());

        let task = h.orchestrator.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.evidence[0].kind, EvidenceKind::Commit);
        assert_eq!(task.evidence[0].summary, "working (feat: add inbox)");
        assert_eq!(task.started_at, Some(update.timestamp));
    }

    #[tokio::test]
    async fn list_tasks_filters_by_state() {
        let h = harness();
        for (task, status) in [("task-1", "done"), ("task-2", "working"), ("task-3", "done")] {
            h.orchestrator
                .process_update(&report("A1", task, status))
                .await
                .unwrap();
        }

        let done = h
            .orchestrator
            .list_tasks(Some(TaskState::Completed))
            .await
            .unwrap();
        assert_eq!(done.len(), 2);
        let counts = h.orchestrator.status_summary().await.unwrap();
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.total, 3);
    }
}
