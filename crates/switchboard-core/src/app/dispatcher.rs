//! QueueDispatcher - lease を持って 1 件ずつ配送するループ
//!
//! # 1 tick の流れ
//! 1. lease を取る（取れなければ `Tick::Contended`）
//! 2. 初回のみ: processing に取り残されたメッセージを pending へ戻す
//! 3. pending から次の 1 件を選ぶ（なければ `Tick::Idle`）
//! 4. pending → processing に移してから配送
//! 5. 結果で completed / pending（retry）/ failed（dead-letter）へ移す
//! 6. lease を返す
//!
//! 配送中に panic しても失敗として扱う（`tokio::spawn` の JoinError で捕まえる）。
//!
//! 1 回の配送は `attempt_timeout` と lease の残り時間（`lease_margin` を引いたもの）の
//! 短い方で打ち切る。lease が切れた後も配送が続くことはない。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::{Lease, MessageId, Result, SwitchboardError};
use crate::ports::{Clock, Deliverer, IdGenerator, LeaseLock};
use crate::queue::{
    BucketCounts, DispatchOrder, Message, MessageStatus, MessageStore, RetryDecision, RetryPolicy,
};

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Name written into the lease file.
    pub holder_id: String,
    pub max_retries: u32,
    pub lease_ttl: Duration,
    /// Lease time a delivery attempt leaves unused for persisting its result.
    pub lease_margin: Duration,
    /// Upper bound for one delivery attempt.
    pub attempt_timeout: Duration,
    /// Pause after losing the lease race.
    pub lease_retry: Duration,
    /// Pause when nothing is due.
    pub idle: Duration,
    pub order: DispatchOrder,
    pub retry: RetryPolicy,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            holder_id: format!("dispatcher-{}", std::process::id()),
            max_retries: 3,
            lease_ttl: Duration::from_secs(30),
            lease_margin: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(20),
            lease_retry: Duration::from_millis(200),
            idle: Duration::from_millis(500),
            order: DispatchOrder::Fifo,
            retry: RetryPolicy::default(),
        }
    }
}

/// What happened to the message handled in one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Completed,
    Retrying {
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    },
    DeadLettered {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Someone else holds the lease.
    Contended,
    /// Nothing due.
    Idle,
    Delivered {
        id: MessageId,
        outcome: DeliveryOutcome,
    },
}

/// Bucket counts plus lease and loop state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherStatus {
    #[serde(flatten)]
    pub counts: BucketCounts,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_holder: Option<String>,
    pub running: bool,
}

pub struct QueueDispatcher {
    messages: MessageStore,
    lease: Arc<dyn LeaseLock>,
    deliverer: Arc<dyn Deliverer>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    settings: DispatcherSettings,
    running: AtomicBool,
    /// Orphan recovery has run since this dispatcher started.
    recovered: AtomicBool,
}

impl QueueDispatcher {
    pub fn new(
        messages: MessageStore,
        lease: Arc<dyn LeaseLock>,
        deliverer: Arc<dyn Deliverer>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            messages,
            lease,
            deliverer,
            clock,
            ids,
            settings,
            running: AtomicBool::new(false),
            recovered: AtomicBool::new(false),
        }
    }

    /// Durably queue a message; it is in `pending` when this returns.
    pub async fn enqueue(
        &self,
        sender: &str,
        recipient: &str,
        payload: &str,
        tag: &str,
        priority: i32,
    ) -> Result<MessageId> {
        if recipient.trim().is_empty() {
            return Err(SwitchboardError::Validation(
                "message has no recipient".into(),
            ));
        }
        let message = Message::new(
            self.ids.generate_message_id(),
            sender,
            recipient,
            payload,
            tag,
            priority,
            self.settings.max_retries,
            self.clock.now(),
        );
        self.messages.insert(&message).await?;
        tracing::info!(
            message_id = %message.id,
            sender,
            recipient,
            tag,
            priority,
            "message enqueued"
        );
        Ok(message.id)
    }

    /// One loop iteration. The lease is released before returning.
    pub async fn tick(&self) -> Result<Tick> {
        let Some(lease) = self
            .lease
            .try_acquire(&self.settings.holder_id, self.settings.lease_ttl)
            .await?
        else {
            tracing::trace!("lease contended");
            return Ok(Tick::Contended);
        };

        let result = self.tick_with_lease(&lease).await;
        self.release(&lease).await;
        result
    }

    async fn release(&self, lease: &Lease) {
        match self.lease.release(lease).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                holder = %lease.holder,
                "lease expired before release; delivery outlived the ttl"
            ),
            Err(e) => tracing::warn!(error = %e, "lease release failed"),
        }
    }

    async fn tick_with_lease(&self, lease: &Lease) -> Result<Tick> {
        if !self.recovered.load(Ordering::SeqCst) {
            self.requeue_orphans().await?;
            self.recovered.store(true, Ordering::SeqCst);
        }

        let pending = self.messages.list(MessageStatus::Pending).await?;
        let Some(next) = self.settings.order.select(&pending, self.clock.now()) else {
            return Ok(Tick::Idle);
        };
        let budget = self.attempt_budget(lease);
        if budget.is_zero() {
            tracing::warn!(
                holder = %lease.holder,
                "lease too close to expiry to start a delivery"
            );
            return Ok(Tick::Contended);
        }
        let message = next.clone();
        let id = message.id;
        let outcome = self.deliver_one(message, budget).await?;
        Ok(Tick::Delivered { id, outcome })
    }

    /// Move everything stranded in `processing` back to `pending`.
    ///
    /// Only called with the lease held, so nothing in `processing` can be mid-delivery.
    async fn requeue_orphans(&self) -> Result<usize> {
        let orphans = self.messages.list(MessageStatus::Processing).await?;
        for mut message in orphans.iter().cloned() {
            message.requeue_orphan();
            self.messages
                .move_to(MessageStatus::Processing, &message)
                .await?;
            tracing::warn!(
                message_id = %message.id,
                retry_count = message.retry_count,
                "requeued message interrupted mid-delivery"
            );
        }
        Ok(orphans.len())
    }

    /// Time one attempt may take under `lease`.
    fn attempt_budget(&self, lease: &Lease) -> Duration {
        let remaining = (lease.expires_at() - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        remaining
            .saturating_sub(self.settings.lease_margin)
            .min(self.settings.attempt_timeout)
    }

    async fn deliver_one(&self, mut message: Message, budget: Duration) -> Result<DeliveryOutcome> {
        let started = self.clock.now();
        message.start_attempt(started);
        self.messages
            .move_to(MessageStatus::Pending, &message)
            .await?;

        let outcome = match self.attempt(&message, budget).await {
            Ok(()) => {
                message.mark_completed(self.clock.now());
                tracing::info!(
                    message_id = %message.id,
                    recipient = %message.recipient,
                    "delivered"
                );
                DeliveryOutcome::Completed
            }
            Err(reason) => {
                message.record_failure(reason.as_str());
                match self.settings.retry.decide(&message) {
                    RetryDecision::Retry { delay, reason: why } => {
                        let delay = chrono::Duration::from_std(delay)
                            .unwrap_or(chrono::Duration::zero());
                        let next_attempt_at = self.clock.now() + delay;
                        message.schedule_retry(next_attempt_at);
                        tracing::warn!(
                            message_id = %message.id,
                            error = %reason,
                            "{why}"
                        );
                        DeliveryOutcome::Retrying {
                            retry_count: message.retry_count,
                            next_attempt_at,
                        }
                    }
                    RetryDecision::DeadLetter { reason: why } => {
                        message.mark_failed(why);
                        let error = message.error.clone().unwrap_or_default();
                        tracing::error!(
                            message_id = %message.id,
                            error = %error,
                            "dead-lettered"
                        );
                        DeliveryOutcome::DeadLettered { error }
                    }
                }
            }
        };

        if let Err(e) = self
            .messages
            .move_to(MessageStatus::Processing, &message)
            .await
        {
            // stays in processing; the next tick's recovery pass requeues it
            self.recovered.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(outcome)
    }

    async fn attempt(&self, message: &Message, budget: Duration) -> std::result::Result<(), String> {
        let deliverer = Arc::clone(&self.deliverer);
        let message = message.clone();
        let mut handle = tokio::spawn(async move { deliverer.deliver(&message).await });
        match tokio::time::timeout(budget, &mut handle).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join)) => Err(format!("delivery aborted: {join}")),
            Err(_) => {
                handle.abort();
                // wait until the delivery future is gone before giving up the lease
                let _ = handle.await;
                Err(format!("delivery timed out after {budget:?}"))
            }
        }
    }

    /// Loop over `tick` until `shutdown` flips to true (or its sender is dropped).
    ///
    /// An in-flight delivery always finishes; the signal is only observed between ticks.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(holder = %self.settings.holder_id, "dispatcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.tick().await {
                Ok(Tick::Delivered { .. }) => Duration::ZERO,
                Ok(Tick::Contended) => self.settings.lease_retry,
                Ok(Tick::Idle) => self.settings.idle,
                Err(e) => {
                    tracing::error!(error = %e, kind = ?e.kind(), "dispatch tick failed");
                    self.settings.idle
                }
            };

            if pause.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn list(&self, status: MessageStatus) -> Result<Vec<Message>> {
        self.messages.list(status).await
    }

    pub async fn get(&self, id: &MessageId) -> Result<Option<Message>> {
        self.messages.locate(id).await
    }

    /// Drop every message in a bucket. `processing` cannot be cleared.
    pub async fn clear(&self, status: MessageStatus) -> Result<usize> {
        if status == MessageStatus::Processing {
            return Err(SwitchboardError::Validation(
                "refusing to clear messages that may be mid-delivery".into(),
            ));
        }
        let mut removed = 0;
        for message in self.messages.list(status).await? {
            if self.messages.remove(status, &message.id).await? {
                removed += 1;
            }
        }
        tracing::info!(bucket = status.bucket(), removed, "bucket cleared");
        Ok(removed)
    }

    /// Give a dead-lettered message a fresh retry budget.
    pub async fn retry_failed(&self, id: &MessageId) -> Result<Message> {
        let Some(mut message) = self.messages.load(MessageStatus::Failed, id).await? else {
            return Err(SwitchboardError::NotFound {
                bucket: MessageStatus::Failed.bucket().to_string(),
                id: id.to_string(),
            });
        };
        message.revive();
        self.messages
            .move_to(MessageStatus::Failed, &message)
            .await?;
        tracing::info!(message_id = %id, "dead-lettered message requeued");
        Ok(message)
    }

    pub async fn status(&self) -> Result<DispatcherStatus> {
        let counts = self.messages.counts().await?;
        let lease = self.lease.current().await?;
        Ok(DispatcherStatus {
            counts,
            locked: lease.is_some(),
            lease_holder: lease.map(|l| l.holder),
            running: self.is_running(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryLeaseLock, InMemoryRecordStore};
    use crate::ports::{
        DeliveryError, FixedClock, FnDeliverer, RecordStore, SystemClock, UlidGenerator,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct Harness {
        clock: Arc<FixedClock>,
        lease: Arc<InMemoryLeaseLock>,
        dispatcher: QueueDispatcher,
    }

    fn harness(deliverer: Arc<dyn Deliverer>, retry: RetryPolicy) -> Harness {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let lease = Arc::new(InMemoryLeaseLock::new(clock.clone()));
        let dispatcher = QueueDispatcher::new(
            MessageStore::new(Arc::new(InMemoryRecordStore::new())),
            lease.clone(),
            deliverer,
            clock.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            DispatcherSettings {
                holder_id: "test".into(),
                retry,
                ..DispatcherSettings::default()
            },
        );
        Harness {
            clock,
            lease,
            dispatcher,
        }
    }

    fn always_ok() -> Arc<dyn Deliverer> {
        Arc::new(FnDeliverer::new(|_: &Message| Ok(())))
    }

    /// Fails the first `n` calls, then succeeds.
    fn failing(n: u32) -> (Arc<AtomicU32>, Arc<dyn Deliverer>) {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let deliverer = FnDeliverer::new(move |_: &Message| {
            let call = seen.fetch_add(1, Ordering::SeqCst);
            if call < n {
                Err(DeliveryError::new(format!("target busy ({call})")))
            } else {
                Ok(())
            }
        });
        (calls, Arc::new(deliverer))
    }

    #[tokio::test]
    async fn successful_delivery_completes_message() {
        let h = harness(always_ok(), RetryPolicy::immediate());
        let id = h
            .dispatcher
            .enqueue("A", "B", "hello", "", 0)
            .await
            .unwrap();

        let tick = h.dispatcher.tick().await.unwrap();

        assert_eq!(
            tick,
            Tick::Delivered {
                id,
                outcome: DeliveryOutcome::Completed
            }
        );
        let status = h.dispatcher.status().await.unwrap();
        assert_eq!(status.counts.completed, 1);
        assert_eq!(status.counts.pending, 0);
        assert!(!status.locked);
        assert_eq!(h.dispatcher.tick().await.unwrap(), Tick::Idle);
    }

    #[tokio::test]
    async fn three_failures_dead_letter_with_three_retries() {
        let (calls, deliverer) = failing(3);
        let h = harness(deliverer, RetryPolicy::immediate());
        let id = h
            .dispatcher
            .enqueue("A", "B", "hello", "", 0)
            .await
            .unwrap();

        for expected in 1..=2 {
            match h.dispatcher.tick().await.unwrap() {
                Tick::Delivered {
                    outcome: DeliveryOutcome::Retrying { retry_count, .. },
                    ..
                } => assert_eq!(retry_count, expected),
                other => panic!("unexpected tick {other:?}"),
            }
        }
        assert!(matches!(
            h.dispatcher.tick().await.unwrap(),
            Tick::Delivered {
                outcome: DeliveryOutcome::DeadLettered { .. },
                ..
            }
        ));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let failed = h.dispatcher.get(&id).await.unwrap().unwrap();
        assert_eq!(failed.status, MessageStatus::Failed);
        assert_eq!(failed.retry_count, 3);
        assert!(failed.error.unwrap().contains("target busy (2)"));
        assert_eq!(h.dispatcher.tick().await.unwrap(), Tick::Idle);
    }

    #[tokio::test]
    async fn backoff_holds_message_until_due() {
        let (_calls, deliverer) = failing(1);
        let h = harness(
            deliverer,
            RetryPolicy::new(Duration::from_secs(5), 2.0, Duration::from_secs(60)),
        );
        h.dispatcher.enqueue("A", "B", "x", "", 0).await.unwrap();

        assert!(matches!(
            h.dispatcher.tick().await.unwrap(),
            Tick::Delivered {
                outcome: DeliveryOutcome::Retrying { .. },
                ..
            }
        ));
        assert_eq!(h.dispatcher.tick().await.unwrap(), Tick::Idle);

        h.clock.advance(chrono::Duration::seconds(5));
        assert!(matches!(
            h.dispatcher.tick().await.unwrap(),
            Tick::Delivered {
                outcome: DeliveryOutcome::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn panicking_deliverer_counts_as_failure() {
        let deliverer = FnDeliverer::new(|_: &Message| -> std::result::Result<(), DeliveryError> {
            panic!("ui automation crashed")
        });
        let h = harness(Arc::new(deliverer), RetryPolicy::immediate());
        h.dispatcher.enqueue("A", "B", "x", "", 0).await.unwrap();

        let tick = h.dispatcher.tick().await.unwrap();

        assert!(matches!(
            tick,
            Tick::Delivered {
                outcome: DeliveryOutcome::Retrying { retry_count: 1, .. },
                ..
            }
        ));
        let status = h.dispatcher.status().await.unwrap();
        assert_eq!(status.counts.pending, 1);
        assert!(!status.locked);
    }

    #[tokio::test]
    async fn contended_lease_delivers_nothing() {
        let h = harness(always_ok(), RetryPolicy::immediate());
        h.dispatcher.enqueue("A", "B", "x", "", 0).await.unwrap();
        let other = h
            .lease
            .try_acquire("someone-else", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.dispatcher.tick().await.unwrap(), Tick::Contended);
        assert!(h.dispatcher.status().await.unwrap().locked);

        h.lease.release(&other).await.unwrap();
        assert!(matches!(
            h.dispatcher.tick().await.unwrap(),
            Tick::Delivered { .. }
        ));
    }

    #[tokio::test]
    async fn orphans_are_requeued_before_first_delivery() {
        let h = harness(always_ok(), RetryPolicy::immediate());
        let id = h.dispatcher.enqueue("A", "B", "x", "", 0).await.unwrap();
        // simulate a crash mid-delivery
        let mut stranded = h.dispatcher.get(&id).await.unwrap().unwrap();
        stranded.start_attempt(h.clock.now());
        h.dispatcher
            .messages
            .move_to(MessageStatus::Pending, &stranded)
            .await
            .unwrap();

        let tick = h.dispatcher.tick().await.unwrap();

        assert_eq!(
            tick,
            Tick::Delivered {
                id,
                outcome: DeliveryOutcome::Completed
            }
        );
        assert_eq!(h.dispatcher.status().await.unwrap().counts.processing, 0);
    }

    #[derive(Default)]
    struct SlowDeliverer {
        calls: AtomicU32,
        active: AtomicU32,
        peak: AtomicU32,
    }

    struct Active<'a>(&'a AtomicU32);

    impl Drop for Active<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Deliverer for SlowDeliverer {
        async fn deliver(&self, _message: &Message) -> std::result::Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _active = Active(&self.active);
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivery_ends_before_the_lease_so_dispatchers_never_overlap() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let lease = Arc::new(InMemoryLeaseLock::new(clock.clone()));
        let records: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let slow = Arc::new(SlowDeliverer::default());
        let dispatcher = |holder: &str| {
            QueueDispatcher::new(
                MessageStore::new(records.clone()),
                lease.clone(),
                slow.clone(),
                clock.clone(),
                Arc::new(UlidGenerator::new(clock.clone())),
                DispatcherSettings {
                    holder_id: holder.into(),
                    lease_ttl: Duration::from_millis(300),
                    lease_margin: Duration::from_millis(100),
                    retry: RetryPolicy::immediate(),
                    ..DispatcherSettings::default()
                },
            )
        };
        let a = Arc::new(dispatcher("a"));
        let b = dispatcher("b");
        let id = a.enqueue("A", "B", "slow", "", 0).await.unwrap();

        let first = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.tick().await })
        };
        while slow.active.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // b keeps competing well past a's lease expiry
        let until = tokio::time::Instant::now() + Duration::from_millis(700);
        while tokio::time::Instant::now() < until {
            let _ = b.tick().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let first = first.await.unwrap().unwrap();
        assert!(matches!(
            first,
            Tick::Delivered {
                outcome: DeliveryOutcome::Retrying { .. },
                ..
            }
        ));
        assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
        assert!(slow.calls.load(Ordering::SeqCst) >= 2);
        let message = a.get(&id).await.unwrap().unwrap();
        assert!(message.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn retry_failed_revives_dead_letter() {
        let (_calls, deliverer) = failing(1);
        let h = harness(deliverer, RetryPolicy::immediate());
        let id = h.dispatcher.enqueue("A", "B", "x", "", 0).await.unwrap();
        let mut dead = h.dispatcher.get(&id).await.unwrap().unwrap();
        dead.record_failure("gone");
        dead.mark_failed("manual");
        h.dispatcher
            .messages
            .move_to(MessageStatus::Pending, &dead)
            .await
            .unwrap();

        let revived = h.dispatcher.retry_failed(&id).await.unwrap();

        assert_eq!(revived.status, MessageStatus::Pending);
        assert_eq!(revived.retry_count, 0);
        assert!(h.dispatcher.retry_failed(&id).await.is_err());
    }

    #[tokio::test]
    async fn clear_refuses_processing_bucket() {
        let h = harness(always_ok(), RetryPolicy::immediate());
        h.dispatcher.enqueue("A", "B", "x", "", 0).await.unwrap();
        h.dispatcher.tick().await.unwrap();

        assert!(h.dispatcher.clear(MessageStatus::Processing).await.is_err());
        assert_eq!(
            h.dispatcher.clear(MessageStatus::Completed).await.unwrap(),
            1
        );
        assert_eq!(h.dispatcher.status().await.unwrap().counts.total(), 0);
    }

    #[tokio::test]
    async fn run_exits_promptly_when_stopped_mid_sleep() {
        let h = harness(always_ok(), RetryPolicy::immediate());
        let dispatcher = Arc::new(QueueDispatcher::new(
            MessageStore::new(Arc::new(InMemoryRecordStore::new())),
            h.lease.clone(),
            always_ok(),
            h.clock.clone(),
            Arc::new(UlidGenerator::new(h.clock.clone())),
            DispatcherSettings {
                idle: Duration::from_secs(3600),
                ..DispatcherSettings::default()
            },
        ));
        let (tx, rx) = watch::channel(false);
        let looping = Arc::clone(&dispatcher);
        let join = tokio::spawn(async move { looping.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dispatcher.is_running());
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .unwrap()
            .unwrap();
        assert!(!dispatcher.is_running());
    }

    #[tokio::test]
    async fn rejects_message_without_recipient() {
        let h = harness(always_ok(), RetryPolicy::immediate());
        assert!(h.dispatcher.enqueue("A", " ", "x", "", 0).await.is_err());
    }
}
