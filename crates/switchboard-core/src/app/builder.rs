//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 設定値は `build()` の時点で検証する（ループが動き出してから壊れない）
//! - Deliverer は必須。未設定なら BuildError
//! - それ以外の port は未指定ならファイルシステム実装（`Config` のパス）を使う

use std::sync::Arc;

use super::consumer::UpdateConsumer;
use super::dispatcher::QueueDispatcher;
use super::handle::LoopHandle;
use super::ledger::DedupLedger;
use super::orchestrator::FsmOrchestrator;
use super::runtime::Runtime;
use super::status::StatusReporter;
use super::task_store::TaskStore;
use super::verification::VerificationEmitter;
use crate::config::Config;
use crate::impls::{FsInbox, FsLeaseLock, FsOutbox, FsRecordStore};
use crate::ports::{
    Clock, Deliverer, IdGenerator, Inbox, LeaseLock, Outbox, RecordStore, SystemClock,
    UlidGenerator,
};
use crate::queue::MessageStore;

/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(Config::load(path)?)
///     .with_deliverer(Arc::new(my_deliverer))
///     .build()?;
/// let runtime = app.start();
/// ```
pub struct AppBuilder {
    config: Config,
    deliverer: Option<Arc<dyn Deliverer>>,
    clock: Option<Arc<dyn Clock>>,
    records: Option<Arc<dyn RecordStore>>,
    lease: Option<Arc<dyn LeaseLock>>,
    inbox: Option<Arc<dyn Inbox>>,
    outbox: Option<Arc<dyn Outbox>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No deliverer configured. Call with_deliverer() before build().")]
    MissingDeliverer,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            deliverer: None,
            clock: None,
            records: None,
            lease: None,
            inbox: None,
            outbox: None,
        }
    }

    pub fn with_deliverer(mut self, deliverer: Arc<dyn Deliverer>) -> Self {
        self.deliverer = Some(deliverer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_record_store(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_lease_lock(mut self, lease: Arc<dyn LeaseLock>) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn with_inbox(mut self, inbox: Arc<dyn Inbox>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn with_outbox(mut self, outbox: Arc<dyn Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config
            .validate()
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))?;
        let deliverer = self.deliverer.ok_or(BuildError::MissingDeliverer)?;

        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let records = self
            .records
            .unwrap_or_else(|| Arc::new(FsRecordStore::new(config.store_dir())));
        let lease = self
            .lease
            .unwrap_or_else(|| Arc::new(FsLeaseLock::new(config.lease_path(), clock.clone())));
        let inbox = self
            .inbox
            .unwrap_or_else(|| Arc::new(FsInbox::new(config.inbox_dir())));
        let outbox = self
            .outbox
            .unwrap_or_else(|| Arc::new(FsOutbox::new(config.outbox_dir())));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));

        let dispatcher = Arc::new(QueueDispatcher::new(
            MessageStore::new(records.clone()),
            lease,
            deliverer,
            clock.clone(),
            ids.clone(),
            config.dispatcher_settings(),
        ));
        let orchestrator = Arc::new(FsmOrchestrator::new(
            TaskStore::new(records.clone()),
            VerificationEmitter::new(outbox, clock.clone()),
            ids,
            clock.clone(),
        ));
        let consumer = Arc::new(UpdateConsumer::new(
            inbox,
            DedupLedger::new(records, clock),
            orchestrator.clone(),
            config.consumer_settings(),
        ));
        let status = StatusReporter::new(dispatcher.clone(), consumer.clone(), orchestrator.clone());

        Ok(App {
            config,
            dispatcher,
            consumer,
            orchestrator,
            status,
        })
    }
}

/// Wired services. Administrative calls go straight to the services;
/// `start()` spawns the two loops.
pub struct App {
    pub config: Config,
    pub dispatcher: Arc<QueueDispatcher>,
    pub consumer: Arc<UpdateConsumer>,
    pub orchestrator: Arc<FsmOrchestrator>,
    pub status: StatusReporter,
}

impl App {
    /// Spawn the dispatcher and consumer loops. Must be called inside a tokio runtime.
    pub fn start(&self) -> Runtime {
        let dispatcher = Arc::clone(&self.dispatcher);
        let consumer = Arc::clone(&self.consumer);
        Runtime::new(
            LoopHandle::spawn("dispatcher", move |rx| async move { dispatcher.run(rx).await }),
            LoopHandle::spawn("consumer", move |rx| async move { consumer.run(rx).await }),
        )
    }
}
