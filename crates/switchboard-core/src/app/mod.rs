//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **QueueDispatcher**: lease 付きの直列配送ループ
//! - **UpdateConsumer**: inbox のポーリング（dedup ledger 付き）
//! - **FsmOrchestrator**: 報告 → タスク状態機械 → verification
//! - **StatusReporter**: 読み取り専用の集計
//! - **Runtime** / **LoopHandle**: ループの起動と停止

pub mod builder;
pub mod consumer;
pub mod dispatcher;
pub mod handle;
pub mod ledger;
pub mod orchestrator;
pub mod runtime;
pub mod status;
pub mod task_store;
pub mod verification;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::consumer::{ConsumerSettings, PollReport, UpdateConsumer};
pub use self::dispatcher::{
    DeliveryOutcome, DispatcherSettings, DispatcherStatus, QueueDispatcher, Tick,
};
pub use self::handle::LoopHandle;
pub use self::ledger::{DedupLedger, LedgerEntry, LedgerOutcome};
pub use self::orchestrator::{FsmOrchestrator, TaskCounts, UpdateOutcome};
pub use self::runtime::Runtime;
pub use self::status::{StatusReport, StatusReporter};
pub use self::task_store::TaskStore;
pub use self::verification::VerificationEmitter;
