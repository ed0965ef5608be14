//! switchboard-core
//!
//! Durable, lease-serialized message delivery between agents, plus a task
//! state machine driven by the agents' own reports.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, classify, update, verification, lease, errors）
//! - **ports**: 抽象化レイヤー（RecordStore, LeaseLock, Deliverer, Inbox, Outbox, Clock, IdGenerator）
//! - **impls**: 実装（ファイルシステム / インメモリ）
//! - **queue**: Message レコード、bucket、retry、配送順
//! - **app**: dispatcher / consumer / orchestrator / status / runtime / builder
//! - **config**: `switchboard.toml`
//! - **codec**: 永続化レコードの JSON 変換

pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{App, AppBuilder};
pub use config::Config;
pub use domain::{Result, SwitchboardError};
