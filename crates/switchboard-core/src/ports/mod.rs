//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部のもの（ファイルシステム、配送先エージェント、時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - RecordStore が source of truth（正本）
//! - LeaseLock が配送の直列化を保証
//! - Deliverer の副作用はこのクレートの外側

pub mod clock;
pub mod delivery;
pub mod id_generator;
pub mod inbox;
pub mod lease_lock;
pub mod outbox;
pub mod record_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery::{Deliverer, DeliveryError, FnDeliverer};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::inbox::{Inbox, InboxEntry};
pub use self::lease_lock::LeaseLock;
pub use self::outbox::{EmitOutcome, Outbox};
pub use self::record_store::RecordStore;
