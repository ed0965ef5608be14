//! Impls - ports の実装
//!
//! # 本番用（ファイルシステム）
//! - **FsRecordStore**: bucket = ディレクトリ
//! - **FsLeaseLock**: exclusive-create の lease ファイル
//! - **FsInbox** / **FsOutbox**: エージェントとの受け渡しディレクトリ
//!
//! # テスト用
//! - **InMemoryRecordStore**, **InMemoryLeaseLock**, **InMemoryOutbox**

pub mod fs_inbox;
pub mod fs_lease;
pub mod fs_outbox;
pub mod fs_store;
pub mod inmem_lease;
pub mod inmem_outbox;
pub mod inmem_store;

// 主要な型を再エクスポート
pub use self::fs_inbox::FsInbox;
pub use self::fs_lease::FsLeaseLock;
pub use self::fs_outbox::FsOutbox;
pub use self::fs_store::FsRecordStore;
pub use self::inmem_lease::InMemoryLeaseLock;
pub use self::inmem_outbox::InMemoryOutbox;
pub use self::inmem_store::InMemoryRecordStore;
