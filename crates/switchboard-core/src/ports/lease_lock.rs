//! LeaseLock port - 配送先リソースへのアクセスを直列化する排他ロック
//!
//! 複数の dispatcher プロセスが同じキューを見ていても、配送中のメッセージは
//! 常に高々 1 つ。ロックは lease（期限付き）なので、holder が落ちても
//! `ttl` 後には他が取り直せる。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Lease, Result};

#[async_trait]
pub trait LeaseLock: Send + Sync {
    /// Never blocks: `None` means someone else holds an unexpired lease.
    async fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<Option<Lease>>;

    /// Returns `false` if the lease had expired and was taken over meanwhile.
    async fn release(&self, lease: &Lease) -> Result<bool>;

    /// The unexpired lease, if any.
    async fn current(&self) -> Result<Option<Lease>>;
}
