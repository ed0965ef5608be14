//! Outbox port - verification レコードの出力先
//!
//! 同じ task の verification は 1 回しか書かれない（実装側で保証する）。

use async_trait::async_trait;

use crate::domain::{Result, Verification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Written,
    /// A verification for this task was already in the outbox; nothing written.
    AlreadyPresent,
}

#[async_trait]
pub trait Outbox: Send + Sync {
    async fn emit(&self, verification: &Verification) -> Result<EmitOutcome>;
}
