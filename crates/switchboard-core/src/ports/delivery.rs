//! Deliverer port - メッセージを実際にエージェントへ届ける副作用
//!
//! 配送手段（UI 自動化、パイプ、HTTP ...）はこのクレートの外側。
//! dispatcher は lease を持った状態で `deliver` を 1 件ずつ呼ぶだけ。

use async_trait::async_trait;
use thiserror::Error;

use crate::queue::Message;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeliveryError(String);

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Adapts a plain closure into a `Deliverer`.
///
/// ```ignore
/// let deliverer = FnDeliverer::new(|m: &Message| {
///     println!("-> {}: {}", m.recipient, m.payload);
///     Ok(())
/// });
/// ```
pub struct FnDeliverer<F> {
    f: F,
}

impl<F> FnDeliverer<F>
where
    F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Deliverer for FnDeliverer<F>
where
    F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync,
{
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        (self.f)(message)
    }
}
