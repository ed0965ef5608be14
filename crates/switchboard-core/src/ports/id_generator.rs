//! IdGenerator port - ID 生成の抽象化
//!
//! メッセージ ID は ULID。同じミリ秒内でも単調増加するので、
//! ID の順序 = enqueue の順序（FIFO の tie-break に使う）。
//!
//! # 実装
//! - **UlidGenerator**: Clock ベースの単調 ULID

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::{MessageId, TaskId};
use crate::ports::Clock;

/// # Thread Safety
/// - `Send + Sync` を要求（dispatcher / consumer の両方から使う）
pub trait IdGenerator: Send + Sync {
    fn generate_message_id(&self) -> MessageId;

    /// Id for a task that arrived without any usable reference.
    fn generate_task_id(&self) -> TaskId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock から時刻を取るので、FixedClock を使えば timestamp 部分は決定的になる。
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
    monotonic: Mutex<Generator>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            monotonic: Mutex::new(Generator::new()),
        }
    }

    fn next(&self) -> Ulid {
        let now = self.clock.now();
        let mut generator = self
            .monotonic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match generator.generate_from_datetime(SystemTime::from(now)) {
            Ok(ulid) => ulid,
            // random part overflowed within one millisecond
            Err(_) => Ulid::from_parts(now.timestamp_millis() as u64, rand::random()),
        }
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_message_id(&self) -> MessageId {
        MessageId::from(self.next())
    }

    fn generate_task_id(&self) -> TaskId {
        TaskId::synthesized(self.next())
    }
}
