//! Domain model (IDs, tasks, reports, verification records, leases, errors).
//!
//! Message の型は配送ライフサイクルと一体なので `queue` 側に置いている。

pub mod classify;
pub mod errors;
pub mod ids;
pub mod lease;
pub mod task;
pub mod update;
pub mod verification;

pub use self::classify::{Classification, classify};
pub use self::errors::{ErrorKind, Result, SwitchboardError};
pub use self::ids::{MessageId, TaskId};
pub use self::lease::Lease;
pub use self::task::{Evidence, EvidenceKind, Task, TaskState, Transition};
pub use self::update::{RawUpdate, UpdateKind};
pub use self::verification::{Verification, VerificationDetails};
