//! Queue module: message record, bucket state, retry policy, ordering and the
//! typed store over `RecordStore`.

mod order;
mod record;
mod retry;
mod state;
mod store;

pub use order::DispatchOrder;
pub use record::Message;
pub use retry::{RetryDecision, RetryPolicy};
pub use state::MessageStatus;
pub use store::{BucketCounts, MessageStore};
