//! Lease - 期限付きの排他権
//!
//! holder がクラッシュしても `ttl` を過ぎれば他のプロセスが取り直せる。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub holder: String,
    /// Distinguishes two grants to the same holder.
    pub token: Ulid,
    pub acquired_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl Lease {
    pub fn new(holder: impl Into<String>, acquired_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            holder: holder.into(),
            token: Ulid::new(),
            acquired_at,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        self.acquired_at
            .checked_add_signed(chrono::Duration::milliseconds(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_ttl() {
        let t0 = Utc::now();
        let lease = Lease::new("d1", t0, Duration::from_millis(500));
        assert!(!lease.is_expired(t0));
        assert!(!lease.is_expired(t0 + chrono::Duration::milliseconds(499)));
        assert!(lease.is_expired(t0 + chrono::Duration::milliseconds(500)));
    }

    #[test]
    fn tokens_differ_per_grant() {
        let t0 = Utc::now();
        let a = Lease::new("d1", t0, Duration::from_secs(1));
        let b = Lease::new("d1", t0, Duration::from_secs(1));
        assert_ne!(a.token, b.token);
    }
}
