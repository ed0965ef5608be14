//! FsLeaseLock - ファイル 1 つで表現する lease
//!
//! # プロトコル
//! - 取得: `create_new` で lease ファイルを作る（既にあれば失敗 = 排他）
//! - 期限切れの lease: tombstone へ rename し、tombstone の中身が
//!   観測した期限切れ lease と一致することを確認してから作り直す
//! - rename の間に他者が新しい lease を置いていた場合は `hard_link` で元に戻す
//!   （戻し先が既にあれば失敗するので、後から来た lease を上書きしない）
//! - 中身が読めない lease ファイルは mtime が ttl より古ければ期限切れ扱い
//!
//! ファイル操作は同期 API（`create_new` / `hard_link`）なので spawn_blocking で実行する。

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::codec;
use crate::domain::{Lease, Result, SwitchboardError};
use crate::ports::{Clock, LeaseLock};

pub struct FsLeaseLock {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FsLeaseLock {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What the lease file held when we looked.
enum Observed {
    Vacant,
    Held,
    Stale(Vec<u8>),
}

fn io_err(path: &Path, what: &str, e: std::io::Error) -> SwitchboardError {
    SwitchboardError::io(format!("{what} {}", path.display()), e)
}

fn create_exclusive(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let written = file.write_all(bytes).and_then(|()| file.sync_all());
    if written.is_err() {
        let _ = fs::remove_file(path);
    }
    written
}

fn observe(path: &Path, now: DateTime<Utc>, ttl: Duration) -> Result<Observed> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Observed::Vacant),
        Err(e) => return Err(io_err(path, "read", e)),
    };

    match serde_json::from_slice::<Lease>(&bytes) {
        Ok(lease) if lease.is_expired(now) => Ok(Observed::Stale(bytes)),
        Ok(_) => Ok(Observed::Held),
        Err(_) => {
            // torn write from a crashed holder; give it one ttl before taking over
            let modified = match fs::metadata(path).and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Observed::Vacant),
                Err(e) => return Err(io_err(path, "stat", e)),
            };
            let age = now.signed_duration_since(modified).to_std().unwrap_or_default();
            if age >= ttl {
                Ok(Observed::Stale(bytes))
            } else {
                Ok(Observed::Held)
            }
        }
    }
}

/// Move the lease file aside if it still holds `expected`.
///
/// Returns `true` when the file was displaced. A different lease found in the
/// tombstone is linked back into place.
fn displace_if(path: &Path, expected: impl Fn(&[u8]) -> bool) -> Result<bool> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("lease");
    let tomb = path.with_file_name(format!("{file_name}.stale-{}", Ulid::new()));

    match fs::rename(path, &tomb) {
        Ok(()) => {}
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_err(path, "displace", e)),
    }

    let moved = fs::read(&tomb).map_err(|e| io_err(&tomb, "read", e))?;
    if expected(&moved) {
        let _ = fs::remove_file(&tomb);
        return Ok(true);
    }

    match fs::hard_link(&tomb, path) {
        Ok(()) => {}
        // someone already re-created the lease; theirs wins
        Err(e) if e.kind() == IoErrorKind::AlreadyExists => {}
        Err(e) => return Err(io_err(path, "restore", e)),
    }
    let _ = fs::remove_file(&tomb);
    Ok(false)
}

fn acquire_blocking(
    path: &Path,
    holder: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Lease>> {
    let lease = Lease::new(holder, now, ttl);
    let bytes = codec::encode(&lease)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, "create", e))?;
    }

    // one take-over attempt per call; contention is retried by the caller
    for _ in 0..2 {
        match create_exclusive(path, &bytes) {
            Ok(()) => return Ok(Some(lease)),
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_err(path, "create", e)),
        }

        match observe(path, now, ttl)? {
            Observed::Held => return Ok(None),
            // released between our create and read
            Observed::Vacant => {}
            Observed::Stale(seen) => {
                if !displace_if(path, |moved| moved == seen.as_slice())? {
                    return Ok(None);
                }
                tracing::debug!(lease = %path.display(), "took over expired lease");
            }
        }
    }
    Ok(None)
}

fn release_blocking(path: &Path, lease: &Lease) -> Result<bool> {
    displace_if(path, |moved| {
        serde_json::from_slice::<Lease>(moved)
            .map(|held| held.token == lease.token)
            .unwrap_or(false)
    })
}

fn current_blocking(path: &Path, now: DateTime<Utc>) -> Result<Option<Lease>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, "read", e)),
    };
    Ok(serde_json::from_slice::<Lease>(&bytes)
        .ok()
        .filter(|lease| !lease.is_expired(now)))
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SwitchboardError::io("lease task", std::io::Error::other(e)))?
}

#[async_trait]
impl LeaseLock for FsLeaseLock {
    async fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<Option<Lease>> {
        let path = self.path.clone();
        let holder = holder.to_string();
        let now = self.clock.now();
        blocking(move || acquire_blocking(&path, &holder, ttl, now)).await
    }

    async fn release(&self, lease: &Lease) -> Result<bool> {
        let path = self.path.clone();
        let lease = lease.clone();
        blocking(move || release_blocking(&path, &lease)).await
    }

    async fn current(&self) -> Result<Option<Lease>> {
        let path = self.path.clone();
        let now = self.clock.now();
        blocking(move || current_blocking(&path, now)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    const TTL: Duration = Duration::from_secs(30);

    fn setup() -> (tempfile::TempDir, Arc<FixedClock>, FsLeaseLock) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        ));
        let lock = FsLeaseLock::new(dir.path().join("dispatch.lease"), clock.clone());
        (dir, clock, lock)
    }

    #[tokio::test]
    async fn second_holder_is_refused_while_lease_is_live() {
        let (_dir, _clock, lock) = setup();

        let first = lock.try_acquire("d1", TTL).await.unwrap();
        assert!(first.is_some());
        assert!(lock.try_acquire("d2", TTL).await.unwrap().is_none());
        assert_eq!(lock.current().await.unwrap().unwrap().holder, "d1");
    }

    #[tokio::test]
    async fn release_frees_the_lease() {
        let (_dir, _clock, lock) = setup();

        let lease = lock.try_acquire("d1", TTL).await.unwrap().unwrap();
        assert!(lock.release(&lease).await.unwrap());
        assert!(lock.current().await.unwrap().is_none());
        assert!(lock.try_acquire("d2", TTL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let (dir, clock, lock) = setup();

        let stale = lock.try_acquire("crashed", TTL).await.unwrap().unwrap();
        clock.advance(chrono::Duration::seconds(31));

        let fresh = lock.try_acquire("d2", TTL).await.unwrap().unwrap();
        assert_eq!(fresh.holder, "d2");

        // the old holder can no longer release what it lost
        assert!(!lock.release(&stale).await.unwrap());
        assert_eq!(lock.current().await.unwrap().unwrap().token, fresh.token);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(leftovers, vec!["dispatch.lease"]);
    }

    #[tokio::test]
    async fn young_garbage_file_counts_as_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FsLeaseLock::new(
            dir.path().join("dispatch.lease"),
            Arc::new(crate::ports::SystemClock),
        );
        std::fs::write(lock.path(), b"{torn").unwrap();

        assert!(lock.try_acquire("d1", TTL).await.unwrap().is_none());
        assert!(
            lock.try_acquire("d1", Duration::ZERO)
                .await
                .unwrap()
                .is_some()
        );
    }
}
