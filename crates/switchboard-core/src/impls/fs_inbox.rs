//! FsInbox - ディレクトリ監視型の inbox
//!
//! ```text
//! <root>/*.json                 届いた報告
//! <root>/processed/             処理済み（保管のみ）
//! <root>/error/                 拒否したもの + <name>.reason.txt
//! ```

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use ulid::Ulid;

use crate::domain::{Result, SwitchboardError};
use crate::ports::{Inbox, InboxEntry};

const PROCESSED: &str = "processed";
const ERROR: &str = "error";

#[derive(Debug, Clone)]
pub struct FsInbox {
    root: PathBuf,
}

impl FsInbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(PROCESSED)
    }

    pub fn error_dir(&self) -> PathBuf {
        self.root.join(ERROR)
    }

    /// Move `entry` into `area`, returning where it landed.
    async fn archive(&self, entry: &InboxEntry, area: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(area)
            .await
            .map_err(|e| SwitchboardError::io(format!("create {}", area.display()), e))?;

        let source = self.root.join(&entry.name);
        let mut target = area.join(&entry.name);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            // same name archived before (a duplicate); keep both
            let stem = entry.name.strip_suffix(".json").unwrap_or(&entry.name);
            target = area.join(format!("{stem}.{}.json", Ulid::new()));
        }

        tokio::fs::rename(&source, &target).await.map_err(|e| {
            SwitchboardError::io(
                format!("move {} -> {}", source.display(), target.display()),
                e,
            )
        })?;
        Ok(target)
    }
}

#[async_trait]
impl Inbox for FsInbox {
    async fn poll(&self) -> Result<Vec<InboxEntry>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SwitchboardError::io(
                    format!("scan {}", self.root.display()),
                    e,
                ));
            }
        };

        let mut found: Vec<(SystemTime, String)> = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SwitchboardError::io(format!("scan {}", self.root.display()), e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            found.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), name));
        }
        found.sort();

        let mut entries = Vec::with_capacity(found.len());
        for (_, name) in found {
            match tokio::fs::read(self.root.join(&name)).await {
                Ok(bytes) => entries.push(InboxEntry { name, bytes }),
                // picked up by someone else between scan and read
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => {
                    return Err(SwitchboardError::io(format!("read inbox/{name}"), e));
                }
            }
        }
        Ok(entries)
    }

    async fn mark_processed(&self, entry: &InboxEntry) -> Result<()> {
        self.archive(entry, &self.processed_dir()).await?;
        Ok(())
    }

    async fn mark_error(&self, entry: &InboxEntry, reason: &str) -> Result<()> {
        let target = self.archive(entry, &self.error_dir()).await?;
        let mut sidecar = target.into_os_string();
        sidecar.push(".reason.txt");
        let sidecar = PathBuf::from(sidecar);
        tokio::fs::write(&sidecar, format!("{reason}\n"))
            .await
            .map_err(|e| SwitchboardError::io(format!("write {}", sidecar.display()), e))
    }
}
