//! FsRecordStore - ディレクトリベースの RecordStore
//!
//! ```text
//! <root>/<bucket>/<id>.json
//! ```
//!
//! # 書き込み
//! 1. 同じディレクトリに `.<id>.<ulid>.tmp` を作って書く
//! 2. fsync
//! 3. rename で本来の名前に置き換える（同一ファイルシステム内なのでアトミック）
//!
//! `.` で始まるファイルは `list` に出てこない（書きかけの一時ファイル）。

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

use crate::domain::{Result, SwitchboardError};
use crate::ports::RecordStore;
use crate::ports::record_store::validate_key;

const EXTENSION: &str = ".json";

#[derive(Debug, Clone)]
pub struct FsRecordStore {
    root: PathBuf,
}

impl FsRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        validate_key("bucket", bucket)?;
        Ok(self.root.join(bucket))
    }

    fn record_path(&self, bucket: &str, id: &str) -> Result<PathBuf> {
        validate_key("id", id)?;
        Ok(self.bucket_dir(bucket)?.join(format!("{id}{EXTENSION}")))
    }
}

/// Write `bytes` to `dir/<id>.json` through a temp file and rename.
async fn write_atomic(dir: &Path, id: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SwitchboardError::io(format!("create {}", dir.display()), e))?;

    let target = dir.join(format!("{id}{EXTENSION}"));
    let tmp = dir.join(format!(".{id}.{}.tmp", Ulid::new()));

    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &target).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(SwitchboardError::io(
            format!("write {}", target.display()),
            e,
        ));
    }
    Ok(target)
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn put(&self, bucket: &str, id: &str, record: &[u8]) -> Result<()> {
        validate_key("id", id)?;
        let dir = self.bucket_dir(bucket)?;
        write_atomic(&dir, id, record).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.record_path(bucket, id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(SwitchboardError::io(format!("read {}", path.display()), e)),
        }
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SwitchboardError::io(format!("list {}", dir.display()), e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SwitchboardError::io(format!("list {}", dir.display()), e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(id) = name.strip_suffix(EXTENSION) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn transfer(&self, from: &str, to: &str, id: &str, record: &[u8]) -> Result<()> {
        let source = self.record_path(from, id)?;
        let target = self.record_path(to, id)?;

        let present = tokio::fs::try_exists(&source)
            .await
            .map_err(|e| SwitchboardError::io(format!("stat {}", source.display()), e))?;
        if !present {
            return Err(SwitchboardError::NotFound {
                bucket: from.to_string(),
                id: id.to_string(),
            });
        }

        // rewrite in place first so the record never shows up in `to` with stale content
        let from_dir = self.bucket_dir(from)?;
        write_atomic(&from_dir, id, record).await?;

        let to_dir = self.bucket_dir(to)?;
        tokio::fs::create_dir_all(&to_dir)
            .await
            .map_err(|e| SwitchboardError::io(format!("create {}", to_dir.display()), e))?;
        tokio::fs::rename(&source, &target).await.map_err(|e| {
            SwitchboardError::io(
                format!("move {} -> {}", source.display(), target.display()),
                e,
            )
        })
    }

    async fn remove(&self, bucket: &str, id: &str) -> Result<bool> {
        let path = self.record_path(bucket, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(SwitchboardError::io(format!("remove {}", path.display()), e)),
        }
    }
}
