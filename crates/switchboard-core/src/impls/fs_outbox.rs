//! FsOutbox - `verification-<task_id>.json` を書き出す
//!
//! 一時ファイルを書いてから `hard_link` で本来の名前を作る。
//! 名前が既にあれば link が失敗するので、同じ task の verification は 1 回だけ。

use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ulid::Ulid;

use crate::codec;
use crate::domain::{Result, SwitchboardError, TaskId, Verification};
use crate::ports::{EmitOutcome, Outbox};

#[derive(Debug, Clone)]
pub struct FsOutbox {
    root: PathBuf,
}

impl FsOutbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_path(&self, task_id: &TaskId) -> PathBuf {
        self.root.join(format!("verification-{task_id}.json"))
    }
}

fn emit_blocking(root: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<EmitOutcome> {
    fs::create_dir_all(root)?;
    let tmp = root.join(format!(".verification.{}.tmp", Ulid::new()));

    let linked = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::hard_link(&tmp, target)
    })();
    let _ = fs::remove_file(&tmp);

    match linked {
        Ok(()) => Ok(EmitOutcome::Written),
        Err(e) if e.kind() == IoErrorKind::AlreadyExists => Ok(EmitOutcome::AlreadyPresent),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl Outbox for FsOutbox {
    async fn emit(&self, verification: &Verification) -> Result<EmitOutcome> {
        let bytes = codec::encode(verification)?;
        let root = self.root.clone();
        let target = self.record_path(&verification.task_id);

        let context = format!("write {}", target.display());
        tokio::task::spawn_blocking(move || emit_blocking(&root, &target, &bytes))
            .await
            .map_err(|e| SwitchboardError::io(context.clone(), std::io::Error::other(e)))?
            .map_err(|e| SwitchboardError::io(context, e))
    }
}
