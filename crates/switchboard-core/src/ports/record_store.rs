//! RecordStore port - 小さなレコードの永続化（正本）
//!
//! レコードは bucket（pending / processing / tasks ...）ごとに id で保存する。
//! 中身は不透明なバイト列で、型付けは呼び出し側（`MessageStore`, `TaskStore`）が行う。
//!
//! # 実装
//! - `FsRecordStore`: bucket = ディレクトリ、レコード = JSON ファイル
//! - `InMemoryRecordStore`: テスト用

use async_trait::async_trait;

use crate::domain::{Result, SwitchboardError};

/// RecordStore は状態の正本（source of truth）
///
/// # 設計原則
/// - 書き込みはアトミック: 読み手が書きかけのレコードを見ることはない
/// - `transfer` の途中でも、レコードは常にちょうど 1 つの bucket に見える
/// - 読み取り（`get` / `list`）はいつでも並行に呼んでよい
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create or replace a record.
    async fn put(&self, bucket: &str, id: &str, record: &[u8]) -> Result<()>;

    async fn get(&self, bucket: &str, id: &str) -> Result<Option<Vec<u8>>>;

    /// Ids in `bucket`, sorted.
    async fn list(&self, bucket: &str) -> Result<Vec<String>>;

    /// Rewrite a record with `record` and move it from `from` to `to` as one step.
    ///
    /// Fails with `NotFound` if the record is not in `from`.
    async fn transfer(&self, from: &str, to: &str, id: &str, record: &[u8]) -> Result<()>;

    /// Returns whether a record was removed.
    async fn remove(&self, bucket: &str, id: &str) -> Result<bool>;
}

/// Bucket and id names must be usable as a single path component.
pub fn validate_key(kind: &str, key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key != "."
        && key != ".."
        && !key.starts_with('.')
        && !key.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(SwitchboardError::Validation(format!(
            "invalid {kind} name {key:?}"
        )))
    }
}
