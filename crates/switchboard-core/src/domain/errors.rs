//! Errors - エラー型と分類
//!
//! すべての失敗は `ErrorKind` で運用分類される。ループ側はこの分類を見て
//! 「リトライ」「error 領域へ退避」「呼び出し元へ返す」を決める。

use thiserror::Error;

/// ErrorKind は失敗の運用分類
///
/// - Transport: 配送コールバックの失敗（retry → dead-letter）
/// - LeaseContention: lease の取り合い（一時的、呼び出し元には返さない）
/// - Validation: 不正な入力（error 領域へ退避して続行）
/// - Persistence: 永続化の失敗（操作は未完了として返す）
/// - Duplicate: dedup 済みの入力（エラーではなく無視）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    LeaseContention,
    Validation,
    Persistence,
    Duplicate,
}

#[derive(Debug, Error)]
pub enum SwitchboardError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Codec {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {id} not found in bucket {bucket}")]
    NotFound { bucket: String, id: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("duplicate record {0}")]
    Duplicate(String),

    #[error("delivery failed: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SwitchboardError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn codec(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Codec {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SwitchboardError::Io { .. }
            | SwitchboardError::NotFound { .. }
            | SwitchboardError::Config(_) => ErrorKind::Persistence,
            // A record that cannot be decoded is bad input, not a storage fault.
            SwitchboardError::Codec { .. } | SwitchboardError::Validation(_) => {
                ErrorKind::Validation
            }
            SwitchboardError::Duplicate(_) => ErrorKind::Duplicate,
            SwitchboardError::Transport(_) => ErrorKind::Transport,
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
