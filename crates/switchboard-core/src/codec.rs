//! RecordCodec - レコードとバイト列の相互変換
//!
//! 永続化はすべて pretty JSON。人間が `cat` で読めることを優先する。

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{Result, SwitchboardError};

pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(record).map_err(|e| SwitchboardError::codec("encode record", e))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| SwitchboardError::codec(format!("decode {what}"), e))
}
