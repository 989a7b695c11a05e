//! Serialization and compression for values crossing into L2, grounded on
//! the teacher's `enterprise/cache/codec.rs` `BincodeCodec`/`EncodedData`
//! envelope, now performing real LZ4 compression above a configured size
//! threshold instead of simulating it.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, CoreResult};

/// An encoded value plus whether it was compressed, so the reader knows
/// which path to take on decode.
#[derive(Debug, Clone)]
pub struct EncodedData {
    pub bytes: Vec<u8>,
    pub compressed: bool,
}

impl EncodedData {
    pub fn compression_ratio(&self, original_len: usize) -> f64 {
        if self.bytes.is_empty() {
            return 1.0;
        }
        original_len as f64 / self.bytes.len() as f64
    }
}

/// Encodes `value` with bincode, compressing with LZ4 if the encoded form
/// exceeds `compression_threshold_bytes`.
pub fn encode<V: Serialize>(value: &V, compression_threshold_bytes: usize) -> CoreResult<EncodedData> {
    let raw = bincode::serialize(value).map_err(|_| internal())?;
    if raw.len() > compression_threshold_bytes {
        let compressed = lz4::block::compress(&raw, None, true).map_err(|_| internal())?;
        Ok(EncodedData {
            bytes: compressed,
            compressed: true,
        })
    } else {
        Ok(EncodedData {
            bytes: raw,
            compressed: false,
        })
    }
}

pub fn decode<V: DeserializeOwned>(data: &EncodedData) -> CoreResult<V> {
    let raw = if data.compressed {
        lz4::block::decompress(&data.bytes, None).map_err(|_| internal())?
    } else {
        data.bytes.clone()
    };
    bincode::deserialize(&raw).map_err(|_| internal())
}

fn internal() -> CoreError {
    CoreError::internal(uuid::Uuid::new_v4())
}
