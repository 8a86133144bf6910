//! Observation codec (C3).
//!
//! Deterministic (de)serialization of an entity's ordered observation list.
//! The stored form is self-describing: a one-byte tag picks the branch on
//! read, so the codec can evolve compression independently of callers.

use crate::types::ContentBlock;

const TAG_PLAIN: u8 = 0;
const TAG_ZSTD: u8 = 1;

/// Observations are compressed only past this size — small lists cost more
/// in compressor framing than they save.
const COMPRESSION_THRESHOLD: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("corrupt observation blob: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Encode an observation list to its on-disk byte form.
pub fn encode(observations: &[ContentBlock], compression_enabled: bool) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(observations)?;
    if compression_enabled && json.len() > COMPRESSION_THRESHOLD {
        let compressed = zstd::encode_all(&json[..], 3).map_err(|e| CodecError::Compression(e.to_string()))?;
        let mut out = Vec::with_capacity(compressed.len() + 1);
        out.push(TAG_ZSTD);
        out.extend_from_slice(&compressed);
        Ok(out)
    } else {
        let mut out = Vec::with_capacity(json.len() + 1);
        out.push(TAG_PLAIN);
        out.extend_from_slice(&json);
        Ok(out)
    }
}

/// Decode a stored blob back into an observation list. Branch is selected by
/// the leading tag byte, not by the caller's `compression_enabled` setting —
/// this lets the setting flip without breaking previously-written rows.
pub fn decode(blob: &[u8]) -> Result<Vec<ContentBlock>> {
    let (tag, body) = blob.split_first().ok_or_else(|| CodecError::Corrupt("empty blob".into()))?;
    match *tag {
        TAG_PLAIN => Ok(serde_json::from_slice(body)?),
        TAG_ZSTD => {
            let json = zstd::decode_all(body).map_err(|e| CodecError::Compression(e.to_string()))?;
            Ok(serde_json::from_slice(&json)?)
        }
        other => Err(CodecError::Corrupt(format!("unknown codec tag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> Vec<ContentBlock> {
        (0..n).map(|i| ContentBlock::Text { text: format!("observation number {i} with some padding text") }).collect()
    }

    #[test]
    fn small_list_round_trips_uncompressed() {
        let obs = sample(1);
        let blob = encode(&obs, true).unwrap();
        assert_eq!(blob[0], TAG_PLAIN);
        let back = decode(&blob).unwrap();
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn large_list_compresses_when_enabled() {
        let obs = sample(20);
        let blob = encode(&obs, true).unwrap();
        assert_eq!(blob[0], TAG_ZSTD);
        let back = decode(&blob).unwrap();
        assert_eq!(back.len(), 20);
    }

    #[test]
    fn compression_disabled_stores_plain_regardless_of_size() {
        let obs = sample(20);
        let blob = encode(&obs, false).unwrap();
        assert_eq!(blob[0], TAG_PLAIN);
    }

    #[test]
    fn corrupt_blob_is_rejected() {
        let err = decode(&[]);
        assert!(err.is_err());
        let err = decode(&[99, 1, 2, 3]);
        assert!(err.is_err());
    }
}
