//! Wire codec — newline-delimited JSON frames.
//!
//! One frame per line, `{"event": ..., "data": ...}`. Frames longer than
//! `MAX_FRAME_LEN` are refused before parsing.

use serde::{de::DeserializeOwned, Serialize};

pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Serialise `value` as one frame, trailing newline included.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let mut line =
        serde_json::to_string(value).map_err(|e| CodecError::Serialization(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

pub fn decode_frame<T: DeserializeOwned>(line: &str) -> Result<T, CodecError> {
    if line.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(line.len()));
    }
    serde_json::from_str(line.trim_end()).map_err(|e| CodecError::Malformed(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// `#[serde(with = "codec::b64")]` for byte fields.
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
