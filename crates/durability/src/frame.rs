//! Line framing with CRC-32 checksums
//!
//! Each entry is one line: `<crc32 as 8 lowercase hex> <json>\n`. The
//! checksum covers the JSON bytes, so a torn write or a flipped byte is
//! detected instead of being misparsed.

use crate::error::{DurabilityError, FrameError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode an entry as a framed line, including the trailing newline
pub fn encode_line<T: Serialize>(entry: &T) -> Result<String, DurabilityError> {
    let json = serde_json::to_string(entry)?;
    let crc = crc32fast::hash(json.as_bytes());
    Ok(format!("{crc:08x} {json}\n"))
}

/// Decode one framed line (without its newline)
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, FrameError> {
    let (crc_hex, json) = line.split_once(' ').ok_or(FrameError::Malformed)?;
    if crc_hex.len() != 8 {
        return Err(FrameError::Malformed);
    }
    let expected = u32::from_str_radix(crc_hex, 16).map_err(|_| FrameError::Malformed)?;
    let actual = crc32fast::hash(json.as_bytes());
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }
    serde_json::from_str(json).map_err(|e| FrameError::InvalidEntry(e.to_string()))
}

/// Decode the JSON body of a framed line without checking its CRC
///
/// Used to salvage lines whose checksum fails so that higher layers can
/// report exactly which entry was altered.
pub fn decode_body<T: DeserializeOwned>(line: &str) -> Result<T, FrameError> {
    let (_, json) = line.split_once(' ').ok_or(FrameError::Malformed)?;
    serde_json::from_str(json).map_err(|e| FrameError::InvalidEntry(e.to_string()))
}
