//! On-disk record frame codec.
//!
//! A record frame is self-delimited:
//!
//! ```text
//! key_len (u32 LE) | value_len (u32 LE) | key bytes | value bytes
//! ```
//!
//! Decoding from any frame boundary consumes exactly one frame and reports
//! the consumed byte count; that count is how the writer advances its append
//! offset and how recovery walks a file. The frame carries no checksum, so a
//! frame cut short by a crash surfaces as [`DecodeError::Truncated`] rather
//! than a checksum mismatch.

use crate::error::{Result, StoreError};
use std::io::{self, Read};
use thiserror::Error;

/// Maximum encoded key length in bytes.
pub const MAX_KEY_LEN: usize = 64 * 1024;

/// Maximum encoded value length in bytes.
pub const MAX_VALUE_LEN: usize = 16 * 1024 * 1024;

/// Two little-endian `u32` length fields.
const HEADER_LEN: usize = 8;

/// A decoded (key, value) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Key text.
    pub key: String,
    /// Value text.
    pub value: String,
}

/// Errors produced while decoding a single frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream ended inside a frame.
    #[error("truncated record frame")]
    Truncated,

    /// A length field exceeds the codec bounds; the bytes are not a frame.
    #[error("record length field out of bounds")]
    LengthOutOfBounds,

    /// Key or value bytes are not valid UTF-8.
    #[error("record payload is not valid UTF-8")]
    InvalidUtf8,

    /// The underlying reader failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Encodes a (key, value) pair into one self-delimited frame.
///
/// Fails with [`StoreError::RecordTooLarge`] when either field exceeds its
/// bound; nothing is written in that case.
pub fn encode(key: &str, value: &str) -> Result<Vec<u8>> {
    if key.len() > MAX_KEY_LEN {
        return Err(StoreError::RecordTooLarge {
            what: "key",
            len: key.len(),
            max: MAX_KEY_LEN,
        });
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(StoreError::RecordTooLarge {
            what: "value",
            len: value.len(),
            max: MAX_VALUE_LEN,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + key.len() + value.len());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(buf)
}

/// Decodes one frame from `reader`.
///
/// Returns `Ok(Some((record, consumed)))` on success and `Ok(None)` at a
/// clean end of stream with zero bytes consumed. A nonzero partial tail is
/// [`DecodeError::Truncated`]; the caller attaches the file path.
pub fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Option<(Record, u64)>, DecodeError> {
    let mut header = [0u8; HEADER_LEN];
    match read_full(reader, &mut header)? {
        0 => return Ok(None),
        n if n < HEADER_LEN => return Err(DecodeError::Truncated),
        _ => {}
    }

    let key_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    let value_len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
    if key_len > MAX_KEY_LEN || value_len > MAX_VALUE_LEN {
        return Err(DecodeError::LengthOutOfBounds);
    }

    let mut payload = vec![0u8; key_len + value_len];
    if read_full(reader, &mut payload)? != payload.len() {
        return Err(DecodeError::Truncated);
    }

    let value_bytes = payload.split_off(key_len);
    let key = String::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8)?;
    let value = String::from_utf8(value_bytes).map_err(|_| DecodeError::InvalidUtf8)?;

    let consumed = (HEADER_LEN + key_len + value_len) as u64;
    Ok(Some((Record { key, value }, consumed)))
}

/// Reads until `buf` is full or the stream ends; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encode_layout() {
        let frame = encode("k", "v").unwrap();
        assert_eq!(frame, vec![1, 0, 0, 0, 1, 0, 0, 0, b'k', b'v']);
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let mut bytes = encode("k1", "v1").unwrap();
        bytes.extend_from_slice(&encode("key2", "value2").unwrap());

        let mut cursor = Cursor::new(bytes);

        let (first, n1) = decode_from(&mut cursor).unwrap().unwrap();
        assert_eq!(first.key, "k1");
        assert_eq!(first.value, "v1");
        assert_eq!(n1, 8 + 2 + 2);

        let (second, n2) = decode_from(&mut cursor).unwrap().unwrap();
        assert_eq!(second.key, "key2");
        assert_eq!(second.value, "value2");
        assert_eq!(n2, 8 + 4 + 6);

        assert!(decode_from(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn empty_key_and_value_are_frames_too() {
        let frame = encode("", "").unwrap();
        assert_eq!(frame.len(), 8);

        let mut cursor = Cursor::new(frame);
        let (record, consumed) = decode_from(&mut cursor).unwrap().unwrap();
        assert_eq!(record.key, "");
        assert_eq!(record.value, "");
        assert_eq!(consumed, 8);
    }

    #[test]
    fn partial_tail_is_truncated() {
        let frame = encode("key", "value").unwrap();

        // Cut inside the header and inside the payload.
        for cut in [3, frame.len() - 2] {
            let mut cursor = Cursor::new(&frame[..cut]);
            match decode_from(&mut cursor) {
                Err(DecodeError::Truncated) => {}
                other => panic!("expected Truncated, got {:?}", other),
            }
        }
    }

    #[test]
    fn absurd_length_field_is_rejected() {
        let mut cursor = Cursor::new([0xff; 16]);
        match decode_from(&mut cursor) {
            Err(DecodeError::LengthOutOfBounds) => {}
            other => panic!("expected LengthOutOfBounds, got {:?}", other),
        }
    }

    #[test]
    fn non_utf8_payload_is_rejected() {
        let mut bytes = vec![1, 0, 0, 0, 0, 0, 0, 0];
        bytes.push(0xff);

        let mut cursor = Cursor::new(bytes);
        match decode_from(&mut cursor) {
            Err(DecodeError::InvalidUtf8) => {}
            other => panic!("expected InvalidUtf8, got {:?}", other),
        }
    }

    #[test]
    fn oversized_key_is_not_encodable() {
        let key = "k".repeat(MAX_KEY_LEN + 1);
        match encode(&key, "v") {
            Err(StoreError::RecordTooLarge { what: "key", .. }) => {}
            other => panic!("expected RecordTooLarge, got {:?}", other),
        }
    }
}
