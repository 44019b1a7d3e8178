//! Variable-length integer encoding utilities.
//!
//! Used for the length-prefixed framing of row keys and continuation
//! tokens. Values are encoded 7 bits per byte with a continuation bit,
//! least significant group first.

use byteorder::ReadBytesExt;
use std::io::Read;

use crate::error::{Result, XystonError};

/// Append a u64 value to `buf` using variable-length encoding.
pub fn encode_u64_into(buf: &mut Vec<u8>, value: u64) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf.push(byte);

        if val == 0 {
            break;
        }
    }
}

/// Decode a u64 value from the front of `bytes`.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut consumed = 0;

    for &byte in bytes {
        consumed += 1;

        if shift >= 64 {
            return Err(XystonError::serialization("varint overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, consumed));
        }

        shift += 7;
    }

    Err(XystonError::serialization("incomplete varint"))
}

/// Read a variable-length encoded u64 from a reader.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    loop {
        let byte = reader.read_u8()?;

        if shift >= 64 {
            return Err(XystonError::serialization("varint overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }
}

/// Append a length-prefixed byte slice to `buf`.
pub fn encode_bytes_into(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_u64_into(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Decode a length-prefixed byte slice from the front of `bytes`.
///
/// Returns the slice and the total number of bytes consumed including
/// the length prefix.
pub fn decode_bytes(bytes: &[u8]) -> Result<(&[u8], usize)> {
    let (len, prefix) = decode_u64(bytes)?;
    let len = len as usize;
    let end = prefix
        .checked_add(len)
        .ok_or_else(|| XystonError::serialization("length prefix overflow"))?;

    if bytes.len() < end {
        return Err(XystonError::serialization(format!(
            "truncated field: need {len} bytes, have {}",
            bytes.len() - prefix
        )));
    }

    Ok((&bytes[prefix..end], end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_round_trip() {
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            encode_u64_into(&mut buf, value);
            let (decoded, consumed) = decode_u64(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn test_u64_encoding_sizes() {
        let mut buf = Vec::new();
        encode_u64_into(&mut buf, 127);
        assert_eq!(buf.len(), 1);

        buf.clear();
        encode_u64_into(&mut buf, 128);
        assert_eq!(buf.len(), 2);

        buf.clear();
        encode_u64_into(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_incomplete_varint() {
        // Continuation bit set but no following byte.
        assert!(decode_u64(&[0x80]).is_err());
        assert!(decode_u64(&[]).is_err());
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut buf = Vec::new();
        encode_bytes_into(&mut buf, b"partition");
        encode_bytes_into(&mut buf, b"");
        encode_bytes_into(&mut buf, b"clustering");

        let (first, used) = decode_bytes(&buf).unwrap();
        assert_eq!(first, b"partition");
        let (second, used2) = decode_bytes(&buf[used..]).unwrap();
        assert_eq!(second, b"");
        let (third, used3) = decode_bytes(&buf[used + used2..]).unwrap();
        assert_eq!(third, b"clustering");
        assert_eq!(used + used2 + used3, buf.len());
    }

    #[test]
    fn test_truncated_bytes() {
        let mut buf = Vec::new();
        encode_bytes_into(&mut buf, b"partition");
        assert!(decode_bytes(&buf[..buf.len() - 1]).is_err());
    }

    #[test]
    fn test_read_u64_from_reader() {
        let mut buf = Vec::new();
        encode_u64_into(&mut buf, 987_654_321);
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_u64(&mut cursor).unwrap(), 987_654_321);
    }
}
