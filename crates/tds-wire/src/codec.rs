//! UTF-16 string helpers shared by metadata parsing and value decoding.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Read a UTF-16LE string with a 1-byte character count.
pub fn read_b_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 1 {
        return None;
    }
    let len = src.get_u8() as usize;
    read_utf16_string(src, len)
}

/// Read a UTF-16LE string with a 2-byte character count.
pub fn read_us_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 2 {
        return None;
    }
    let len = src.get_u16_le() as usize;
    read_utf16_string(src, len)
}

/// Read `char_count` UTF-16LE code units.
pub fn read_utf16_string(src: &mut impl Buf, char_count: usize) -> Option<String> {
    if src.remaining() < char_count * 2 {
        return None;
    }
    let units: Vec<u16> = (0..char_count).map(|_| src.get_u16_le()).collect();
    String::from_utf16(&units).ok()
}

/// Decode a complete UTF-16LE byte slice.
///
/// An odd trailing byte is an error; lone surrogates are rejected.
pub fn decode_utf16le(bytes: &[u8]) -> Result<String, ProtocolError> {
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::StringEncoding(format!(
            "odd UTF-16 byte length {}",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| ProtocolError::StringEncoding(e.to_string()))
}

/// Write a UTF-16LE string with a 1-byte character count.
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().take(u8::MAX as usize).collect();
    dst.put_u8(units.len() as u8);
    units.iter().for_each(|&u| dst.put_u16_le(u));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_b_varchar_reads_written_name() {
        let mut buf = BytesMut::new();
        write_b_varchar(&mut buf, "Größe");
        assert_eq!(buf[0], 5);

        let mut cursor = buf.freeze();
        assert_eq!(read_b_varchar(&mut cursor).unwrap(), "Größe");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_truncated_us_varchar() {
        let mut cursor: &[u8] = &[0x03, 0x00, b'a', 0x00];
        assert!(read_us_varchar(&mut cursor).is_none());
    }

    #[test]
    fn test_decode_utf16le() {
        assert_eq!(decode_utf16le(&[0x61, 0x00, 0x3A, 0x04]).unwrap(), "aк");
        assert!(decode_utf16le(&[0x61]).is_err());
        // lone high surrogate
        assert!(decode_utf16le(&[0x00, 0xD8]).is_err());
    }
}
