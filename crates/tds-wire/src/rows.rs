//! Row token encoding.
//!
//! [`RowWriter`] assembles the token stream of a result: COLMETADATA, ROW,
//! NBCROW and ALTROW tokens with their column values, and the closing DONE.
//! Values are given as their wire bytes and length-prefixed according to the
//! column they belong to. It is used to build result streams for tests,
//! benchmarks and fuzz corpora.

use bytes::{BufMut, Bytes, BytesMut};

use crate::metadata::{ColMetaData, ColumnData, LengthPrefix};
use crate::packet::frame_payload;
use crate::token::{Done, DoneStatus, TokenType, null_bitmap_len};

/// Total-length marker of a PLP value whose length is not known up front.
pub const PLP_UNKNOWN_LENGTH: u64 = 0xFFFF_FFFF_FFFF_FFFE;

/// Total-length marker of a null PLP value.
pub const PLP_NULL: u64 = u64::MAX;

/// Size of the text pointer written for legacy large objects.
const TEXT_PTR_LEN: u8 = 16;

/// Builder for a result token stream.
#[derive(Debug, Default, Clone)]
pub struct RowWriter {
    buf: BytesMut,
}

impl RowWriter {
    /// Create an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a COLMETADATA token.
    pub fn metadata(&mut self, metadata: &ColMetaData) -> &mut Self {
        self.buf.put_u8(TokenType::ColMetaData as u8);
        metadata.encode(&mut self.buf);
        self
    }

    /// Start a ROW token. Column values follow.
    pub fn row(&mut self) -> &mut Self {
        self.buf.put_u8(TokenType::Row as u8);
        self
    }

    /// Start an NBCROW token with its null bitmap. Values follow for the
    /// columns that are not null.
    pub fn nbc_row(&mut self, nulls: &[bool]) -> &mut Self {
        self.buf.put_u8(TokenType::NbcRow as u8);
        let mut bitmap = vec![0u8; null_bitmap_len(nulls.len())];
        for (i, _) in nulls.iter().enumerate().filter(|(_, null)| **null) {
            bitmap[i / 8] |= 1 << (i % 8);
        }
        self.buf.put_slice(&bitmap);
        self
    }

    /// Start an ALTROW token for the compute clause `id`.
    pub fn alt_row(&mut self, id: u16) -> &mut Self {
        self.buf.put_u8(TokenType::AltRow as u8);
        self.buf.put_u16_le(id);
        self
    }

    /// Append one column value, `None` for null.
    pub fn value(&mut self, column: &ColumnData, value: Option<&[u8]>) -> &mut Self {
        match (column.length_prefix(), value) {
            (LengthPrefix::Fixed(_), Some(bytes)) => self.buf.put_slice(bytes),
            (LengthPrefix::Fixed(_), None) => {}
            (LengthPrefix::Byte, None) if column.type_id.uses_charbin_null() => {
                self.buf.put_u8(0xFF);
            }
            (LengthPrefix::Byte, None) => self.buf.put_u8(0),
            (LengthPrefix::Byte, Some(bytes)) => {
                self.buf.put_u8(bytes.len() as u8);
                self.buf.put_slice(bytes);
            }
            (LengthPrefix::UShort, None) => self.buf.put_u16_le(0xFFFF),
            (LengthPrefix::UShort, Some(bytes)) => {
                self.buf.put_u16_le(bytes.len() as u16);
                self.buf.put_slice(bytes);
            }
            (LengthPrefix::Int, None) => self.buf.put_u32_le(0),
            (LengthPrefix::Int, Some(bytes)) => {
                self.buf.put_u32_le(bytes.len() as u32);
                self.buf.put_slice(bytes);
            }
            (LengthPrefix::TextPtr, None) => self.buf.put_u8(0),
            (LengthPrefix::TextPtr, Some(bytes)) => {
                self.buf.put_u8(TEXT_PTR_LEN);
                self.buf.put_bytes(0xAB, usize::from(TEXT_PTR_LEN));
                // timestamp
                self.buf.put_u64_le(0);
                self.buf.put_u32_le(bytes.len() as u32);
                self.buf.put_slice(bytes);
            }
            (LengthPrefix::Plp, None) => self.buf.put_u64_le(PLP_NULL),
            (LengthPrefix::Plp, Some(bytes)) => {
                return self.plp(Some(bytes.len() as u64), &[bytes]);
            }
        }
        self
    }

    /// Append a PLP value split into the given chunks.
    ///
    /// `total` is the announced total length, `None` for unknown.
    pub fn plp(&mut self, total: Option<u64>, chunks: &[&[u8]]) -> &mut Self {
        self.buf.put_u64_le(total.unwrap_or(PLP_UNKNOWN_LENGTH));
        for chunk in chunks.iter().filter(|c| !c.is_empty()) {
            self.buf.put_u32_le(chunk.len() as u32);
            self.buf.put_slice(chunk);
        }
        self.buf.put_u32_le(0);
        self
    }

    /// Append a DONE token carrying a row count.
    pub fn done(&mut self, row_count: u64) -> &mut Self {
        let done = Done {
            status: DoneStatus {
                count: true,
                ..Default::default()
            },
            cur_cmd: 0xC1,
            row_count,
        };
        done.encode(&mut self.buf);
        self
    }

    /// Append raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The de-framed token stream.
    #[must_use]
    pub fn to_payload(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// The token stream framed into packets of `packet_size`.
    #[must_use]
    pub fn to_packets(&self, packet_size: usize) -> Vec<Bytes> {
        frame_payload(&self.buf, packet_size)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::{MAX_LENGTH_MARKER, TypeInfo};
    use crate::types::TypeId;

    fn varchar_max() -> ColumnData {
        ColumnData::new(
            "doc",
            TypeId::BigVarChar,
            TypeInfo {
                max_length: Some(MAX_LENGTH_MARKER),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_nbc_row_bitmap() {
        let mut w = RowWriter::new();
        let nulls = [false, true, false, false, false, false, false, false, true];
        w.nbc_row(&nulls);
        assert_eq!(&w.to_payload()[..], &[0xD2, 0b0000_0010, 0b0000_0001]);
    }

    #[test]
    fn test_charbin_null_marker() {
        let col = ColumnData::new(
            "b",
            TypeId::VarBinary,
            TypeInfo {
                max_length: Some(10),
                ..Default::default()
            },
        );
        let int_col = ColumnData::new(
            "i",
            TypeId::IntN,
            TypeInfo {
                max_length: Some(4),
                ..Default::default()
            },
        );
        let mut w = RowWriter::new();
        w.value(&col, None).value(&int_col, None);
        assert_eq!(&w.to_payload()[..], &[0xFF, 0x00]);
    }

    #[test]
    fn test_plp_chunks_and_terminator() {
        let mut w = RowWriter::new();
        w.plp(None, &[b"ab", b"", b"c"]);
        let payload = w.to_payload();
        assert_eq!(&payload[..8], &PLP_UNKNOWN_LENGTH.to_le_bytes());
        assert_eq!(&payload[8..], &[2, 0, 0, 0, b'a', b'b', 1, 0, 0, 0, b'c', 0, 0, 0, 0]);
    }

    #[test]
    fn test_plp_value_announces_length() {
        let mut w = RowWriter::new();
        w.value(&varchar_max(), Some(b"xyz"));
        let payload = w.to_payload();
        assert_eq!(&payload[..8], &3u64.to_le_bytes());
        assert_eq!(payload.len(), 8 + 4 + 3 + 4);
    }

    #[test]
    fn test_done_token() {
        let mut w = RowWriter::new();
        w.done(7);
        let payload = w.to_payload();
        assert_eq!(payload[0], TokenType::Done as u8);
        let done = Done::decode(&mut &payload[1..]).unwrap();
        assert!(done.status.count);
        assert_eq!(done.row_count, 7);
    }
}
