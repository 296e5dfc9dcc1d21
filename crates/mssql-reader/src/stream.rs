//! Streaming access to large column values.
//!
//! In sequential mode a [`ColumnStream`] or [`ColumnTextReader`] pulls the
//! value from the wire in chunks, without materializing it. In default mode
//! the value is already in the row buffer and the handles read from a copy.
//! A handle stops working once the reader moves to another column or row.

use std::fmt;
use std::io;

use bytes::Bytes;
use mssql_value::TypeError;

use crate::error::Result;
use crate::parser::RowParser;
use crate::reader::DataReader;

/// Open streaming handle on the current row.
#[derive(Debug, Clone)]
pub(crate) struct StreamState {
    pub(crate) column: usize,
    pub(crate) id: u64,
    pub(crate) kind: StreamKind,
}

impl StreamState {
    pub(crate) fn is_text(&self) -> bool {
        matches!(self.kind, StreamKind::Text(_))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum StreamKind {
    Binary,
    Text(Utf16ChunkDecoder),
}

/// Incremental UTF-16LE decoder for values split at arbitrary byte offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utf16ChunkDecoder {
    carry_byte: Option<u8>,
    carry_unit: Option<u16>,
}

impl Utf16ChunkDecoder {
    /// Decode `bytes`, appending complete characters to `out`.
    ///
    /// An odd trailing byte or a trailing high surrogate is held back until
    /// the next chunk.
    pub fn push(&mut self, bytes: &[u8], out: &mut String) -> std::result::Result<(), TypeError> {
        let mut units = Vec::with_capacity(bytes.len() / 2 + 2);
        units.extend(self.carry_unit.take());

        let mut rest = bytes;
        if let Some(low) = self.carry_byte.take() {
            match rest.split_first() {
                Some((&high, tail)) => {
                    units.push(u16::from_le_bytes([low, high]));
                    rest = tail;
                }
                None => self.carry_byte = Some(low),
            }
        }
        let pairs = rest.chunks_exact(2);
        if let [odd] = pairs.remainder() {
            self.carry_byte = Some(*odd);
        }
        units.extend(pairs.map(|pair| u16::from_le_bytes([pair[0], pair[1]])));

        if let Some(&last) = units.last() {
            if (0xD800..0xDC00).contains(&last) {
                self.carry_unit = Some(last);
                units.pop();
            }
        }

        for c in char::decode_utf16(units) {
            let c = c.map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
            out.push(c);
        }
        Ok(())
    }

    /// Check that nothing is left over at the end of the value.
    pub fn finish(&mut self) -> std::result::Result<(), TypeError> {
        if self.carry_byte.take().is_some() {
            return Err(TypeError::InvalidEncoding(
                "odd number of bytes in UTF-16 value".into(),
            ));
        }
        if self.carry_unit.take().is_some() {
            return Err(TypeError::InvalidEncoding(
                "unpaired surrogate at end of UTF-16 value".into(),
            ));
        }
        Ok(())
    }
}

/// Binary stream over one column value, from
/// [`DataReader::get_stream`].
pub enum ColumnStream<'a, P: RowParser> {
    /// Copy of a materialized value.
    Buffered(io::Cursor<Bytes>),
    /// Chunks pulled from the wire.
    Sequential {
        /// Reader the value belongs to.
        reader: &'a DataReader<P>,
        /// Handle id, invalidated when the reader moves on.
        id: u64,
    },
}

impl<P: RowParser> io::Read for ColumnStream<'_, P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Buffered(cursor) => cursor.read(buf),
            Self::Sequential { reader, id } => {
                let mut core = reader.sync_core()?;
                Ok(core.read_stream(*id, buf)?)
            }
        }
    }
}

/// Text reader over one character column value, from
/// [`DataReader::get_text_reader`].
pub enum ColumnTextReader<'a, P: RowParser> {
    /// The materialized value, until it has been handed out.
    Buffered(Option<String>),
    /// Text decoded from wire chunks.
    Sequential {
        /// Reader the value belongs to.
        reader: &'a DataReader<P>,
        /// Handle id, invalidated when the reader moves on.
        id: u64,
    },
}

impl<P: RowParser> ColumnTextReader<'_, P> {
    /// Next piece of text, `None` at the end of the value.
    pub fn read_chunk(&mut self) -> Result<Option<String>> {
        match self {
            Self::Buffered(text) => Ok(text.take()),
            Self::Sequential { reader, id } => reader.sync_core()?.read_text(*id),
        }
    }

    /// Read the rest of the value.
    pub fn read_to_string(&mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(chunk) = self.read_chunk()? {
            text.push_str(&chunk);
        }
        Ok(text)
    }
}

impl<P: RowParser> fmt::Debug for ColumnStream<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(cursor) => f
                .debug_struct("ColumnStream::Buffered")
                .field("len", &cursor.get_ref().len())
                .field("position", &cursor.position())
                .finish(),
            Self::Sequential { id, .. } => f
                .debug_struct("ColumnStream::Sequential")
                .field("id", id)
                .finish(),
        }
    }
}

impl<P: RowParser> fmt::Debug for ColumnTextReader<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(text) => f
                .debug_struct("ColumnTextReader::Buffered")
                .field("remaining", &text.as_ref().map(String::len))
                .finish(),
            Self::Sequential { id, .. } => f
                .debug_struct("ColumnTextReader::Sequential")
                .field("id", id)
                .finish(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn test_decoder_handles_any_split() {
        let text = "héllo 𝄞 wörld";
        let bytes = utf16(text);
        for split in 0..=bytes.len() {
            let mut decoder = Utf16ChunkDecoder::default();
            let mut out = String::new();
            decoder.push(&bytes[..split], &mut out).unwrap();
            decoder.push(&bytes[split..], &mut out).unwrap();
            decoder.finish().unwrap();
            assert_eq!(out, text, "split at {split}");
        }
    }

    #[test]
    fn test_decoder_byte_at_a_time() {
        let bytes = utf16("a𝄞b");
        let mut decoder = Utf16ChunkDecoder::default();
        let mut out = String::new();
        for b in &bytes {
            decoder.push(std::slice::from_ref(b), &mut out).unwrap();
        }
        decoder.finish().unwrap();
        assert_eq!(out, "a𝄞b");
    }

    #[test]
    fn test_decoder_rejects_truncated_value() {
        let mut decoder = Utf16ChunkDecoder::default();
        let mut out = String::new();
        decoder.push(&[0x41, 0x00, 0x42], &mut out).unwrap();
        assert_eq!(out, "A");
        assert!(decoder.finish().is_err());

        let mut decoder = Utf16ChunkDecoder::default();
        decoder.push(&[0x34, 0xD8], &mut out).unwrap();
        assert!(matches!(
            decoder.finish(),
            Err(TypeError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_decoder_rejects_lone_low_surrogate() {
        let mut decoder = Utf16ChunkDecoder::default();
        let mut out = String::new();
        assert!(decoder.push(&[0x00, 0xDC], &mut out).is_err());
    }
}
