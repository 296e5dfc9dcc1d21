//! XML kept as the UTF-16 chunks it arrived in.

use bytes::Bytes;

use crate::error::TypeError;

const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];

/// XML column data buffered chunk by chunk.
///
/// Rendering to a `String` is deferred until the value is read; the byte
/// order mark the server prefixes is dropped on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedBuffer {
    chunks: Vec<Bytes>,
}

impl CachedBuffer {
    /// Build from PLP chunks.
    #[must_use]
    pub fn from_chunks(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        let mut chunks: Vec<Bytes> = chunks.into_iter().filter(|c| !c.is_empty()).collect();
        if let Some(first) = chunks.first_mut() {
            if first.starts_with(&UTF16_LE_BOM) {
                *first = first.slice(UTF16_LE_BOM.len()..);
            }
        }
        chunks.retain(|c| !c.is_empty());
        Self { chunks }
    }

    /// The buffered chunks.
    #[must_use]
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Total buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    /// Returns whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Decode the chunks as one UTF-16LE document.
    ///
    /// Chunk boundaries may split a code unit, so the bytes are joined first.
    pub fn render(&self) -> Result<String, TypeError> {
        let joined: Vec<u8> = self.chunks.concat();
        tds_wire::codec::decode_utf16le(&joined).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
    }
}
