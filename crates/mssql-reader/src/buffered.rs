//! [`RowParser`] over an in-memory [`PacketBuffer`].
//!
//! The transport side holds a [`PacketFeed`] and pushes packets as they are
//! received; the reader side owns the [`BufferedParser`] and parses rows out
//! of whatever has been pushed so far. When the parser runs dry it waits on
//! the feed until the next push or until the feed is closed.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mssql_value::{SqlCell, decode};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tds_wire::token::null_bitmap_len;
use tds_wire::{
    ColMetaData, ColumnData, DEFAULT_PACKET_SIZE, Done, LengthPrefix, PLP_NULL, PacketBuffer,
    Progress, ProtocolError, TokenType, TypeId, try_progress,
};
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::parser::{ColumnHeader, RowParser, RowToken};

#[derive(Debug)]
struct FeedState {
    buffer: PacketBuffer,
    generation: u64,
    closed: bool,
}

#[derive(Debug)]
struct FeedShared {
    state: Mutex<FeedState>,
    data_arrived: Notify,
}

/// Producer side of a [`BufferedParser`].
#[derive(Debug, Clone)]
pub struct PacketFeed {
    shared: Arc<FeedShared>,
}

impl PacketFeed {
    /// Push framed packet bytes.
    pub fn push_packet(&self, bytes: &[u8]) -> Result<()> {
        self.push(|buffer| buffer.push_raw(bytes))
    }

    /// Push payload bytes that carry no packet framing.
    pub fn push_payload(&self, bytes: &[u8]) -> Result<()> {
        self.push(|buffer| {
            buffer.push_payload(bytes);
            Ok(())
        })
    }

    fn push(
        &self,
        f: impl FnOnce(&mut PacketBuffer) -> std::result::Result<(), ProtocolError>,
    ) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(Error::Protocol(ProtocolError::ConnectionClosed));
            }
            f(&mut state.buffer)?;
            state.generation += 1;
        }
        self.shared.data_arrived.notify_one();
        Ok(())
    }

    /// Signal that no more bytes will arrive.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.data_arrived.notify_one();
    }

    /// Returns whether the feed was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

#[derive(Debug, Clone, Copy)]
struct PlpState {
    chunk_remaining: u32,
}

/// Parser state that must rewind together with the buffer.
#[derive(Debug, Clone, Default)]
struct ParserState {
    null_bitmap: SmallVec<[u8; 8]>,
    plp: Option<PlpState>,
}

enum Prefix {
    Null,
    Length(u64),
    Plp(u64),
}

/// Row parser reading from packets pushed through a [`PacketFeed`].
#[derive(Debug)]
pub struct BufferedParser {
    shared: Arc<FeedShared>,
    seen_generation: u64,
    state: ParserState,
    saved: Option<ParserState>,
}

impl BufferedParser {
    /// Create a parser and the feed that supplies it.
    #[must_use]
    pub fn new(packet_size: usize) -> (Self, PacketFeed) {
        let shared = Arc::new(FeedShared {
            state: Mutex::new(FeedState {
                buffer: PacketBuffer::new(packet_size),
                generation: 0,
                closed: false,
            }),
            data_arrived: Notify::new(),
        });
        let parser = Self {
            shared: Arc::clone(&shared),
            seen_generation: 0,
            state: ParserState::default(),
            saved: None,
        };
        (parser, PacketFeed { shared })
    }

    /// Parser over a complete de-framed token stream.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        let (parser, feed) = Self::new(DEFAULT_PACKET_SIZE);
        // A fresh feed is open, so the push cannot fail.
        feed.push_payload(payload).ok();
        feed.close();
        parser
    }

    /// Parser over a complete sequence of framed packets.
    pub fn from_packets<I>(packets: I, packet_size: usize) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let (parser, feed) = Self::new(packet_size);
        for packet in packets {
            feed.push_packet(packet.as_ref())?;
        }
        feed.close();
        Ok(parser)
    }

    /// A handle for pushing more packets.
    #[must_use]
    pub fn feed(&self) -> PacketFeed {
        PacketFeed {
            shared: Arc::clone(&self.shared),
        }
    }
}

fn to_len(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn read_prefix(buffer: &mut PacketBuffer, column: &ColumnData) -> Progress<Prefix> {
    let charbin = column.type_id.uses_charbin_null();
    buffer.atomically(|b| match column.length_prefix() {
        LengthPrefix::Fixed(_) if column.type_id == TypeId::Null => Progress::Done(Prefix::Null),
        LengthPrefix::Fixed(size) => Progress::Done(Prefix::Length(size as u64)),
        LengthPrefix::Byte => b.try_get_u8().map(|len| match len {
            0xFF if charbin => Prefix::Null,
            0 if !charbin => Prefix::Null,
            len => Prefix::Length(u64::from(len)),
        }),
        LengthPrefix::UShort => b.try_get_u16_le().map(|len| match len {
            0xFFFF => Prefix::Null,
            len => Prefix::Length(u64::from(len)),
        }),
        LengthPrefix::Int => b.try_get_u32_le().map(|len| match len {
            0 => Prefix::Null,
            len => Prefix::Length(u64::from(len)),
        }),
        LengthPrefix::TextPtr => b.try_get_u8().and_then(|ptr_len| {
            if ptr_len == 0 {
                return Progress::Done(Prefix::Null);
            }
            // text pointer, then an 8-byte timestamp
            b.try_skip(usize::from(ptr_len) + 8)
                .and_then(|()| b.try_get_u32_le())
                .map(|len| Prefix::Length(u64::from(len)))
        }),
        LengthPrefix::Plp => b.try_get_u64_le().map(|total| match total {
            PLP_NULL => Prefix::Null,
            total => Prefix::Plp(total),
        }),
    })
}

/// Read the rest of a PLP value up to and including its terminator.
fn read_plp_chunks(buffer: &mut PacketBuffer, mut chunk_remaining: u32) -> Progress<Vec<Bytes>> {
    buffer.atomically(|b| {
        let mut chunks = Vec::new();
        loop {
            if chunk_remaining == 0 {
                match b.try_get_u32_le() {
                    Progress::Done(0) => return Progress::Done(chunks),
                    Progress::Done(len) => chunk_remaining = len,
                    Progress::NeedMoreData => return Progress::NeedMoreData,
                }
            }
            match b.try_take(chunk_remaining as usize) {
                Progress::Done(chunk) => {
                    chunks.push(chunk);
                    chunk_remaining = 0;
                }
                Progress::NeedMoreData => return Progress::NeedMoreData,
            }
        }
    })
}

fn peek_token(buffer: &PacketBuffer) -> Result<Progress<TokenType>> {
    match buffer.peek_u8() {
        Progress::Done(byte) => TokenType::from_u8(byte)
            .map(Progress::Done)
            .ok_or_else(|| ProtocolError::InvalidTokenType(byte).into()),
        Progress::NeedMoreData => Ok(Progress::NeedMoreData),
    }
}

#[async_trait]
impl RowParser for BufferedParser {
    fn packet_size(&self) -> usize {
        self.shared.state.lock().buffer.packet_size()
    }

    fn buffered_bytes(&self) -> usize {
        self.shared.state.lock().buffer.buffered_bytes()
    }

    fn has_partial_packet_header(&self) -> bool {
        self.shared.state.lock().buffer.has_partial_packet_header()
    }

    fn finish_partial_packet_header(&mut self) -> Result<Progress<()>> {
        Ok(self.shared.state.lock().buffer.finish_partial_packet_header())
    }

    fn peek_next_token(&mut self) -> Result<Progress<TokenType>> {
        peek_token(&self.shared.state.lock().buffer)
    }

    fn is_next_token_ready(&self, column_count: usize) -> bool {
        let feed = self.shared.state.lock();
        let unread = feed.buffer.unread();
        let Some(&byte) = unread.first() else {
            return false;
        };
        let needed = match TokenType::from_u8(byte) {
            Some(TokenType::Row | TokenType::ColMetaData | TokenType::AltMetaData) => 1,
            Some(TokenType::NbcRow) => 1 + null_bitmap_len(column_count),
            Some(TokenType::AltRow) => 3,
            Some(token) if token.is_done() => 1 + Done::SIZE,
            _ => return false,
        };
        unread.len() >= needed
    }

    fn read_metadata(&mut self) -> Result<Progress<ColMetaData>> {
        let mut feed = self.shared.state.lock();
        let (metadata, consumed) = {
            let unread = feed.buffer.unread();
            let Some(&byte) = unread.first() else {
                return Ok(Progress::NeedMoreData);
            };
            if byte != TokenType::ColMetaData as u8 {
                return Err(ProtocolError::InvalidTokenType(byte).into());
            }
            let mut body = &unread[1..];
            let before = body.len();
            match ColMetaData::decode(&mut body) {
                Ok(metadata) => (metadata, 1 + before - body.len()),
                Err(ProtocolError::UnexpectedEof) => return Ok(Progress::NeedMoreData),
                Err(e) => return Err(e.into()),
            }
        };
        Ok(feed.buffer.try_skip(consumed).map(|()| metadata))
    }

    fn begin_row(&mut self, column_count: usize) -> Result<Progress<RowToken>> {
        let mut feed = self.shared.state.lock();
        let token = try_progress!(peek_token(&feed.buffer));
        if !token.is_row() {
            return Err(ProtocolError::InvalidTokenType(token as u8).into());
        }
        let mut bitmap = SmallVec::new();
        let row = feed.buffer.atomically(|b| {
            b.try_skip(1).and_then(|()| match token {
                TokenType::NbcRow => b.try_take(null_bitmap_len(column_count)).map(|bits| {
                    bitmap = SmallVec::from_slice(&bits);
                    RowToken::NbcRow
                }),
                TokenType::AltRow => b.try_get_u16_le().map(RowToken::AltRow),
                _ => Progress::Done(RowToken::Row),
            })
        });
        if row.is_done() {
            self.state.null_bitmap = bitmap;
            self.state.plp = None;
        }
        Ok(row)
    }

    fn read_done(&mut self) -> Result<Progress<Done>> {
        let mut feed = self.shared.state.lock();
        let mut body = try_progress!(Ok::<_, Error>(
            feed.buffer
                .atomically(|b| b.try_skip(1).and_then(|()| b.try_take(Done::SIZE)))
        ));
        Ok(Progress::Done(Done::decode(&mut body)?))
    }

    fn skip_token(&mut self) -> Result<Progress<TokenType>> {
        let mut feed = self.shared.state.lock();
        let token = try_progress!(peek_token(&feed.buffer));
        if token.is_row() || matches!(token, TokenType::ColMetaData | TokenType::AltMetaData) {
            return Err(ProtocolError::InvalidTokenType(token as u8).into());
        }
        let skipped = feed.buffer.atomically(|b| {
            b.try_skip(1).and_then(|()| match token {
                TokenType::ReturnStatus => b.try_skip(4),
                token if token.is_done() => b.try_skip(Done::SIZE),
                _ => b
                    .try_get_u16_le()
                    .and_then(|len| b.try_skip(usize::from(len))),
            })
        });
        Ok(skipped.map(|()| token))
    }

    fn is_null_compressed(&self, index: usize) -> bool {
        self.state
            .null_bitmap
            .get(index / 8)
            .is_some_and(|bits| bits & (1 << (index % 8)) != 0)
    }

    fn process_column_header(
        &mut self,
        column: &ColumnData,
        index: usize,
    ) -> Result<Progress<ColumnHeader>> {
        if self.is_null_compressed(index) {
            return Ok(Progress::Done(ColumnHeader::NULL));
        }
        let mut feed = self.shared.state.lock();
        let prefix = try_progress!(Ok::<_, Error>(read_prefix(&mut feed.buffer, column)));
        let header = match prefix {
            Prefix::Null => ColumnHeader::NULL,
            Prefix::Length(length) => ColumnHeader::value(length),
            Prefix::Plp(total) => {
                self.state.plp = Some(PlpState { chunk_remaining: 0 });
                ColumnHeader::value(total)
            }
        };
        Ok(Progress::Done(header))
    }

    fn read_value(
        &mut self,
        cell: &mut SqlCell,
        column: &ColumnData,
        length: u64,
        _index: usize,
    ) -> Result<Progress<()>> {
        let mut feed = self.shared.state.lock();
        if column.is_plp() {
            let chunks = match self.state.plp {
                Some(plp) => try_progress!(Ok::<_, Error>(read_plp_chunks(
                    &mut feed.buffer,
                    plp.chunk_remaining
                ))),
                None => Vec::new(),
            };
            drop(feed);
            self.state.plp = None;
            decode::decode_plp_into(cell, column, chunks)?;
            return Ok(Progress::Done(()));
        }

        let data = try_progress!(Ok::<_, Error>(feed.buffer.try_take(to_len(length))));
        drop(feed);
        decode::decode_into(cell, column, data)?;
        Ok(Progress::Done(()))
    }

    fn skip_value(&mut self, column: &ColumnData, index: usize) -> Result<Progress<()>> {
        if self.is_null_compressed(index) {
            return Ok(Progress::Done(()));
        }
        if column.is_plp() {
            let header = try_progress!(self.process_column_header(column, index));
            if !header.is_null {
                try_progress!(self.skip_chunked_value(u64::MAX));
            }
            return Ok(Progress::Done(()));
        }
        let mut feed = self.shared.state.lock();
        Ok(feed.buffer.atomically(|b| {
            read_prefix(b, column).and_then(|prefix| match prefix {
                Prefix::Length(length) => b.try_skip(to_len(length)),
                Prefix::Null | Prefix::Plp(_) => Progress::Done(()),
            })
        }))
    }

    fn skip_bytes(&mut self, n: u64) -> Result<Progress<()>> {
        Ok(self.shared.state.lock().buffer.try_skip(to_len(n)))
    }

    fn skip_chunked_value(&mut self, max: u64) -> Result<Progress<u64>> {
        let mut feed = self.shared.state.lock();
        let mut skipped = 0u64;
        while skipped < max {
            let Some(mut plp) = self.state.plp else {
                break;
            };
            if plp.chunk_remaining == 0 {
                match feed.buffer.try_get_u32_le() {
                    Progress::Done(0) => {
                        self.state.plp = None;
                        break;
                    }
                    Progress::Done(len) => {
                        self.state.plp = Some(PlpState {
                            chunk_remaining: len,
                        });
                        continue;
                    }
                    Progress::NeedMoreData => return Ok(Progress::NeedMoreData),
                }
            }
            let want = (plp.chunk_remaining as usize).min(to_len(max - skipped));
            let n = feed.buffer.skip_up_to(want);
            if n == 0 {
                return Ok(Progress::NeedMoreData);
            }
            plp.chunk_remaining -= n as u32;
            self.state.plp = Some(plp);
            skipped += n as u64;
        }
        Ok(Progress::Done(skipped))
    }

    fn skip_row(&mut self, columns: &[ColumnData], start: usize) -> Result<Progress<()>> {
        for (index, column) in columns.iter().enumerate().skip(start) {
            try_progress!(self.skip_value(column, index));
        }
        Ok(Progress::Done(()))
    }

    fn read_chunk(&mut self, column: &ColumnData, max: usize) -> Result<Progress<Bytes>> {
        if max == 0 {
            return Ok(Progress::Done(Bytes::new()));
        }
        let mut feed = self.shared.state.lock();
        if !column.is_plp() {
            return Ok(feed.buffer.try_take_up_to(max));
        }
        loop {
            let Some(plp) = self.state.plp else {
                return Ok(Progress::Done(Bytes::new()));
            };
            if plp.chunk_remaining == 0 {
                match feed.buffer.try_get_u32_le() {
                    Progress::Done(0) => self.state.plp = None,
                    Progress::Done(len) => {
                        self.state.plp = Some(PlpState {
                            chunk_remaining: len,
                        });
                    }
                    Progress::NeedMoreData => return Ok(Progress::NeedMoreData),
                }
                continue;
            }
            let want = (plp.chunk_remaining as usize).min(max);
            let chunk = try_progress!(Ok::<_, Error>(feed.buffer.try_take_up_to(want)));
            self.state.plp = Some(PlpState {
                chunk_remaining: plp.chunk_remaining - chunk.len() as u32,
            });
            return Ok(Progress::Done(chunk));
        }
    }

    fn is_mid_plp(&self) -> bool {
        self.state.plp.is_some()
    }

    fn set_snapshot(&mut self) {
        self.shared.state.lock().buffer.set_snapshot();
        match &mut self.saved {
            Some(saved) => saved.clone_from(&self.state),
            None => self.saved = Some(self.state.clone()),
        }
    }

    fn prepare_replay(&mut self) {
        self.shared.state.lock().buffer.prepare_replay();
        if let Some(saved) = &self.saved {
            self.state.clone_from(saved);
        }
    }

    fn reset_snapshot(&mut self) {
        self.shared.state.lock().buffer.reset_snapshot();
        self.saved = None;
    }

    async fn wait_for_data(&mut self) -> Result<()> {
        loop {
            let notified = {
                let feed = self.shared.state.lock();
                if feed.generation != self.seen_generation {
                    self.seen_generation = feed.generation;
                    return Ok(());
                }
                if feed.closed {
                    return Err(ProtocolError::ConnectionClosed.into());
                }
                self.shared.data_arrived.notified()
            };
            notified.await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use tds_wire::packet::frame_payload;
    use tds_wire::{MAX_LENGTH_MARKER, RowWriter, TypeInfo};

    use super::*;

    fn column(type_id: TypeId, max_length: Option<u32>) -> ColumnData {
        ColumnData::new(
            "c",
            type_id,
            TypeInfo {
                max_length,
                ..TypeInfo::default()
            },
        )
    }

    fn header(parser: &mut BufferedParser, column: &ColumnData) -> ColumnHeader {
        match parser.process_column_header(column, 0).unwrap() {
            Progress::Done(header) => header,
            Progress::NeedMoreData => panic!("header not buffered"),
        }
    }

    #[test]
    fn test_null_markers_by_prefix_kind() {
        let varchar = column(TypeId::VarChar, Some(10));
        let intn = column(TypeId::IntN, Some(4));
        let nvarchar = column(TypeId::NVarChar, Some(20));
        let text = column(TypeId::Text, Some(100));
        let max = column(TypeId::BigVarBinary, Some(MAX_LENGTH_MARKER));

        let mut w = RowWriter::new();
        w.value(&varchar, None)
            .value(&varchar, Some(b""))
            .value(&intn, None)
            .value(&nvarchar, None)
            .value(&text, None)
            .value(&max, None);
        let mut parser = BufferedParser::from_payload(&w.to_payload());

        assert!(header(&mut parser, &varchar).is_null);
        assert_eq!(header(&mut parser, &varchar), ColumnHeader::value(0));
        assert!(header(&mut parser, &intn).is_null);
        assert!(header(&mut parser, &nvarchar).is_null);
        assert!(header(&mut parser, &text).is_null);
        assert!(header(&mut parser, &max).is_null);
        assert!(!parser.is_mid_plp());
        assert_eq!(parser.buffered_bytes(), 0);
    }

    #[test]
    fn test_text_pointer_header_skips_pointer_and_timestamp() {
        let text = column(TypeId::Text, Some(100));
        let mut w = RowWriter::new();
        w.value(&text, Some(b"hello"));
        let mut parser = BufferedParser::from_payload(&w.to_payload());

        assert_eq!(header(&mut parser, &text), ColumnHeader::value(5));
        let mut cell = SqlCell::new();
        assert!(parser.read_value(&mut cell, &text, 5, 0).unwrap().is_done());
        assert_eq!(cell.as_str().unwrap(), "hello");
    }

    #[test]
    fn test_plp_value_is_assembled_from_chunks() {
        let max = column(TypeId::BigVarBinary, Some(MAX_LENGTH_MARKER));
        let mut w = RowWriter::new();
        w.plp(None, &[b"ab", b"", b"cde"]);
        let mut parser = BufferedParser::from_payload(&w.to_payload());

        let h = header(&mut parser, &max);
        assert_eq!(h.remaining(&max), -1);
        assert!(parser.is_mid_plp());

        let mut cell = SqlCell::new();
        assert!(parser.read_value(&mut cell, &max, h.length, 0).unwrap().is_done());
        assert_eq!(cell.as_bytes().unwrap(), b"abcde");
        assert!(!parser.is_mid_plp());
    }

    #[test]
    fn test_plp_read_is_all_or_nothing() {
        let max = column(TypeId::BigVarBinary, Some(MAX_LENGTH_MARKER));
        let mut w = RowWriter::new();
        w.plp(Some(6), &[b"abc", b"def"]);
        let payload = w.to_payload();

        let (mut parser, feed) = BufferedParser::new(DEFAULT_PACKET_SIZE);
        feed.push_payload(&payload[..payload.len() - 3]).unwrap();

        let h = header(&mut parser, &max);
        let mut cell = SqlCell::new();
        assert!(parser.read_value(&mut cell, &max, h.length, 0).unwrap().is_pending());
        assert!(cell.is_empty());

        feed.push_payload(&payload[payload.len() - 3..]).unwrap();
        assert!(parser.read_value(&mut cell, &max, h.length, 0).unwrap().is_done());
        assert_eq!(cell.as_bytes().unwrap(), b"abcdef");
    }

    #[test]
    fn test_chunked_reads_and_skips() {
        let max = column(TypeId::BigVarBinary, Some(MAX_LENGTH_MARKER));
        let mut w = RowWriter::new();
        w.plp(None, &[b"0123", b"4567"]);
        let mut parser = BufferedParser::from_payload(&w.to_payload());
        header(&mut parser, &max);

        let chunk = parser.read_chunk(&max, 3).unwrap().done().unwrap();
        assert_eq!(&chunk[..], b"012");
        assert_eq!(parser.skip_chunked_value(2).unwrap(), Progress::Done(2));
        let chunk = parser.read_chunk(&max, 10).unwrap().done().unwrap();
        assert_eq!(&chunk[..], b"567");
        assert!(parser.read_chunk(&max, 10).unwrap().done().unwrap().is_empty());
        assert!(!parser.is_mid_plp());
    }

    #[test]
    fn test_nbc_row_bitmap() {
        let mut w = RowWriter::new();
        w.nbc_row(&[false, true, false, false, false, false, false, false, true]);
        let mut parser = BufferedParser::from_payload(&w.to_payload());

        assert!(parser.is_next_token_ready(9));
        assert_eq!(parser.begin_row(9).unwrap(), Progress::Done(RowToken::NbcRow));
        assert!(!parser.is_null_compressed(0));
        assert!(parser.is_null_compressed(1));
        assert!(parser.is_null_compressed(8));

        let int = column(TypeId::Int4, None);
        assert_eq!(
            parser.process_column_header(&int, 1).unwrap(),
            Progress::Done(ColumnHeader::NULL)
        );
    }

    #[test]
    fn test_skip_token_and_done() {
        let mut w = RowWriter::new();
        // INFO token with a 3-byte body, then RETURNSTATUS
        w.raw(&[0xAB, 0x03, 0x00, 1, 2, 3])
            .raw(&[0x79, 0, 0, 0, 0])
            .done(7);
        let mut parser = BufferedParser::from_payload(&w.to_payload());

        assert_eq!(parser.skip_token().unwrap(), Progress::Done(TokenType::Info));
        assert_eq!(
            parser.skip_token().unwrap(),
            Progress::Done(TokenType::ReturnStatus)
        );
        assert!(parser.is_next_token_ready(0));
        let done = parser.read_done().unwrap().done().unwrap();
        assert_eq!(done.row_count, 7);
        assert!(done.status.count);
    }

    #[test]
    fn test_row_token_cannot_be_skipped() {
        let mut w = RowWriter::new();
        w.row();
        let mut parser = BufferedParser::from_payload(&w.to_payload());
        assert!(matches!(
            parser.skip_token(),
            Err(Error::Protocol(ProtocolError::InvalidTokenType(0xD1)))
        ));
    }

    #[test]
    fn test_metadata_waits_for_complete_token() {
        let metadata = ColMetaData {
            columns: vec![
                column(TypeId::Int4, None),
                column(TypeId::BigVarBinary, Some(50)),
            ],
        };
        let mut w = RowWriter::new();
        w.metadata(&metadata);
        let payload = w.to_payload();

        let (mut parser, feed) = BufferedParser::new(DEFAULT_PACKET_SIZE);
        feed.push_payload(&payload[..payload.len() - 2]).unwrap();
        assert!(parser.read_metadata().unwrap().is_pending());
        assert_eq!(parser.buffered_bytes(), payload.len() - 2);

        feed.push_payload(&payload[payload.len() - 2..]).unwrap();
        let decoded = parser.read_metadata().unwrap().done().unwrap();
        assert_eq!(decoded.column_count(), 2);
        assert_eq!(parser.buffered_bytes(), 0);
    }

    #[test]
    fn test_replay_restores_plp_state() {
        let max = column(TypeId::BigVarBinary, Some(MAX_LENGTH_MARKER));
        let mut w = RowWriter::new();
        w.plp(None, &[b"abcd"]);
        let mut parser = BufferedParser::from_payload(&w.to_payload());

        parser.set_snapshot();
        header(&mut parser, &max);
        parser.read_chunk(&max, 2).unwrap().done().unwrap();
        assert!(parser.is_mid_plp());

        parser.prepare_replay();
        assert!(!parser.is_mid_plp());
        assert_eq!(header(&mut parser, &max), ColumnHeader::value(tds_wire::PLP_UNKNOWN_LENGTH));
        parser.reset_snapshot();
    }

    #[tokio::test]
    async fn test_wait_wakes_on_push() {
        let (mut parser, feed) = BufferedParser::new(512);
        let pusher = tokio::spawn(async move {
            tokio::task::yield_now().await;
            for packet in frame_payload(&[0xFD], 512) {
                feed.push_packet(&packet).unwrap();
            }
        });
        parser.wait_for_data().await.unwrap();
        pusher.await.unwrap();
        assert_eq!(parser.peek_next_token().unwrap(), Progress::Done(TokenType::Done));
    }

    #[tokio::test]
    async fn test_wait_fails_once_closed() {
        let (mut parser, feed) = BufferedParser::new(512);
        feed.close();
        assert!(matches!(
            parser.wait_for_data().await,
            Err(Error::Protocol(ProtocolError::ConnectionClosed))
        ));
        assert!(feed.push_payload(&[0]).is_err());
    }
}
