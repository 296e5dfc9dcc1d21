//! De-framed receive buffer with a replay mark.
//!
//! Packets arrive as framed TDS packets: an 8-byte header followed by up to
//! `packet_size - 8` payload bytes. [`PacketBuffer`] strips the framing as
//! bytes are pushed, so readers see one continuous token stream. A packet
//! header may itself be split across pushes; the partial header is kept
//! until the rest of it arrives.
//!
//! Every read is all-or-nothing: it either consumes exactly the bytes it
//! reports or returns [`Progress::NeedMoreData`] and leaves the position
//! untouched. A snapshot mark pins the bytes after it so a suspended read can
//! be replayed from the mark once more data has been pushed.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::packet::{DEFAULT_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader};
use crate::progress::Progress;

/// Consumed bytes are compacted away once this many accumulate.
const COMPACT_THRESHOLD: usize = 8 * 1024;

/// Receive buffer holding the de-framed payload of one response.
#[derive(Debug)]
pub struct PacketBuffer {
    data: BytesMut,
    pos: usize,
    mark: Option<usize>,
    partial_header: [u8; PACKET_HEADER_SIZE],
    partial_header_len: usize,
    in_packet_remaining: usize,
    packet_size: usize,
    end_of_message: bool,
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_SIZE)
    }
}

impl PacketBuffer {
    /// Create an empty buffer for packets of the negotiated size.
    #[must_use]
    pub fn new(packet_size: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(packet_size),
            pos: 0,
            mark: None,
            partial_header: [0; PACKET_HEADER_SIZE],
            partial_header_len: 0,
            in_packet_remaining: 0,
            packet_size,
            end_of_message: false,
        }
    }

    /// Negotiated packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Push framed packet bytes. Packet boundaries need not align with pushes.
    pub fn push_raw(&mut self, mut src: &[u8]) -> Result<(), ProtocolError> {
        while !src.is_empty() {
            if self.in_packet_remaining > 0 {
                let n = self.in_packet_remaining.min(src.len());
                self.data.extend_from_slice(&src[..n]);
                self.in_packet_remaining -= n;
                src = &src[n..];
                continue;
            }

            let n = (PACKET_HEADER_SIZE - self.partial_header_len).min(src.len());
            self.partial_header[self.partial_header_len..self.partial_header_len + n]
                .copy_from_slice(&src[..n]);
            self.partial_header_len += n;
            src = &src[n..];

            if self.partial_header_len == PACKET_HEADER_SIZE {
                let header = PacketHeader::decode(&mut &self.partial_header[..])?;
                self.partial_header_len = 0;
                self.in_packet_remaining = header.payload_length();
                self.end_of_message = header.is_end_of_message();
            }
        }
        Ok(())
    }

    /// Push payload bytes that carry no packet framing.
    pub fn push_payload(&mut self, src: &[u8]) {
        self.data.extend_from_slice(src);
    }

    /// Returns whether an incomplete packet header is pending.
    #[must_use]
    pub fn has_partial_packet_header(&self) -> bool {
        self.partial_header_len > 0
    }

    /// Complete a split packet header, or report that its tail is missing.
    ///
    /// Headers are reassembled as bytes are pushed, so this only has to wait.
    pub fn finish_partial_packet_header(&self) -> Progress<()> {
        if self.has_partial_packet_header() {
            Progress::NeedMoreData
        } else {
            Progress::Done(())
        }
    }

    /// Returns whether the last packet of the response has been fully pushed.
    #[must_use]
    pub fn is_message_complete(&self) -> bool {
        self.end_of_message && self.in_packet_remaining == 0 && self.partial_header_len == 0
    }

    /// Unread payload bytes.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Read position relative to the retained bytes.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Pin the current position as the replay point.
    pub fn set_snapshot(&mut self) {
        self.compact_to(self.pos);
        self.mark = Some(self.pos);
    }

    /// Rewind to the replay point.
    pub fn prepare_replay(&mut self) {
        if let Some(mark) = self.mark {
            self.pos = mark;
        }
    }

    /// Drop the replay point.
    pub fn reset_snapshot(&mut self) {
        self.mark = None;
        self.compact_to(self.pos);
    }

    fn compact_to(&mut self, keep_from: usize) {
        let keep_from = self.mark.map_or(keep_from, |mark| mark.min(keep_from));
        if keep_from >= COMPACT_THRESHOLD || (keep_from > 0 && keep_from == self.data.len()) {
            self.data.advance(keep_from);
            self.pos -= keep_from;
            self.mark = self.mark.map(|mark| mark - keep_from);
        }
    }

    /// The unread bytes, without consuming them.
    #[must_use]
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn ensure(&self, n: usize) -> bool {
        self.buffered_bytes() >= n
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> Progress<u8> {
        if !self.ensure(1) {
            return Progress::NeedMoreData;
        }
        Progress::Done(self.data[self.pos])
    }

    /// Read one byte.
    pub fn try_get_u8(&mut self) -> Progress<u8> {
        self.try_take_array::<1>().map(|b| b[0])
    }

    /// Read a little-endian `u16`.
    pub fn try_get_u16_le(&mut self) -> Progress<u16> {
        self.try_take_array().map(u16::from_le_bytes)
    }

    /// Read a little-endian `u32`.
    pub fn try_get_u32_le(&mut self) -> Progress<u32> {
        self.try_take_array().map(u32::from_le_bytes)
    }

    /// Read a little-endian `u64`.
    pub fn try_get_u64_le(&mut self) -> Progress<u64> {
        self.try_take_array().map(u64::from_le_bytes)
    }

    fn try_take_array<const N: usize>(&mut self) -> Progress<[u8; N]> {
        if !self.ensure(N) {
            return Progress::NeedMoreData;
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Progress::Done(out)
    }

    /// Read exactly `n` bytes.
    pub fn try_take(&mut self, n: usize) -> Progress<Bytes> {
        if !self.ensure(n) {
            return Progress::NeedMoreData;
        }
        let out = Bytes::copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Progress::Done(out)
    }

    /// Read up to `max` bytes, at least one. `NeedMoreData` when empty.
    pub fn try_take_up_to(&mut self, max: usize) -> Progress<Bytes> {
        let n = self.buffered_bytes().min(max);
        if n == 0 && max > 0 {
            return Progress::NeedMoreData;
        }
        self.try_take(n)
    }

    /// Skip exactly `n` bytes.
    pub fn try_skip(&mut self, n: usize) -> Progress<()> {
        if !self.ensure(n) {
            return Progress::NeedMoreData;
        }
        self.pos += n;
        Progress::Done(())
    }

    /// Skip up to `max` bytes, returning how many were skipped.
    pub fn skip_up_to(&mut self, max: usize) -> usize {
        let n = self.buffered_bytes().min(max);
        self.pos += n;
        n
    }

    /// Run a compound read that either completes or leaves the position
    /// where it started.
    pub fn atomically<T>(&mut self, f: impl FnOnce(&mut Self) -> Progress<T>) -> Progress<T> {
        let start = self.pos;
        let result = f(self);
        if result.is_pending() {
            self.pos = start;
        }
        result
    }
}
