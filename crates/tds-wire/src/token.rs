//! Token vocabulary of a tabular result stream.
//!
//! A result is a sequence of tokens: a COLMETADATA token followed by ROW or
//! NBCROW tokens and closed by a DONE token. Compute clauses interleave
//! ALTMETADATA and ALTROW tokens.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Token type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Alternate (compute) metadata (ALTMETADATA).
    AltMetaData = 0x88,
    /// Table name (TABNAME).
    TabName = 0xA4,
    /// Column info (COLINFO).
    ColInfo = 0xA5,
    /// Order (ORDER).
    Order = 0xA9,
    /// Error message (ERROR).
    Error = 0xAA,
    /// Informational message (INFO).
    Info = 0xAB,
    /// Return status (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Row data (ROW).
    Row = 0xD1,
    /// Null bitmap compressed row (NBCROW).
    NbcRow = 0xD2,
    /// Alternate (compute) row (ALTROW).
    AltRow = 0xD3,
    /// Done (DONE).
    Done = 0xFD,
    /// Done procedure (DONEPROC).
    DoneProc = 0xFE,
    /// Done in procedure (DONEINPROC).
    DoneInProc = 0xFF,
}

impl TokenType {
    /// Create a token type from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x81 => Some(Self::ColMetaData),
            0x88 => Some(Self::AltMetaData),
            0xA4 => Some(Self::TabName),
            0xA5 => Some(Self::ColInfo),
            0xA9 => Some(Self::Order),
            0xAA => Some(Self::Error),
            0xAB => Some(Self::Info),
            0x79 => Some(Self::ReturnStatus),
            0xD1 => Some(Self::Row),
            0xD2 => Some(Self::NbcRow),
            0xD3 => Some(Self::AltRow),
            0xFD => Some(Self::Done),
            0xFE => Some(Self::DoneProc),
            0xFF => Some(Self::DoneInProc),
            _ => None,
        }
    }

    /// Returns whether this token starts a row.
    #[must_use]
    pub const fn is_row(&self) -> bool {
        matches!(self, Self::Row | Self::NbcRow | Self::AltRow)
    }

    /// Returns whether this token ends a result.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done | Self::DoneProc | Self::DoneInProc)
    }
}

/// Number of bytes in the NBCROW null bitmap for `column_count` columns.
#[must_use]
pub const fn null_bitmap_len(column_count: usize) -> usize {
    column_count.div_ceil(8)
}

/// Done token status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoneStatus {
    /// More results follow.
    pub more: bool,
    /// Error occurred.
    pub error: bool,
    /// Transaction in progress.
    pub in_xact: bool,
    /// Row count is valid.
    pub count: bool,
    /// Attention acknowledgment.
    pub attn: bool,
}

impl DoneStatus {
    const MORE: u16 = 0x0001;
    const ERROR: u16 = 0x0002;
    const IN_XACT: u16 = 0x0004;
    const COUNT: u16 = 0x0010;
    const ATTN: u16 = 0x0020;

    /// Parse done status from raw bits.
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        Self {
            more: bits & Self::MORE != 0,
            error: bits & Self::ERROR != 0,
            in_xact: bits & Self::IN_XACT != 0,
            count: bits & Self::COUNT != 0,
            attn: bits & Self::ATTN != 0,
        }
    }

    /// Convert to raw bits.
    #[must_use]
    pub fn to_bits(&self) -> u16 {
        [
            (self.more, Self::MORE),
            (self.error, Self::ERROR),
            (self.in_xact, Self::IN_XACT),
            (self.count, Self::COUNT),
            (self.attn, Self::ATTN),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .fold(0, |bits, (_, bit)| bits | bit)
    }
}

/// Done token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Done {
    /// Status flags.
    pub status: DoneStatus,
    /// Current command.
    pub cur_cmd: u16,
    /// Row count (if status.count is set).
    pub row_count: u64,
}

impl Done {
    /// Size of the DONE token body in bytes.
    pub const SIZE: usize = 12;

    /// Decode a DONE token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: Self::SIZE,
                actual: src.remaining(),
            });
        }

        Ok(Self {
            status: DoneStatus::from_bits(src.get_u16_le()),
            cur_cmd: src.get_u16_le(),
            row_count: src.get_u64_le(),
        })
    }

    /// Encode the DONE token including its token byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::Done as u8);
        dst.put_u16_le(self.status.to_bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }
}
