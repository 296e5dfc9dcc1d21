//! Wire-level error types.

use thiserror::Error;

/// Errors raised while interpreting TDS bytes.
///
/// Any of these means the byte stream no longer lines up with the reader's
/// idea of where it is, so callers treat them as fatal for the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Input ended in the middle of a structure that must be complete.
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// A packet header announced more bytes than were supplied.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// Unknown packet type byte.
    #[error("invalid packet type: 0x{0:02X}")]
    InvalidPacketType(u8),

    /// Unknown packet status bits.
    #[error("invalid packet status: 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// Token byte that is not valid at this position.
    #[error("invalid token type: 0x{0:02X}")]
    InvalidTokenType(u8),

    /// Column type byte this implementation cannot decode.
    #[error("unsupported column type: 0x{0:02X}")]
    UnsupportedType(u8),

    /// A length prefix that is impossible for the column type.
    #[error("invalid length {length} for type 0x{type_id:02X}")]
    InvalidLength {
        /// Raw column type byte.
        type_id: u8,
        /// Offending length.
        length: u64,
    },

    /// Malformed string data.
    #[error("string encoding error: {0}")]
    StringEncoding(String),

    /// The transport was closed while more bytes were still expected.
    #[error("connection closed while reading")]
    ConnectionClosed,
}
