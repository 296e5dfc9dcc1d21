//! # tds-wire
//!
//! Wire-level vocabulary for reading SQL Server result rows.
//!
//! This crate describes the bytes of a tabular result: column types and
//! metadata, TDS packet framing, and token ids. [`PacketBuffer`] turns a
//! stream of framed packets into one de-framed payload that row readers can
//! consume with all-or-nothing reads, reporting [`Progress::NeedMoreData`]
//! instead of blocking when bytes are missing.
//!
//! The crate is IO-agnostic and has no async runtime dependency.
//!
//! ## Features
//!
//! - `encoding` (default): collation-aware `VARCHAR` code pages via `encoding_rs`
//!
//! ## Example
//!
//! ```rust
//! use tds_wire::{PacketBuffer, Progress};
//! use tds_wire::packet::frame_payload;
//!
//! let mut buffer = PacketBuffer::new(512);
//! for packet in frame_payload(&[0x2A, 0x00, 0x00, 0x00], 512) {
//!     buffer.push_raw(&packet).unwrap();
//! }
//! assert_eq!(buffer.try_get_u32_le(), Progress::Done(42));
//! assert!(buffer.try_get_u8().is_pending());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod codec;
pub mod collation;
pub mod error;
pub mod metadata;
pub mod packet;
pub mod progress;
pub mod rows;
pub mod token;
pub mod types;

pub use buffer::PacketBuffer;
pub use error::ProtocolError;
pub use metadata::{
    ColMetaData, Collation, ColumnData, LengthPrefix, MAX_LENGTH_MARKER, TypeInfo,
    USER_TYPE_ROW_VERSION,
};
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus,
    PacketType,
};
pub use progress::Progress;
pub use rows::{PLP_NULL, PLP_UNKNOWN_LENGTH, RowWriter};
pub use token::{Done, DoneStatus, TokenType};
pub use types::{ColumnFlags, TypeId};
