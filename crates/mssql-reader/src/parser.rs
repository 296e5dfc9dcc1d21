//! The row-token parser seam.
//!
//! [`RowParser`] is everything the reader needs from the bytes underneath
//! it: token ids, row starts, column headers and values. Every step returns
//! [`Progress::NeedMoreData`] rather than blocking, and
//! [`RowParser::wait_for_data`] is the only suspension point. A parser keeps
//! a replay mark so the reader can rewind a step that ran out of bytes.

use async_trait::async_trait;
use bytes::Bytes;
use mssql_value::SqlCell;
use tds_wire::{ColMetaData, ColumnData, Done, PLP_UNKNOWN_LENGTH, Progress, TokenType};

use crate::error::Result;

/// Kind of row token that started the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowToken {
    /// ROW: every column carries its own null marker.
    Row,
    /// NBCROW: nulls are flagged in a bitmap before the values.
    NbcRow,
    /// ALTROW of the given compute clause.
    AltRow(u16),
}

/// Null marker and length read from a column header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnHeader {
    /// The value is null.
    pub is_null: bool,
    /// Value length in bytes. For PLP columns, the announced total, which
    /// may be [`PLP_UNKNOWN_LENGTH`].
    pub length: u64,
}

impl ColumnHeader {
    /// Header of a null value.
    pub const NULL: Self = Self {
        is_null: true,
        length: 0,
    };

    /// Header of a value of `length` bytes.
    #[must_use]
    pub const fn value(length: u64) -> Self {
        Self {
            is_null: false,
            length,
        }
    }

    /// Bytes of the value still to read, `-1` when unknown.
    #[must_use]
    pub fn remaining(&self, column: &ColumnData) -> i64 {
        if self.is_null {
            return 0;
        }
        if column.is_plp() && self.length == PLP_UNKNOWN_LENGTH {
            return -1;
        }
        i64::try_from(self.length).unwrap_or(-1)
    }
}

/// Row-level parsing over a buffered token stream.
#[async_trait]
pub trait RowParser: Send {
    /// Negotiated packet size.
    fn packet_size(&self) -> usize;

    /// De-framed bytes available without waiting.
    fn buffered_bytes(&self) -> usize;

    /// Returns whether a split packet header is waiting for its tail.
    fn has_partial_packet_header(&self) -> bool;

    /// Complete a split packet header.
    fn finish_partial_packet_header(&mut self) -> Result<Progress<()>>;

    /// Identify the next token without consuming it.
    fn peek_next_token(&mut self) -> Result<Progress<TokenType>>;

    /// Returns whether the next token is a row start, a DONE or a
    /// COLMETADATA, and is buffered in full for `column_count` columns.
    fn is_next_token_ready(&self, column_count: usize) -> bool;

    /// Consume a COLMETADATA token.
    fn read_metadata(&mut self) -> Result<Progress<ColMetaData>>;

    /// Consume a row token, and the null bitmap of an NBCROW.
    fn begin_row(&mut self, column_count: usize) -> Result<Progress<RowToken>>;

    /// Consume a DONE, DONEPROC or DONEINPROC token.
    fn read_done(&mut self) -> Result<Progress<Done>>;

    /// Consume a token the reader does not interpret.
    fn skip_token(&mut self) -> Result<Progress<TokenType>>;

    /// Returns whether column `index` of the current NBCROW is null.
    fn is_null_compressed(&self, index: usize) -> bool;

    /// Consume the null marker and length of column `index`.
    fn process_column_header(
        &mut self,
        column: &ColumnData,
        index: usize,
    ) -> Result<Progress<ColumnHeader>>;

    /// Consume the value whose header announced `length` bytes and decode
    /// it into `cell`.
    ///
    /// A decode failure is reported only after the value's bytes have been
    /// consumed, so the stream stays in step.
    fn read_value(
        &mut self,
        cell: &mut SqlCell,
        column: &ColumnData,
        length: u64,
        index: usize,
    ) -> Result<Progress<()>>;

    /// Consume column `index`, header and value, without decoding it.
    fn skip_value(&mut self, column: &ColumnData, index: usize) -> Result<Progress<()>>;

    /// Consume `n` bytes of the current value.
    fn skip_bytes(&mut self, n: u64) -> Result<Progress<()>>;

    /// Consume up to `max` bytes of the current PLP value.
    ///
    /// Completes once `max` bytes were skipped or the value ended, with the
    /// number of bytes skipped.
    fn skip_chunked_value(&mut self, max: u64) -> Result<Progress<u64>>;

    /// Consume columns `start..` of the current row.
    fn skip_row(&mut self, columns: &[ColumnData], start: usize) -> Result<Progress<()>>;

    /// Read at most `max` bytes of the current value. An empty result means
    /// the value ended.
    fn read_chunk(&mut self, column: &ColumnData, max: usize) -> Result<Progress<Bytes>>;

    /// Returns whether a PLP value has been started but not finished.
    fn is_mid_plp(&self) -> bool;

    /// Pin the current position as the replay point.
    fn set_snapshot(&mut self);

    /// Rewind to the replay point.
    fn prepare_replay(&mut self);

    /// Drop the replay point.
    fn reset_snapshot(&mut self);

    /// Wait until more bytes may be available.
    async fn wait_for_data(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use tds_wire::{MAX_LENGTH_MARKER, TypeId, TypeInfo};

    use super::*;

    #[test]
    fn test_remaining() {
        let int = ColumnData::new("i", TypeId::Int4, TypeInfo::default());
        let max = ColumnData::new(
            "m",
            TypeId::BigVarBinary,
            TypeInfo {
                max_length: Some(MAX_LENGTH_MARKER),
                ..TypeInfo::default()
            },
        );

        assert_eq!(ColumnHeader::value(4).remaining(&int), 4);
        assert_eq!(ColumnHeader::NULL.remaining(&int), 0);
        assert_eq!(ColumnHeader::value(PLP_UNKNOWN_LENGTH).remaining(&max), -1);
        assert_eq!(ColumnHeader::value(100).remaining(&max), 100);
    }
}
