//! Column read cursor and the row-level state a suspension captures.
//!
//! Columns of a row are a flat byte sequence, so the reader tracks two
//! positions: the next column whose header (null marker and length) has not
//! been consumed, and the next column whose value has not been materialized
//! into its cell. A header-only read leaves the data cursor one column
//! behind so the value can be streamed in chunks.
//!
//! ```text
//! next_data <= next_header <= column_count
//! ```

use std::sync::Arc;

use smallvec::SmallVec;
use tds_wire::ColMetaData;

use crate::error::{Error, Result};
use crate::stream::StreamState;

/// Position of the reader within the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnCursor {
    /// Next column whose header has not been consumed.
    pub next_header: usize,
    /// Next column whose value has not been materialized.
    pub next_data: usize,
    /// Unread value bytes of the column at `next_data`, `-1` when unknown.
    pub bytes_remaining: i64,
    /// A row is positioned and has not been drained.
    pub data_ready: bool,
}

impl Default for ColumnCursor {
    fn default() -> Self {
        Self {
            next_header: 0,
            next_data: 0,
            bytes_remaining: -1,
            data_ready: false,
        }
    }
}

impl ColumnCursor {
    /// Back to the start of a row. `data_ready` is left alone.
    pub fn reset(&mut self) {
        self.next_header = 0;
        self.next_data = 0;
        self.bytes_remaining = -1;
    }

    /// Returns whether a column's header was read without its value.
    #[must_use]
    pub fn has_partial_column(&self) -> bool {
        self.next_data < self.next_header
    }

    pub(crate) fn debug_check(&self, column_count: usize) {
        debug_assert!(
            self.next_data <= self.next_header && self.next_header <= column_count,
            "cursor out of order: {self:?} for {column_count} columns"
        );
    }
}

/// Whether the current row comes from a compute clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AltRowStatus {
    /// An ordinary row, or no row.
    #[default]
    None,
    /// An ALTROW is positioned; holds the result metadata to restore after it.
    Active(Arc<ColMetaData>),
}

/// Row-level flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFlags {
    /// Single-row mode returned its row; the rest of the result is skipped.
    pub halt_read: bool,
    /// The result's COLMETADATA has been consumed.
    pub metadata_consumed: bool,
    /// TABNAME/COLINFO browse tokens have been consumed.
    pub browse_info_consumed: bool,
    /// At least one row was returned.
    pub has_rows: bool,
    /// Compute-clause row status.
    pub alt_row_status: AltRowStatus,
    /// The DONE token closing the result has been consumed.
    pub result_done: bool,
}

/// Compute-clause metadata sets, keyed by ALTROW id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AltMetaData {
    sets: Vec<(u16, Arc<ColMetaData>)>,
}

impl AltMetaData {
    /// Add or replace the metadata of compute clause `id`.
    pub fn insert(&mut self, id: u16, metadata: ColMetaData) {
        let metadata = Arc::new(metadata);
        match self.sets.iter_mut().find(|(set_id, _)| *set_id == id) {
            Some(slot) => slot.1 = metadata,
            None => self.sets.push((id, metadata)),
        }
    }

    /// Metadata of compute clause `id`.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<Arc<ColMetaData>> {
        self.sets
            .iter()
            .find(|(set_id, _)| *set_id == id)
            .map(|(_, metadata)| Arc::clone(metadata))
    }

    /// Returns whether no compute clauses are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Everything a suspended read must be able to restore.
#[derive(Debug, Clone)]
pub(crate) struct ReadState {
    pub(crate) cursor: ColumnCursor,
    pub(crate) column_data_bytes_read: u64,
    pub(crate) last_chunk_column: Option<usize>,
    pub(crate) flags: RowFlags,
    pub(crate) metadata: Arc<ColMetaData>,
    pub(crate) alt_metadata: Arc<AltMetaData>,
    pub(crate) table_names: Arc<[String]>,
    pub(crate) stream: Option<StreamState>,
    pub(crate) unreadable: SmallVec<[usize; 2]>,
}

impl ReadState {
    pub(crate) fn new(metadata: Arc<ColMetaData>) -> Self {
        Self {
            cursor: ColumnCursor::default(),
            column_data_bytes_read: 0,
            last_chunk_column: None,
            flags: RowFlags {
                metadata_consumed: true,
                ..RowFlags::default()
            },
            metadata,
            alt_metadata: Arc::default(),
            table_names: Arc::from(Vec::new()),
            stream: None,
            unreadable: SmallVec::new(),
        }
    }

    pub(crate) fn column_count(&self) -> usize {
        self.metadata.column_count()
    }

    /// Start-of-row reset. Row-level flags survive.
    pub(crate) fn reset_row(&mut self) {
        self.cursor.reset();
        self.column_data_bytes_read = 0;
        self.last_chunk_column = None;
        self.stream = None;
        self.unreadable.clear();
    }

    fn has_stream_on(&self, index: usize) -> bool {
        self.stream.as_ref().is_some_and(|s| s.column == index)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let count = self.column_count();
        if count == 0 {
            return Err(Error::NoData);
        }
        if index >= count {
            return Err(Error::IndexOutOfRange { index, count });
        }
        Ok(())
    }

    /// Validate a header-only access to `index`.
    pub(crate) fn check_header_ready(&self, index: usize, sequential: bool) -> Result<()> {
        self.check_index(index)?;
        if !self.cursor.data_ready {
            return Err(Error::NoData);
        }
        let chunked_past = self.last_chunk_column.is_some_and(|last| last > index);
        if sequential && (self.cursor.next_header > index + 1 || chunked_past) {
            let current = self
                .cursor
                .next_header
                .saturating_sub(1)
                .max(self.last_chunk_column.unwrap_or(0));
            return Err(Error::NonSequentialColumnAccess {
                requested: index,
                current,
            });
        }
        Ok(())
    }

    /// Validate a value access to `index`.
    ///
    /// `allow_partial` permits a column whose bytes are being streamed, as
    /// long as no stream or text reader is still open on it.
    pub(crate) fn check_data_ready(
        &self,
        index: usize,
        sequential: bool,
        allow_partial: bool,
    ) -> Result<()> {
        self.check_index(index)?;
        if !self.cursor.data_ready {
            return Err(Error::NoData);
        }
        if !sequential {
            return Ok(());
        }
        let last = self.last_chunk_column;
        let behind = self.cursor.next_data > index
            || last.is_some_and(|l| l > index)
            || (!allow_partial && last == Some(index))
            || (allow_partial && self.has_stream_on(index));
        if behind {
            let current = self
                .cursor
                .next_data
                .max(last.map_or(0, |l| l + 1));
            return Err(Error::NonSequentialColumnAccess {
                requested: index,
                current,
            });
        }
        Ok(())
    }
}
