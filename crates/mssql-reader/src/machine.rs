//! The row read state machine.
//!
//! Every operation is a step returning `Result<Progress<T>>`. Synchronous
//! calls run a step once and treat [`Progress::NeedMoreData`] as a protocol
//! bug; asynchronous calls hand the step to a [`Continuation`] which waits
//! for data and replays it from the last snapshot.

use std::sync::Arc;

use bytes::Bytes;
use mssql_value::{RowBuffer, SqlCell, SqlValue, TypeError, decode};
use tds_wire::{ColMetaData, Done, Progress, ProtocolError, TokenType, try_progress};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, debug_span, trace, warn};

use crate::config::ReaderConfig;
use crate::connection::ConnectionContext;
use crate::continuation::{Continuation, Resumable};
use crate::cursor::{AltRowStatus, ColumnCursor, ReadState};
use crate::error::{Error, Result};
use crate::instrumentation::{attributes, span_names};
use crate::parser::{RowParser, RowToken};
use crate::snapshot::Snapshot;
use crate::stream::{StreamKind, StreamState, Utf16ChunkDecoder};

/// Largest chunk a text reader decodes at once.
const TEXT_CHUNK_SIZE: usize = 8 * 1024;

pub(crate) struct ReaderCore<P> {
    parser: P,
    config: ReaderConfig,
    connection: Arc<ConnectionContext>,
    state: ReadState,
    row: RowBuffer,
    spare_row: Option<RowBuffer>,
    snapshot: Option<Box<Snapshot>>,
    closed: bool,
    next_stream_id: u64,
    rows_affected: Option<u64>,
}

impl<P: RowParser> ReaderCore<P> {
    pub(crate) fn new(
        parser: P,
        metadata: ColMetaData,
        config: ReaderConfig,
        connection: Arc<ConnectionContext>,
    ) -> Self {
        let columns = metadata.column_count();
        Self {
            parser,
            config,
            connection,
            state: ReadState::new(Arc::new(metadata)),
            row: RowBuffer::new(columns),
            spare_row: None,
            snapshot: None,
            closed: false,
            next_stream_id: 0,
            rows_affected: None,
        }
    }

    pub(crate) fn set_alt_metadata(&mut self, id: u16, metadata: ColMetaData) {
        Arc::make_mut(&mut self.state.alt_metadata).insert(id, metadata);
    }

    pub(crate) fn set_table_names(&mut self, names: Vec<String>) {
        self.state.table_names = Arc::from(names);
        self.state.flags.browse_info_consumed = true;
    }

    pub(crate) fn metadata(&self) -> &Arc<ColMetaData> {
        &self.state.metadata
    }

    pub(crate) fn table_names(&self) -> &Arc<[String]> {
        &self.state.table_names
    }

    pub(crate) fn cursor(&self) -> ColumnCursor {
        self.state.cursor
    }

    pub(crate) fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub(crate) fn into_parser(self) -> P {
        self.parser
    }

    pub(crate) fn has_rows(&mut self) -> Result<bool> {
        self.check_open()?;
        if self.state.flags.has_rows {
            return Ok(true);
        }
        if self.state.flags.result_done {
            return Ok(false);
        }
        // No row positioned yet, so the parser sits between tokens.
        loop {
            let Progress::Done(token) = self.parser.peek_next_token()? else {
                return Ok(false);
            };
            match token {
                TokenType::TabName | TokenType::ColInfo => {
                    if self.parser.skip_token()?.is_pending() {
                        return Ok(false);
                    }
                    self.state.flags.browse_info_consumed = true;
                }
                TokenType::Order | TokenType::Error | TokenType::Info | TokenType::ReturnStatus => {
                    if self.parser.skip_token()?.is_pending() {
                        return Ok(false);
                    }
                }
                token => return Ok(token.is_row()),
            }
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ReaderClosed);
        }
        Ok(())
    }

    fn sequential(&self) -> bool {
        self.config.is_sequential()
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.command_timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Column count of the result's own metadata, even during an ALTROW.
    fn main_column_count(&self) -> usize {
        match &self.state.flags.alt_row_status {
            AltRowStatus::Active(main) => main.column_count(),
            AltRowStatus::None => self.state.column_count(),
        }
    }

    fn last_column(&self) -> Option<usize> {
        self.state.column_count().checked_sub(1)
    }

    // =========================================================================
    // Suspension plumbing
    // =========================================================================

    fn checkpoint(&mut self) {
        if let Some(snapshot) = &mut self.snapshot {
            snapshot.capture(&self.state);
            self.parser.set_snapshot();
        }
        self.state.cursor.debug_check(self.state.column_count());
    }

    fn run_sync<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<Progress<T>>) -> Result<T> {
        let result = step(self);
        debug_assert!(
            !matches!(result, Ok(Progress::NeedMoreData)),
            "synchronous read ran out of buffered data"
        );
        match result {
            Ok(Progress::Done(value)) => Ok(value),
            Ok(Progress::NeedMoreData) => {
                let error = Error::SynchronousCallMayNotPend;
                self.doom(&error);
                Err(error)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        if error.is_fatal() {
            self.doom(&error);
        }
        error
    }

    fn doom(&mut self, error: &Error) {
        warn!(error = %error, "closing reader and breaking connection");
        self.closed = true;
        self.state.cursor.data_ready = false;
        self.state.stream = None;
        self.connection.mark_broken();
    }

    fn fit_row_buffer(&mut self) -> bool {
        let count = self.state.column_count();
        if self.row.len() == count {
            return false;
        }
        let next = match self.spare_row.take() {
            Some(spare) if spare.len() == count => spare,
            _ => RowBuffer::new(count),
        };
        self.spare_row = Some(std::mem::replace(&mut self.row, next));
        self.row.clear();
        true
    }

    fn restore_main_metadata(&mut self) {
        if let AltRowStatus::Active(main) = std::mem::take(&mut self.state.flags.alt_row_status) {
            self.state.metadata = main;
            self.fit_row_buffer();
        }
    }

    fn finish_result(&mut self, done: Done) {
        if done.status.count {
            self.rows_affected = Some(done.row_count);
            Span::current().record(attributes::DB_ROWS_AFFECTED, done.row_count);
        }
        self.state.flags.result_done = true;
        debug!(rows_affected = ?self.rows_affected, "result complete");
    }

    // =========================================================================
    // Steps
    // =========================================================================

    fn try_read_column(&mut self, index: usize, header_only: bool) -> Result<Progress<()>> {
        let cursor = self.state.cursor;
        if index < cursor.next_header {
            if index == cursor.next_data && !header_only {
                return self.try_read_column_data();
            }
            return Ok(Progress::Done(()));
        }

        let sequential = self.sequential();
        if sequential {
            if let Some(cell) = cursor
                .next_data
                .checked_sub(1)
                .and_then(|previous| self.row.get_mut(previous))
            {
                cell.clear();
            }
            if self.state.last_chunk_column.is_some_and(|last| last < index) {
                self.state.stream = None;
            }
        } else if cursor.has_partial_column() {
            try_progress!(self.try_read_column_data());
        }
        try_progress!(self.try_reset_blob_state());

        let metadata = Arc::clone(&self.state.metadata);
        while self.state.cursor.next_header <= index {
            let current = self.state.cursor.next_header;
            let column = &metadata.columns[current];

            if sequential && current < index {
                trace!(column = current, "skipping column");
                try_progress!(self.parser.skip_value(column, current));
                self.state.cursor.next_header = current + 1;
                self.state.cursor.next_data = current + 1;
                self.checkpoint();
                continue;
            }

            let header = try_progress!(self.parser.process_column_header(column, current));
            trace!(column = current, is_null = header.is_null, length = header.length, "column header");
            self.state.cursor.next_data = current;
            self.state.cursor.next_header = current + 1;

            let legacy_null = header.is_null
                && self.config.legacy_rowversion_null_behavior
                && column.is_row_version();
            if header.is_null && !legacy_null {
                decode::set_null(&mut self.row[current], column);
                self.state.cursor.next_data = current + 1;
                self.state.cursor.bytes_remaining = 0;
            } else if current < index || !header_only {
                let length = if legacy_null { 0 } else { header.length };
                try_progress!(self.try_decode(current, length));
            } else {
                self.state.cursor.bytes_remaining = header.remaining(column);
            }
            self.checkpoint();
        }
        Ok(Progress::Done(()))
    }

    /// Materialize the column whose header was read without its value.
    fn try_read_column_data(&mut self) -> Result<Progress<()>> {
        let index = self.state.cursor.next_data;
        let length = u64::try_from(self.state.cursor.bytes_remaining).unwrap_or(0);
        try_progress!(self.try_decode(index, length));
        self.checkpoint();
        Ok(Progress::Done(()))
    }

    fn try_decode(&mut self, index: usize, length: u64) -> Result<Progress<()>> {
        let metadata = Arc::clone(&self.state.metadata);
        let column = &metadata.columns[index];
        match self.parser.read_value(&mut self.row[index], column, length, index) {
            Ok(Progress::Done(())) => {}
            Ok(Progress::NeedMoreData) => return Ok(Progress::NeedMoreData),
            Err(Error::Type(e)) => {
                debug!(column = index, error = %e, "column value could not be decoded");
                self.state.cursor.next_data = index + 1;
                self.state.cursor.bytes_remaining = 0;
                self.state.unreadable.push(index);
                self.row[index].clear();
                return Err(Error::Type(e));
            }
            Err(e) => return Err(e),
        }
        self.state.cursor.next_data = index + 1;
        self.state.cursor.bytes_remaining = 0;
        Ok(Progress::Done(()))
    }

    /// Decode every column up to `last`, recording decode failures instead
    /// of stopping at them.
    fn try_materialize_through(&mut self, last: usize) -> Result<Progress<()>> {
        loop {
            match self.try_read_column(last, false) {
                Ok(progress) => return Ok(progress),
                Err(Error::Type(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Skip the unread remainder of a column read header-only.
    fn try_reset_blob_state(&mut self) -> Result<Progress<()>> {
        let cursor = self.state.cursor;
        if cursor.has_partial_column() {
            let metadata = Arc::clone(&self.state.metadata);
            let column = &metadata.columns[cursor.next_data];
            if column.is_plp() {
                if self.parser.is_mid_plp() {
                    try_progress!(self.parser.skip_chunked_value(u64::MAX));
                }
            } else if cursor.bytes_remaining > 0 {
                try_progress!(self.parser.skip_bytes(cursor.bytes_remaining.unsigned_abs()));
            }
            self.state.cursor.next_data = cursor.next_header;
        }
        self.state.cursor.bytes_remaining = 0;
        self.state.column_data_bytes_read = 0;
        Ok(Progress::Done(()))
    }

    /// Drain whatever is left of the current row.
    fn try_clean_partial_read(&mut self) -> Result<Progress<()>> {
        let _span = debug_span!(span_names::CLEAN_PARTIAL_READ).entered();
        if self.parser.has_partial_packet_header() {
            try_progress!(self.parser.finish_partial_packet_header());
        }
        if self.state.last_chunk_column.is_some() {
            self.state.stream = None;
        }
        try_progress!(self.try_reset_blob_state());
        let metadata = Arc::clone(&self.state.metadata);
        let next_header = self.state.cursor.next_header;
        try_progress!(self.parser.skip_row(&metadata.columns, next_header));
        debug!(from_column = next_header, "drained partially read row");
        self.state.cursor.data_ready = false;
        Ok(Progress::Done(()))
    }

    fn try_read_internal(&mut self) -> Result<Progress<bool>> {
        if self.state.cursor.data_ready {
            try_progress!(self.try_clean_partial_read());
        }
        self.restore_main_metadata();
        self.row.clear();
        self.state.reset_row();
        self.checkpoint();

        if self.state.flags.result_done {
            return Ok(Progress::Done(false));
        }
        if self.state.flags.halt_read {
            try_progress!(self.try_skip_rows());
            self.state.flags.halt_read = false;
            return Ok(Progress::Done(false));
        }

        loop {
            let token = try_progress!(self.parser.peek_next_token());
            match token {
                TokenType::Row | TokenType::NbcRow | TokenType::AltRow => {
                    let row = try_progress!(self.parser.begin_row(self.state.column_count()));
                    if let RowToken::AltRow(id) = row {
                        let alt = self
                            .state
                            .alt_metadata
                            .get(id)
                            .ok_or(ProtocolError::InvalidTokenType(TokenType::AltRow as u8))?;
                        let main = std::mem::replace(&mut self.state.metadata, alt);
                        self.state.flags.alt_row_status = AltRowStatus::Active(main);
                        self.fit_row_buffer();
                    }
                    self.state.cursor.data_ready = true;
                    self.state.flags.has_rows = true;
                    if self.config.single_row {
                        self.state.flags.halt_read = true;
                    }
                    debug!(?row, "row positioned");
                    return Ok(Progress::Done(true));
                }
                TokenType::Done | TokenType::DoneProc | TokenType::DoneInProc => {
                    let done = try_progress!(self.parser.read_done());
                    self.finish_result(done);
                    return Ok(Progress::Done(false));
                }
                TokenType::ColMetaData | TokenType::AltMetaData => {
                    self.state.flags.result_done = true;
                    return Ok(Progress::Done(false));
                }
                TokenType::TabName | TokenType::ColInfo => {
                    try_progress!(self.parser.skip_token());
                    self.state.flags.browse_info_consumed = true;
                }
                TokenType::Order
                | TokenType::Error
                | TokenType::Info
                | TokenType::ReturnStatus => {
                    try_progress!(self.parser.skip_token());
                }
            }
            self.checkpoint();
        }
    }

    /// Skip the remaining rows of the result.
    fn try_skip_rows(&mut self) -> Result<Progress<()>> {
        loop {
            let token = try_progress!(self.parser.peek_next_token());
            if token.is_row() {
                let row = try_progress!(self.parser.begin_row(self.state.column_count()));
                let metadata = match row {
                    RowToken::AltRow(id) => self
                        .state
                        .alt_metadata
                        .get(id)
                        .ok_or(ProtocolError::InvalidTokenType(TokenType::AltRow as u8))?,
                    RowToken::Row | RowToken::NbcRow => Arc::clone(&self.state.metadata),
                };
                try_progress!(self.parser.skip_row(&metadata.columns, 0));
            } else if token.is_done() {
                let done = try_progress!(self.parser.read_done());
                self.finish_result(done);
                return Ok(Progress::Done(()));
            } else if matches!(token, TokenType::ColMetaData | TokenType::AltMetaData) {
                self.state.flags.result_done = true;
                return Ok(Progress::Done(()));
            } else {
                try_progress!(self.parser.skip_token());
            }
            self.checkpoint();
        }
    }

    fn try_drain(&mut self) -> Result<Progress<()>> {
        if self.state.cursor.data_ready {
            try_progress!(self.try_clean_partial_read());
            self.checkpoint();
        }
        self.restore_main_metadata();
        if !self.state.flags.result_done {
            try_progress!(self.try_skip_rows());
        }
        Ok(Progress::Done(()))
    }

    fn try_read_chunk(&mut self, index: usize, max: usize) -> Result<Progress<Bytes>> {
        try_progress!(self.try_read_column(index, true));
        if self.row[index].is_null() {
            return Err(TypeError::NullValue.into());
        }
        let metadata = Arc::clone(&self.state.metadata);
        let column = &metadata.columns[index];
        let max = if column.is_plp() {
            max
        } else {
            max.min(usize::try_from(self.state.cursor.bytes_remaining.max(0)).unwrap_or(usize::MAX))
        };
        let chunk = try_progress!(self.parser.read_chunk(column, max));

        self.state.last_chunk_column = Some(index);
        self.state.column_data_bytes_read += chunk.len() as u64;
        if self.state.cursor.bytes_remaining > 0 {
            self.state.cursor.bytes_remaining -= chunk.len() as i64;
        }
        trace!(column = index, len = chunk.len(), "read chunk");
        Ok(Progress::Done(chunk))
    }

    /// Returns whether the columns up to `target` are certain to be
    /// buffered already.
    fn will_have_enough_data(&self, target: usize, header_only: bool) -> bool {
        if self.parser.is_mid_plp() {
            return false;
        }
        let available = self.parser.buffered_bytes().min(self.parser.packet_size());
        let mut budget = i64::try_from(available).unwrap_or(i64::MAX) - 1;

        let cursor = self.state.cursor;
        if cursor.has_partial_column() {
            if cursor.bytes_remaining < 0 || cursor.bytes_remaining > budget {
                return false;
            }
            budget -= cursor.bytes_remaining;
        }

        let columns = &self.state.metadata.columns;
        for (index, column) in columns
            .iter()
            .enumerate()
            .take(target + 1)
            .skip(cursor.next_header)
        {
            if self.parser.is_null_compressed(index) {
                continue;
            }
            if column.is_long() || column.is_udt() || column.is_tvp() {
                return false;
            }
            budget -= column.max_header_size() as i64;
            if !(header_only && index == target) {
                budget -= column.max_data_length() as i64;
            }
            if budget < 0 {
                return false;
            }
        }
        budget >= 0
    }

    // =========================================================================
    // Synchronous operations
    // =========================================================================

    pub(crate) fn read(&mut self) -> Result<bool> {
        self.check_open()?;
        self.run_sync(Self::try_read_internal)
    }

    pub(crate) fn read_column(&mut self, index: usize, header_only: bool) -> Result<()> {
        if self.check_column(index, header_only)? {
            return Ok(());
        }
        self.run_sync(|core| core.try_read_column(index, header_only))
    }

    /// Validate access to column `index`. Returns `true` when the column is
    /// already a materialized null that sequential access may read again.
    fn check_column(&self, index: usize, header_only: bool) -> Result<bool> {
        self.check_open()?;
        let sequential = self.sequential();
        let cursor = self.state.cursor;
        if sequential
            && cursor.data_ready
            && index + 1 == cursor.next_header
            && cursor.next_data == cursor.next_header
            && self.row.get(index).is_some_and(SqlCell::is_null)
        {
            return Ok(true);
        }
        if header_only {
            self.state.check_header_ready(index, sequential)?;
        } else {
            self.state.check_data_ready(index, sequential, false)?;
        }
        Ok(false)
    }

    /// The materialized cell of column `index`.
    pub(crate) fn cell(&self, index: usize) -> Result<&SqlCell> {
        if self.state.unreadable.contains(&index) {
            return Err(Error::UnreadableColumn { index });
        }
        self.row.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: self.row.len(),
        })
    }

    pub(crate) fn cell_mut(&mut self, index: usize) -> &mut SqlCell {
        &mut self.row[index]
    }

    pub(crate) fn get_values(&mut self, values: &mut [SqlValue]) -> Result<usize> {
        self.check_open()?;
        if !self.state.cursor.data_ready {
            return Err(Error::NoData);
        }
        let n = values.len().min(self.state.column_count());
        if self.sequential() {
            for (index, value) in values.iter_mut().enumerate().take(n) {
                self.read_column(index, false)?;
                *value = self.cell(index)?.value()?;
            }
        } else {
            if let Some(last) = n.checked_sub(1) {
                self.read_column(last, false)?;
            }
            for (index, value) in values.iter_mut().enumerate().take(n) {
                *value = self.cell(index)?.value()?;
            }
        }
        Ok(n)
    }

    pub(crate) fn get_bytes(&mut self, index: usize, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if !self.sequential() {
            self.read_column(index, false)?;
            let bytes = self.cell(index)?.as_sql_binary()?;
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
            let n = (bytes.len() - start).min(buf.len());
            buf[..n].copy_from_slice(&bytes[start..start + n]);
            return Ok(n);
        }

        self.check_open()?;
        self.state.check_data_ready(index, true, true)?;
        self.run_sync(|core| core.try_read_column(index, true))?;
        if self.row[index].is_null() {
            return Err(TypeError::NullValue.into());
        }
        let position = self.state.column_data_bytes_read;
        if offset < position {
            return Err(Error::NonSequentialByteAccess { offset, position });
        }

        let mut to_skip = offset - position;
        while to_skip > 0 {
            let want = usize::try_from(to_skip).unwrap_or(usize::MAX).min(TEXT_CHUNK_SIZE);
            let chunk = self.run_sync(|core| core.try_read_chunk(index, want))?;
            if chunk.is_empty() {
                return Ok(0);
            }
            to_skip -= chunk.len() as u64;
        }

        let mut filled = 0;
        while filled < buf.len() {
            let want = buf.len() - filled;
            let chunk = self.run_sync(|core| core.try_read_chunk(index, want))?;
            if chunk.is_empty() {
                break;
            }
            buf[filled..filled + chunk.len()].copy_from_slice(&chunk);
            filled += chunk.len();
        }
        Ok(filled)
    }

    /// Start streaming column `index`. `None` when the value is null.
    pub(crate) fn open_stream(&mut self, index: usize, text: bool) -> Result<Option<u64>> {
        self.check_open()?;
        self.state.check_data_ready(index, true, true)?;
        self.run_sync(|core| core.try_read_column(index, true))?;
        if self.row[index].is_null() {
            return Ok(None);
        }
        let id = self.next_stream_id;
        self.next_stream_id += 1;
        let kind = if text {
            StreamKind::Text(Utf16ChunkDecoder::default())
        } else {
            StreamKind::Binary
        };
        self.state.stream = Some(StreamState {
            column: index,
            id,
            kind,
        });
        self.state.last_chunk_column = Some(index);
        Ok(Some(id))
    }

    fn stream_column(&self, id: u64, text: bool) -> Result<usize> {
        match &self.state.stream {
            Some(stream) if stream.id == id && stream.is_text() == text => Ok(stream.column),
            _ => Err(Error::StreamClosed),
        }
    }

    pub(crate) fn read_stream(&mut self, id: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let column = self.stream_column(id, false)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = self.run_sync(|core| core.try_read_chunk(column, buf.len()))?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    pub(crate) fn read_text(&mut self, id: u64) -> Result<Option<String>> {
        self.check_open()?;
        let index = self.stream_column(id, true)?;
        let metadata = Arc::clone(&self.state.metadata);
        let column = &metadata.columns[index];

        if !column.type_id.is_unicode() {
            let mut chunks = Vec::new();
            loop {
                let chunk = self.run_sync(|core| core.try_read_chunk(index, usize::MAX))?;
                if chunk.is_empty() {
                    break;
                }
                chunks.push(chunk);
            }
            if chunks.is_empty() {
                return Ok(None);
            }
            let mut scratch = SqlCell::new();
            decode::decode_plp_into(&mut scratch, column, chunks)?;
            return Ok(Some(scratch.as_string()?));
        }

        let chunk = self.run_sync(|core| core.try_read_chunk(index, TEXT_CHUNK_SIZE))?;
        let Some(StreamState {
            kind: StreamKind::Text(decoder),
            ..
        }) = &mut self.state.stream
        else {
            return Err(Error::StreamClosed);
        };
        if chunk.is_empty() {
            decoder.finish()?;
            return Ok(None);
        }
        let mut text = String::with_capacity(chunk.len() / 2);
        decoder.push(&chunk, &mut text)?;
        Ok(Some(text))
    }

    // =========================================================================
    // Asynchronous operations
    // =========================================================================

    pub(crate) async fn read_async(&mut self, cancel: CancellationToken) -> Result<bool> {
        self.check_open()?;
        let mut row_token_read = false;

        let positioned_row_fits = self
            .last_column()
            .is_some_and(|last| self.will_have_enough_data(last, false));
        if !self.state.flags.halt_read
            && !self.parser.has_partial_packet_header()
            && (!self.state.cursor.data_ready || positioned_row_fits)
        {
            if self.state.cursor.data_ready {
                self.run_sync(Self::try_clean_partial_read)?;
            }
            if self.parser.is_next_token_ready(self.main_column_count()) {
                let has_row = self.run_sync(Self::try_read_internal)?;
                if !has_row || self.sequential() {
                    return Ok(has_row);
                }
                match self.last_column() {
                    None => return Ok(true),
                    Some(last) if self.will_have_enough_data(last, false) => {
                        self.run_sync(|core| core.try_materialize_through(last))?;
                        return Ok(true);
                    }
                    Some(_) => row_token_read = true,
                }
            }
        }

        self.prepare_invocation();
        let sequential = self.sequential();
        let result = Continuation::new(cancel, self.deadline())
            .run(self, move |core| {
                if !row_token_read {
                    if !try_progress!(core.try_read_internal()) {
                        return Ok(Progress::Done(false));
                    }
                    row_token_read = true;
                    core.checkpoint();
                }
                if !sequential {
                    if let Some(last) = core.last_column() {
                        try_progress!(core.try_materialize_through(last));
                    }
                }
                Ok(Progress::Done(true))
            })
            .await;
        result.map_err(|e| self.fail(e))
    }

    pub(crate) async fn read_column_async(
        &mut self,
        index: usize,
        header_only: bool,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self.check_column(index, header_only)? {
            return Ok(());
        }
        if self.will_have_enough_data(index, header_only) {
            return self.run_sync(|core| core.try_read_column(index, header_only));
        }

        self.prepare_invocation();
        let result = Continuation::new(cancel, self.deadline())
            .run(self, move |core| core.try_read_column(index, header_only))
            .await;
        result.map_err(|e| self.fail(e))
    }

    /// Drain the rest of the result and release the connection.
    pub(crate) async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.prepare_invocation();
        let drained = Continuation::new(CancellationToken::new(), self.deadline())
            .run(self, Self::try_drain)
            .await;
        self.closed = true;
        self.state.cursor.data_ready = false;
        self.state.stream = None;
        match drained {
            Ok(()) => {
                self.connection.release();
                debug!(rows_affected = ?self.rows_affected, "reader closed");
                Ok(())
            }
            Err(e) => {
                self.doom(&e);
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl<P: RowParser> Resumable for ReaderCore<P> {
    fn prepare_invocation(&mut self) {
        let mut snapshot = self.connection.snapshots().take().unwrap_or_default();
        snapshot.capture(&self.state);
        self.snapshot = Some(snapshot);
        self.parser.set_snapshot();
    }

    fn prepare_continuation(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            snapshot.replay(&mut self.state, &mut self.row);
        }
        self.fit_row_buffer();
        self.parser.prepare_replay();
    }

    fn cleanup(&mut self) {
        self.parser.reset_snapshot();
        if let Some(snapshot) = self.snapshot.take() {
            self.connection.snapshots().donate(snapshot);
        }
    }

    async fn wait_for_data(&mut self) -> Result<()> {
        self.parser.wait_for_data().await
    }

    fn abandon(&mut self, error: &Error) {
        if self.state.cursor.data_ready {
            self.doom(error);
        } else {
            self.prepare_continuation();
        }
        self.cleanup();
    }
}
