//! The public row reader.

use std::fmt;
use std::future::Future;
use std::io;
use std::ops::Deref;
use std::sync::Arc;

use bytes::Bytes;
use mssql_value::{FromSql, SqlCell, SqlTypedValue, SqlValue};
use tds_wire::{ColMetaData, Progress, TokenType};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, warn};

use crate::buffered::BufferedParser;
use crate::cancel::CancelHandle;
use crate::config::ReaderConfig;
use crate::connection::ConnectionContext;
use crate::machine::ReaderCore;
use crate::cursor::ColumnCursor;
use crate::error::{Error, Result};
use crate::instrumentation::{DB_SYSTEM, span_names};
use crate::operation::OperationSlot;
use crate::parser::RowParser;
use crate::stream::{ColumnStream, ColumnTextReader};

/// Forward-only reader over the rows of one result.
///
/// Synchronous methods work on bytes that are already buffered. The `_async`
/// methods wait for the network when they run out, and resume from a
/// snapshot once more data arrives. Only one asynchronous operation may be
/// outstanding; while it is, every other call fails with
/// [`Error::AsyncOperationPending`].
///
/// # Example
///
/// ```rust,ignore
/// let reader = DataReader::open(parser, ReaderConfig::new(), connection).await?;
/// while reader.read_async().await? {
///     let id: i32 = reader.get(0)?;
///     let name: Option<String> = reader.get(1)?;
///     println!("{id}: {name:?}");
/// }
/// reader.close().await?;
/// ```
pub struct DataReader<P: RowParser = BufferedParser> {
    core: Mutex<ReaderCore<P>>,
    slot: Arc<OperationSlot>,
    close_token: CancellationToken,
}

/// Borrowed view of one materialized cell.
///
/// Holds the reader locked until dropped.
pub struct CellRef<'a>(MappedMutexGuard<'a, SqlCell>);

impl Deref for CellRef<'_> {
    type Target = SqlCell;

    fn deref(&self) -> &SqlCell {
        &self.0
    }
}

impl fmt::Debug for CellRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl<P: RowParser> DataReader<P> {
    /// Create a reader over a result whose COLMETADATA was already consumed.
    ///
    /// Binds the reader to `connection`; fails with
    /// [`Error::ConnectionBusy`] if another reader holds it.
    pub fn new(
        parser: P,
        metadata: ColMetaData,
        config: ReaderConfig,
        connection: Arc<ConnectionContext>,
    ) -> Result<Self> {
        config.validate()?;
        connection.bind()?;
        debug!(
            columns = metadata.column_count(),
            sequential = config.is_sequential(),
            "reader bound to connection"
        );
        Ok(Self {
            core: Mutex::new(ReaderCore::new(parser, metadata, config, connection)),
            slot: Arc::new(OperationSlot::default()),
            close_token: CancellationToken::new(),
        })
    }

    /// Wait for the result's COLMETADATA, then create a reader over it.
    ///
    /// Tokens ahead of the metadata, such as the DONE of a preceding
    /// statement, are skipped.
    pub async fn open(
        mut parser: P,
        config: ReaderConfig,
        connection: Arc<ConnectionContext>,
    ) -> Result<Self> {
        config.validate()?;
        let deadline = config.command_timeout.map(|timeout| Instant::now() + timeout);
        let metadata = read_leading_metadata(&mut parser);
        let metadata = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, metadata).await {
                Ok(result) => result,
                Err(_) => Err(Error::CommandTimeout),
            },
            None => metadata.await,
        };
        match metadata {
            Ok(metadata) => Self::new(parser, metadata, config, connection),
            Err(e) => {
                connection.mark_broken();
                Err(e)
            }
        }
    }

    /// Register the metadata of compute clause `id`, for its ALTROWs.
    #[must_use]
    pub fn with_alt_metadata(mut self, id: u16, metadata: ColMetaData) -> Self {
        self.core.get_mut().set_alt_metadata(id, metadata);
        self
    }

    /// Attach the table names of a browse-mode result.
    #[must_use]
    pub fn with_table_names(mut self, names: Vec<String>) -> Self {
        self.core.get_mut().set_table_names(names);
        self
    }

    pub(crate) fn sync_core(&self) -> Result<MutexGuard<'_, ReaderCore<P>>> {
        if self.slot.is_pending() {
            return Err(Error::AsyncOperationPending);
        }
        self.core.try_lock().map_err(|_| Error::AsyncOperationPending)
    }

    // =========================================================================
    // Result information
    // =========================================================================

    /// Metadata of the current row's columns.
    ///
    /// During an ALTROW this is the compute clause's metadata.
    pub fn metadata(&self) -> Result<Arc<ColMetaData>> {
        Ok(Arc::clone(self.sync_core()?.metadata()))
    }

    /// Number of columns of the current row.
    pub fn field_count(&self) -> Result<usize> {
        Ok(self.sync_core()?.metadata().column_count())
    }

    /// Returns whether the result has at least one row.
    pub fn has_rows(&self) -> Result<bool> {
        self.sync_core()?.has_rows()
    }

    /// Row count from the result's DONE token, once reached.
    pub fn rows_affected(&self) -> Result<Option<u64>> {
        Ok(self.sync_core()?.rows_affected())
    }

    /// Table names of a browse-mode result.
    pub fn table_names(&self) -> Result<Arc<[String]>> {
        Ok(Arc::clone(self.sync_core()?.table_names()))
    }

    /// Position of the column cursor within the current row.
    pub fn cursor(&self) -> Result<ColumnCursor> {
        Ok(self.sync_core()?.cursor())
    }

    /// Returns whether the reader was closed, explicitly or by a fatal error.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_token.is_cancelled()
            || self.core.try_lock().is_ok_and(|core| core.is_closed())
    }

    /// Handle that can cancel the pending asynchronous operation from
    /// another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.slot))
    }

    /// Give back the parser, and with it the unread bytes.
    pub fn into_parser(self) -> P {
        self.core.into_inner().into_parser()
    }

    // =========================================================================
    // Synchronous access
    // =========================================================================

    /// Advance to the next row using buffered bytes only.
    ///
    /// Returns `false` at the end of the result. Running out of buffered
    /// bytes is a protocol error that closes the reader.
    pub fn read(&self) -> Result<bool> {
        let mut core = self.sync_core()?;
        let _span = debug_span!(
            span_names::READ,
            db.system = DB_SYSTEM,
            db.rows_affected = tracing::field::Empty
        )
        .entered();
        core.read()
    }

    /// Copy the values of the leading columns into `values`. Returns how
    /// many were copied.
    pub fn get_values(&self, values: &mut [SqlValue]) -> Result<usize> {
        self.sync_core()?.get_values(values)
    }

    /// Value of column `index`.
    pub fn get_value(&self, index: usize) -> Result<SqlValue> {
        let mut core = self.sync_core()?;
        core.read_column(index, false)?;
        Ok(core.cell(index)?.value()?)
    }

    /// Typed SQL value of column `index`.
    pub fn get_sql_value(&self, index: usize) -> Result<SqlTypedValue> {
        let mut core = self.sync_core()?;
        core.read_column(index, false)?;
        Ok(core.cell(index)?.sql_value()?)
    }

    /// Value of column `index` converted to `T`.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T> {
        let mut core = self.sync_core()?;
        core.read_column(index, false)?;
        Ok(core.cell(index)?.get()?)
    }

    /// The materialized cell of column `index`, without copying it.
    pub fn get_cell(&self, index: usize) -> Result<CellRef<'_>> {
        let mut core = self.sync_core()?;
        core.read_column(index, false)?;
        core.cell(index)?;
        Ok(CellRef(MutexGuard::map(core, |core| core.cell_mut(index))))
    }

    /// Returns whether column `index` is null.
    ///
    /// In sequential mode only the column header is read, so the value can
    /// still be streamed afterwards.
    pub fn is_null(&self, index: usize) -> Result<bool> {
        let mut core = self.sync_core()?;
        let header_only = core.config().is_sequential();
        core.read_column(index, header_only)?;
        Ok(core.cell(index)?.is_null())
    }

    /// Copy bytes of column `index` starting at `offset` into `buf`.
    /// Returns the number of bytes copied, `0` past the end of the value.
    ///
    /// In sequential mode offsets must not go backwards.
    pub fn get_bytes(&self, index: usize, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.sync_core()?.get_bytes(index, offset, buf)
    }

    /// Binary stream over column `index`. A null value yields an empty
    /// stream.
    pub fn get_stream(&self, index: usize) -> Result<ColumnStream<'_, P>> {
        let mut core = self.sync_core()?;
        if core.config().is_sequential() {
            return Ok(match core.open_stream(index, false)? {
                Some(id) => ColumnStream::Sequential { reader: self, id },
                None => ColumnStream::Buffered(io::Cursor::new(Bytes::new())),
            });
        }
        core.read_column(index, false)?;
        let cell = core.cell(index)?;
        let bytes = if cell.is_null() {
            Bytes::new()
        } else {
            cell.as_sql_binary()?
        };
        Ok(ColumnStream::Buffered(io::Cursor::new(bytes)))
    }

    /// Text reader over character column `index`. A null value yields an
    /// empty reader.
    pub fn get_text_reader(&self, index: usize) -> Result<ColumnTextReader<'_, P>> {
        let mut core = self.sync_core()?;
        if core.config().is_sequential() {
            return Ok(match core.open_stream(index, true)? {
                Some(id) => ColumnTextReader::Sequential { reader: self, id },
                None => ColumnTextReader::Buffered(None),
            });
        }
        core.read_column(index, false)?;
        let cell = core.cell(index)?;
        let text = if cell.is_null() {
            None
        } else {
            Some(cell.as_string()?)
        };
        Ok(ColumnTextReader::Buffered(text))
    }

    // =========================================================================
    // Asynchronous access
    // =========================================================================

    /// Advance to the next row, waiting for the network as needed.
    ///
    /// Outside sequential mode the whole row is decoded before this
    /// completes.
    pub fn read_async(&self) -> impl Future<Output = Result<bool>> + Send + '_ {
        let claim = self.slot.try_begin(&self.close_token);
        let span = debug_span!(
            span_names::READ,
            db.system = DB_SYSTEM,
            db.rows_affected = tracing::field::Empty
        );
        async move {
            let operation = claim?;
            let mut core = self.core.lock().await;
            core.read_async(operation.token().clone()).await
        }
        .instrument(span)
    }

    /// Value of column `index`, waiting for the network as needed.
    pub fn get_value_async(
        &self,
        index: usize,
    ) -> impl Future<Output = Result<SqlValue>> + Send + '_ {
        self.with_column_async(index, false, |cell| Ok(cell.value()?))
    }

    /// Value of column `index` converted to `T`, waiting for the network as
    /// needed.
    pub fn get_async<T: FromSql + Send + 'static>(
        &self,
        index: usize,
    ) -> impl Future<Output = Result<T>> + Send + '_ {
        self.with_column_async(index, false, |cell| Ok(cell.get()?))
    }

    /// Returns whether column `index` is null, waiting for the network as
    /// needed.
    pub fn is_null_async(&self, index: usize) -> impl Future<Output = Result<bool>> + Send + '_ {
        self.with_column_async(index, true, |cell| Ok(cell.is_null()))
    }

    fn with_column_async<T, F>(
        &self,
        index: usize,
        header_only_if_sequential: bool,
        extract: F,
    ) -> impl Future<Output = Result<T>> + Send + '_
    where
        T: Send + 'static,
        F: FnOnce(&SqlCell) -> Result<T> + Send + 'static,
    {
        let claim = self.slot.try_begin(&self.close_token);
        let span = debug_span!(
            span_names::READ_COLUMN,
            db.system = DB_SYSTEM,
            db.mssql.column_index = index
        );
        async move {
            let operation = claim?;
            let mut core = self.core.lock().await;
            let header_only = header_only_if_sequential && core.config().is_sequential();
            core.read_column_async(index, header_only, operation.token().clone())
                .await?;
            extract(core.cell(index)?)
        }
        .instrument(span)
    }

    /// Drain the rest of the result and release the connection.
    ///
    /// A pending operation is cancelled first; the connection is released
    /// only after it has finished. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.slot.is_pending() {
            warn!("closing reader with an operation pending");
        }
        self.close_token.cancel();
        let mut core = self.core.lock().await;
        core.close()
            .instrument(debug_span!(span_names::CLOSE, db.system = DB_SYSTEM))
            .await
    }
}

impl<P: RowParser> fmt::Debug for DataReader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataReader")
            .field("pending", &self.slot.is_pending())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn read_leading_metadata<P: RowParser>(parser: &mut P) -> Result<ColMetaData> {
    loop {
        if let Progress::Done(token) = parser.peek_next_token()? {
            if token == TokenType::ColMetaData {
                if let Progress::Done(metadata) = parser.read_metadata()? {
                    return Ok(metadata);
                }
            } else if parser.skip_token()?.is_done() {
                debug!(?token, "skipped token ahead of metadata");
                continue;
            }
        }
        parser.wait_for_data().await?;
    }
}
