//! Reader error types.

use mssql_value::TypeError;
use tds_wire::ProtocolError;
use thiserror::Error;

/// Errors that can occur while reading rows.
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol error. The wire position can no longer be trusted.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Type conversion error while decoding or reading a value.
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// Another asynchronous operation is outstanding on this reader.
    #[error("an asynchronous operation is already in progress on this reader")]
    AsyncOperationPending,

    /// The reader is closed.
    #[error("reader is closed")]
    ReaderClosed,

    /// No row is positioned.
    #[error("invalid attempt to read when no data is present")]
    NoData,

    /// Column ordinal outside the current schema.
    #[error("column index {index} is out of range for {count} columns")]
    IndexOutOfRange {
        /// Requested column.
        index: usize,
        /// Columns in the current schema.
        count: usize,
    },

    /// Sequential access tried to go back to a column already passed.
    #[error("invalid attempt to read from column {requested}, column {current} has already been read")]
    NonSequentialColumnAccess {
        /// Requested column.
        requested: usize,
        /// Column the cursor has moved to.
        current: usize,
    },

    /// Sequential access tried to go back within a column's bytes.
    #[error("invalid attempt to read from offset {offset}, {position} bytes have already been read")]
    NonSequentialByteAccess {
        /// Requested offset.
        offset: u64,
        /// Bytes of the column already consumed.
        position: u64,
    },

    /// The column's bytes were consumed but could not be decoded.
    #[error("column {index} could not be decoded")]
    UnreadableColumn {
        /// Column whose value failed to decode.
        index: usize,
    },

    /// A synchronous call ran out of buffered bytes.
    #[error("synchronous read needed more data than was buffered")]
    SynchronousCallMayNotPend,

    /// The operation deadline expired.
    #[error("command timed out")]
    CommandTimeout,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The connection was marked broken by an earlier failure.
    #[error("connection is broken")]
    ConnectionBroken,

    /// Another reader is still bound to the connection.
    #[error("connection is busy with another reader")]
    ConnectionBusy,

    /// A stream or text reader outlived the column it was reading.
    #[error("stream is closed")]
    StreamClosed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this error leaves the connection unusable.
    ///
    /// Fatal errors close the reader and mark the connection broken. Decode
    /// errors are not fatal: the row is unusable but the stream stays in
    /// step. A timeout or cancellation dooms the reader only when it lands
    /// in the middle of a row.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::ConnectionBroken | Self::SynchronousCallMayNotPend
        )
    }

    /// Check if this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CommandTimeout | Self::Cancelled)
    }

    /// Check if this error indicates a protocol/driver bug.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::SynchronousCallMayNotPend)
    }

    /// Check if this is a null value read through a typed accessor.
    #[must_use]
    pub fn is_null_value(&self) -> bool {
        matches!(self, Self::Type(TypeError::NullValue))
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Protocol(ProtocolError::ConnectionClosed) => {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, err)
            }
            Error::CommandTimeout => std::io::Error::new(std::io::ErrorKind::TimedOut, err),
            other => std::io::Error::other(other),
        }
    }
}

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, Error>;
