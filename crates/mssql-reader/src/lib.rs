//! # mssql-reader
//!
//! Forward-only, resumable row reader for SQL Server result sets.
//!
//! A [`DataReader`] walks the rows of one result token stream and decodes
//! column values into [`SqlCell`](mssql_value::SqlCell)s. The same read
//! logic serves three callers:
//!
//! - **Synchronous** calls that only touch bytes already buffered
//! - **Asynchronous** calls that wait for the network when bytes run out
//! - **Resumed** calls, replayed from a suspension snapshot after a wait
//!
//! Every read step reports [`Progress::NeedMoreData`](tds_wire::Progress)
//! instead of blocking. Before a step that may run out of bytes the reader
//! captures a [`Snapshot`](snapshot::Snapshot) of its cursor and the packet
//! buffer pins its position, so a suspended step restarts from a consistent
//! state rather than from the middle of a column.
//!
//! ## Access modes
//!
//! ```text
//! Default     whole row decoded on read; columns in any order
//! Sequential  columns decoded on demand, in order; large values streamed
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_reader::{BufferedParser, ConnectionContext, DataReader, ReaderConfig};
//!
//! let (parser, feed) = BufferedParser::new(4096);
//! tokio::spawn(async move {
//!     while let Some(packet) = socket.next_packet().await {
//!         feed.push_packet(&packet)?;
//!     }
//!     feed.close();
//! });
//!
//! let reader = DataReader::open(parser, ReaderConfig::new().sequential(), ConnectionContext::new()).await?;
//! while reader.read_async().await? {
//!     let mut blob = reader.get_stream(0)?;
//!     std::io::copy(&mut blob, &mut file)?;
//! }
//! reader.close().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod buffered;
pub mod cancel;
pub mod config;
pub mod connection;
pub mod continuation;
pub mod cursor;
pub mod error;
pub mod instrumentation;
mod machine;
pub mod operation;
pub mod parser;
pub mod reader;
pub mod snapshot;
pub mod stream;

// Re-export commonly used types
pub use buffered::{BufferedParser, PacketFeed};
pub use cancel::CancelHandle;
pub use config::{AccessMode, ReaderConfig};
pub use connection::{ConnectionContext, ProtocolState};
pub use continuation::{Continuation, Resumable};
pub use cursor::{AltRowStatus, ColumnCursor};
pub use error::{Error, Result};
pub use parser::{ColumnHeader, RowParser, RowToken};
pub use reader::{CellRef, DataReader};
pub use stream::{ColumnStream, ColumnTextReader, Utf16ChunkDecoder};
