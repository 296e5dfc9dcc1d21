//! Tracing span names and attribute keys.
//!
//! Span names follow the `mssql.<operation>` pattern; attribute keys follow
//! the OpenTelemetry database semantic conventions where one exists.

/// Database system identifier recorded on every span.
pub const DB_SYSTEM: &str = "mssql";

/// Span names.
pub mod span_names {
    /// Advance to the next row.
    pub const READ: &str = "mssql.read";
    /// Materialize one column.
    pub const READ_COLUMN: &str = "mssql.read_column";
    /// Drain the unread remainder of a row.
    pub const CLEAN_PARTIAL_READ: &str = "mssql.clean_partial_read";
    /// Wait for data and resume a suspended operation.
    pub const CONTINUATION: &str = "mssql.continuation";
    /// Close the reader.
    pub const CLOSE: &str = "mssql.close";
}

/// Attribute keys.
pub mod attributes {
    /// Database system.
    pub const DB_SYSTEM: &str = "db.system";
    /// Column ordinal.
    pub const COLUMN_INDEX: &str = "db.mssql.column_index";
    /// Sequential or default access.
    pub const ACCESS_MODE: &str = "db.mssql.access_mode";
    /// Number of rows affected, from the DONE token.
    pub const DB_ROWS_AFFECTED: &str = "db.rows_affected";
    /// Error type.
    pub const ERROR_TYPE: &str = "error.type";
}
