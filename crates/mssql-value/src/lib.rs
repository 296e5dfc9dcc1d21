//! # mssql-value
//!
//! Decoded SQL Server column values.
//!
//! A [`SqlCell`] is a write-once slot holding one column value in its wire
//! units, and a [`RowBuffer`] is the array of cells for one row. The
//! [`decode`] module turns column value bytes into cells; typed accessors on
//! the cell turn them into Rust values.
//!
//! ## Features
//!
//! - `encoding` (default): collation-aware `VARCHAR` decoding via `encoding_rs`
//! - `json`: `SqlCell::as_json_value` via `serde_json`
//!
//! ## Type Mappings
//!
//! | SQL Server Type | Storage kind | Rust Type |
//! |-----------------|--------------|-----------|
//! | `BIT` | `Boolean` | `bool` |
//! | `TINYINT` | `Byte` | `u8` |
//! | `SMALLINT` | `Int16` | `i16` |
//! | `INT` | `Int32` | `i32` |
//! | `BIGINT` | `Int64` | `i64` |
//! | `REAL` | `Single` | `f32` |
//! | `FLOAT` | `Double` | `f64` |
//! | `DECIMAL`/`NUMERIC` | `Decimal` | `rust_decimal::Decimal`, [`SqlDecimal`] |
//! | `MONEY`/`SMALLMONEY` | `Money` | `rust_decimal::Decimal` |
//! | `UNIQUEIDENTIFIER` | `Guid` | `uuid::Uuid` |
//! | `DATETIME`/`SMALLDATETIME` | `DateTime` | `chrono::NaiveDateTime` |
//! | `DATE` | `Date` | `chrono::NaiveDate` |
//! | `TIME` | `Time` | `chrono::NaiveTime` |
//! | `DATETIME2` | `DateTime2` | `chrono::NaiveDateTime` |
//! | `DATETIMEOFFSET` | `DateTimeOffset` | `chrono::DateTime<FixedOffset>` |
//! | `CHAR`/`VARCHAR`/`NCHAR`/`NVARCHAR` | `String` | `String` |
//! | `BINARY`/`VARBINARY`/`ROWVERSION` | `Binary` | `bytes::Bytes` |
//! | `XML` | `CachedXmlBuffer` | `String`, [`SqlXml`] |
//! | `JSON` | `Json` | `String` |
//! | `VECTOR` | `Vector` | [`SqlVector`] |
//!
//! ## Example
//!
//! ```rust
//! use mssql_value::{SqlCell, SqlValue, TypeError};
//!
//! let mut cell = SqlCell::new();
//! cell.set_i16(7);
//! assert_eq!(cell.as_i32().unwrap(), 7);
//!
//! cell.clear();
//! cell.set_money(-123_456);
//! assert_eq!(cell.as_decimal().unwrap().to_string(), "-12.3456");
//!
//! cell.clear();
//! cell.set_null_of_kind(mssql_value::StorageKind::Int32);
//! assert!(matches!(cell.as_i32(), Err(TypeError::NullValue)));
//! assert_eq!(cell.value().unwrap(), SqlValue::Null);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cached;
pub mod cell;
pub mod decimal;
pub mod decode;
pub mod error;
pub mod from_sql;
pub mod row;
pub mod sql_types;
pub mod temporal;
pub mod value;
pub mod vector;

pub use cached::CachedBuffer;
pub use cell::{SqlCell, StorageKind};
pub use decimal::{SqlDecimal, money_to_decimal};
pub use error::TypeError;
pub use from_sql::FromSql;
pub use row::RowBuffer;
pub use sql_types::{SqlTypedValue, SqlXml};
pub use temporal::TimeValue;
pub use value::SqlValue;
pub use vector::{SqlVector, VectorElementType};
