//! Nullable SQL wrapper values.
//!
//! [`SqlTypedValue`] is the provider-specific view of a cell. Where
//! [`SqlValue`](crate::SqlValue) collapses every null to one sentinel,
//! these wrappers keep the column's type even when the value is null, and
//! decimals keep their full 38-digit wire form.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::decimal::SqlDecimal;
use crate::vector::SqlVector;

/// An XML document that may be null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlXml(Option<String>);

impl SqlXml {
    /// A non-null document.
    #[must_use]
    pub fn new(document: impl Into<String>) -> Self {
        Self(Some(document.into()))
    }

    /// The null document.
    #[must_use]
    pub fn null() -> Self {
        Self(None)
    }

    /// Returns whether the document is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// The document text.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Take the document text.
    #[must_use]
    pub fn into_inner(self) -> Option<String> {
        self.0
    }
}

/// A typed, nullable value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SqlTypedValue {
    /// The cell holds nothing.
    DbNull,
    /// BIT.
    Boolean(Option<bool>),
    /// TINYINT.
    Byte(Option<u8>),
    /// SMALLINT.
    Int16(Option<i16>),
    /// INT.
    Int32(Option<i32>),
    /// BIGINT.
    Int64(Option<i64>),
    /// REAL.
    Single(Option<f32>),
    /// FLOAT.
    Double(Option<f64>),
    /// DECIMAL/NUMERIC in wire form.
    Decimal(Option<SqlDecimal>),
    /// MONEY/SMALLMONEY.
    Money(Option<Decimal>),
    /// UNIQUEIDENTIFIER.
    Guid(Option<Uuid>),
    /// DATETIME/SMALLDATETIME.
    DateTime(Option<NaiveDateTime>),
    /// DATE.
    Date(Option<NaiveDate>),
    /// TIME.
    Time(Option<NaiveTime>),
    /// DATETIME2.
    DateTime2(Option<NaiveDateTime>),
    /// DATETIMEOFFSET.
    DateTimeOffset(Option<DateTime<FixedOffset>>),
    /// Character data.
    String(Option<String>),
    /// Binary data.
    Binary(Option<Bytes>),
    /// XML.
    Xml(SqlXml),
    /// JSON text.
    Json(Option<String>),
    /// VECTOR; a null vector keeps its declared dimension.
    Vector(SqlVector),
}

impl SqlTypedValue {
    /// Returns whether the value is null or `DbNull`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::DbNull => true,
            Self::Boolean(v) => v.is_none(),
            Self::Byte(v) => v.is_none(),
            Self::Int16(v) => v.is_none(),
            Self::Int32(v) => v.is_none(),
            Self::Int64(v) => v.is_none(),
            Self::Single(v) => v.is_none(),
            Self::Double(v) => v.is_none(),
            Self::Decimal(v) => v.is_none(),
            Self::Money(v) => v.is_none(),
            Self::Guid(v) => v.is_none(),
            Self::DateTime(v) | Self::DateTime2(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::Time(v) => v.is_none(),
            Self::DateTimeOffset(v) => v.is_none(),
            Self::String(v) | Self::Json(v) => v.is_none(),
            Self::Binary(v) => v.is_none(),
            Self::Xml(v) => v.is_null(),
            Self::Vector(v) => v.is_null(),
        }
    }
}
