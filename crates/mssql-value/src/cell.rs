//! The tagged value cell.
//!
//! A [`SqlCell`] holds one decoded column value. It starts out
//! [`StorageKind::Empty`], is written exactly once by the row decoder, can be
//! read any number of times, and goes back to `Empty` on [`SqlCell::clear`].
//! Row buffers are allocated once per result schema and reused across rows
//! by clearing their cells.
//!
//! Values are stored in their wire units. Typed accessors take a fast path
//! when the requested type matches the stored kind; otherwise they go through
//! [`SqlCell::value`] and a lossless [`FromSql`] conversion.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::cached::CachedBuffer;
use crate::decimal::{SqlDecimal, money_to_decimal};
use crate::error::TypeError;
use crate::from_sql::FromSql;
use crate::sql_types::{SqlTypedValue, SqlXml};
use crate::temporal::{self, TimeValue};
use crate::value::SqlValue;
use crate::vector::{self, SqlVector};

/// What a cell holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StorageKind {
    /// Never written since the last clear.
    #[default]
    Empty,
    /// BIT.
    Boolean,
    /// TINYINT.
    Byte,
    /// SMALLINT.
    Int16,
    /// INT.
    Int32,
    /// BIGINT.
    Int64,
    /// REAL.
    Single,
    /// FLOAT.
    Double,
    /// DECIMAL/NUMERIC with up to 38 digits.
    Decimal,
    /// MONEY/SMALLMONEY in ten-thousandths.
    Money,
    /// UNIQUEIDENTIFIER.
    Guid,
    /// DATETIME/SMALLDATETIME as days since 1900 and 1/300 s ticks.
    DateTime,
    /// DATE as days since 0001-01-01.
    Date,
    /// TIME as 100 ns ticks.
    Time,
    /// DATETIME2.
    DateTime2,
    /// DATETIMEOFFSET, UTC parts plus an offset in minutes.
    DateTimeOffset,
    /// Character data.
    String,
    /// Binary data.
    Binary,
    /// XML kept as its UTF-16 chunks until read.
    CachedXmlBuffer,
    /// XML text.
    Xml,
    /// JSON text.
    Json,
    /// VECTOR.
    Vector,
}

impl StorageKind {
    /// Name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Boolean => "Boolean",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Single => "Single",
            Self::Double => "Double",
            Self::Decimal => "Decimal",
            Self::Money => "Money",
            Self::Guid => "Guid",
            Self::DateTime => "DateTime",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::DateTime2 => "DateTime2",
            Self::DateTimeOffset => "DateTimeOffset",
            Self::String => "String",
            Self::Binary => "Binary",
            Self::CachedXmlBuffer => "CachedXmlBuffer",
            Self::Xml => "Xml",
            Self::Json => "Json",
            Self::Vector => "Vector",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Payload {
    #[default]
    None,
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(SqlDecimal),
    Guid(Uuid),
    LegacyDateTime { day: i32, time: u32 },
    Date(i32),
    Time(TimeValue),
    DateTime2 { days: i32, time: TimeValue },
    DateTimeOffset { days: i32, time: TimeValue, offset_minutes: i16 },
    Text(String),
    Binary(Bytes),
    Cached(Box<CachedBuffer>),
    Vector { element_type: u8, element_count: u16, bytes: Bytes },
}

/// One decoded column value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlCell {
    kind: StorageKind,
    is_null: bool,
    payload: Payload,
}

impl SqlCell {
    /// An empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            kind: StorageKind::Empty,
            is_null: false,
            payload: Payload::None,
        }
    }

    /// The stored kind.
    #[must_use]
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Returns whether the cell holds a typed null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Returns whether the cell has not been written since the last clear.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kind == StorageKind::Empty && !self.is_null
    }

    /// Reset to empty, dropping any owned payload.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    fn store(&mut self, kind: StorageKind, payload: Payload) {
        debug_assert!(self.is_empty(), "cell written twice without clear");
        self.kind = kind;
        self.is_null = false;
        self.payload = payload;
    }

    /// Mark the cell as a null of the given kind.
    pub fn set_null_of_kind(&mut self, kind: StorageKind) {
        debug_assert!(self.is_empty(), "cell written twice without clear");
        self.kind = kind;
        self.is_null = true;
        self.payload = Payload::None;
    }

    /// Mark the cell as a null vector of a declared dimension.
    pub fn set_null_vector(&mut self, element_type: u8, element_count: u16) {
        self.set_null_of_kind(StorageKind::Vector);
        self.payload = Payload::Vector {
            element_type,
            element_count,
            bytes: Bytes::new(),
        };
    }

    /// Element type byte of a vector cell, null or not.
    #[must_use]
    pub fn vector_element_type(&self) -> Option<u8> {
        match self.payload {
            Payload::Vector { element_type, .. } => Some(element_type),
            _ => None,
        }
    }

    /// Store a BIT.
    pub fn set_bool(&mut self, value: bool) {
        self.store(StorageKind::Boolean, Payload::Bool(value));
    }

    /// Store a TINYINT.
    pub fn set_u8(&mut self, value: u8) {
        self.store(StorageKind::Byte, Payload::U8(value));
    }

    /// Store a SMALLINT.
    pub fn set_i16(&mut self, value: i16) {
        self.store(StorageKind::Int16, Payload::I16(value));
    }

    /// Store an INT.
    pub fn set_i32(&mut self, value: i32) {
        self.store(StorageKind::Int32, Payload::I32(value));
    }

    /// Store a BIGINT.
    pub fn set_i64(&mut self, value: i64) {
        self.store(StorageKind::Int64, Payload::I64(value));
    }

    /// Store a REAL.
    pub fn set_f32(&mut self, value: f32) {
        self.store(StorageKind::Single, Payload::F32(value));
    }

    /// Store a FLOAT.
    pub fn set_f64(&mut self, value: f64) {
        self.store(StorageKind::Double, Payload::F64(value));
    }

    /// Store a DECIMAL/NUMERIC in wire form.
    pub fn set_decimal(&mut self, value: SqlDecimal) {
        self.store(StorageKind::Decimal, Payload::Decimal(value));
    }

    /// Store a money value in ten-thousandths.
    pub fn set_money(&mut self, value: i64) {
        self.store(StorageKind::Money, Payload::I64(value));
    }

    /// Store a UNIQUEIDENTIFIER.
    pub fn set_guid(&mut self, value: Uuid) {
        self.store(StorageKind::Guid, Payload::Guid(value));
    }

    /// Store a DATETIME as days since 1900-01-01 and 1/300 s ticks.
    pub fn set_datetime(&mut self, day: i32, time: u32) {
        self.store(StorageKind::DateTime, Payload::LegacyDateTime { day, time });
    }

    /// Store a DATE as days since 0001-01-01.
    pub fn set_date(&mut self, days: i32) {
        self.store(StorageKind::Date, Payload::Date(days));
    }

    /// Store a TIME.
    pub fn set_time(&mut self, time: TimeValue) {
        self.store(StorageKind::Time, Payload::Time(time));
    }

    /// Store a DATETIME2.
    pub fn set_datetime2(&mut self, days: i32, time: TimeValue) {
        self.store(StorageKind::DateTime2, Payload::DateTime2 { days, time });
    }

    /// Store a DATETIMEOFFSET given its UTC parts.
    pub fn set_datetime_offset(&mut self, days: i32, time: TimeValue, offset_minutes: i16) {
        self.store(
            StorageKind::DateTimeOffset,
            Payload::DateTimeOffset {
                days,
                time,
                offset_minutes,
            },
        );
    }

    /// Store character data.
    pub fn set_string(&mut self, value: String) {
        self.store(StorageKind::String, Payload::Text(value));
    }

    /// Store binary data.
    pub fn set_binary(&mut self, value: Bytes) {
        self.store(StorageKind::Binary, Payload::Binary(value));
    }

    /// Store XML chunks for deferred rendering.
    pub fn set_cached_xml(&mut self, value: CachedBuffer) {
        self.store(StorageKind::CachedXmlBuffer, Payload::Cached(Box::new(value)));
    }

    /// Store XML text.
    pub fn set_xml(&mut self, value: String) {
        self.store(StorageKind::Xml, Payload::Text(value));
    }

    /// Store JSON text.
    pub fn set_json(&mut self, value: String) {
        self.store(StorageKind::Json, Payload::Text(value));
    }

    /// Store a vector payload.
    ///
    /// Only the header is validated here; an unsupported element type is
    /// reported when the value is read.
    pub fn set_vector(&mut self, payload: Bytes) -> Result<(), TypeError> {
        let header = vector::parse_header(&payload)?;
        self.store(
            StorageKind::Vector,
            Payload::Vector {
                element_type: header.element_type,
                element_count: header.element_count,
                bytes: payload,
            },
        );
        Ok(())
    }

    fn check_not_null(&self) -> Result<(), TypeError> {
        if self.is_null {
            return Err(TypeError::NullValue);
        }
        Ok(())
    }

    fn convert<T: FromSql>(&self) -> Result<T, TypeError> {
        let value = self.value()?;
        T::from_sql(&value).map_err(|e| match e {
            TypeError::InvalidCast { requested, .. } => {
                TypeError::cast(self.kind.name(), requested)
            }
            other => other,
        })
    }

    /// Read as `bool`.
    pub fn as_bool(&self) -> Result<bool, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::Bool(v) if self.kind == StorageKind::Boolean => Ok(v),
            _ => self.convert(),
        }
    }

    /// Read as `u8`.
    pub fn as_u8(&self) -> Result<u8, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::U8(v) => Ok(v),
            _ => self.convert(),
        }
    }

    /// Read as `i16`.
    pub fn as_i16(&self) -> Result<i16, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::I16(v) => Ok(v),
            _ => self.convert(),
        }
    }

    /// Read as `i32`.
    pub fn as_i32(&self) -> Result<i32, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::I32(v) => Ok(v),
            _ => self.convert(),
        }
    }

    /// Read as `i64`.
    pub fn as_i64(&self) -> Result<i64, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::I64(v) if self.kind == StorageKind::Int64 => Ok(v),
            _ => self.convert(),
        }
    }

    /// Read as `f32`.
    pub fn as_f32(&self) -> Result<f32, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::F32(v) => Ok(v),
            _ => self.convert(),
        }
    }

    /// Read as `f64`.
    pub fn as_f64(&self) -> Result<f64, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::F64(v) => Ok(v),
            _ => self.convert(),
        }
    }

    /// Read a decimal, money, or integer value as a [`Decimal`].
    ///
    /// Wide decimals are trimmed of trailing fractional zeros; a value that
    /// still does not fit is [`TypeError::Overflow`].
    pub fn as_decimal(&self) -> Result<Decimal, TypeError> {
        self.check_not_null()?;
        match (&self.payload, self.kind) {
            (Payload::Decimal(d), _) => d.to_decimal(),
            (Payload::I64(v), StorageKind::Money) => Ok(money_to_decimal(*v)),
            _ => self.convert(),
        }
    }

    /// Read a money value.
    pub fn as_money(&self) -> Result<Decimal, TypeError> {
        self.check_not_null()?;
        match (&self.payload, self.kind) {
            (Payload::I64(v), StorageKind::Money) => Ok(money_to_decimal(*v)),
            _ => self.convert(),
        }
    }

    /// Read as a [`Uuid`].
    pub fn as_guid(&self) -> Result<Uuid, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::Guid(v) => Ok(v),
            _ => self.convert(),
        }
    }

    /// Read a DATETIME/SMALLDATETIME.
    pub fn as_datetime(&self) -> Result<NaiveDateTime, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::LegacyDateTime { day, time } => temporal::legacy_datetime(day, time),
            _ => self.convert(),
        }
    }

    /// Read a DATE.
    pub fn as_date(&self) -> Result<NaiveDate, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::Date(days) => temporal::date_from_days(days),
            _ => self.convert(),
        }
    }

    /// Read a TIME.
    pub fn as_time(&self) -> Result<NaiveTime, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::Time(time) => time.to_naive(),
            _ => self.convert(),
        }
    }

    /// Read a DATETIME2.
    pub fn as_datetime2(&self) -> Result<NaiveDateTime, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::DateTime2 { days, time } => temporal::datetime2(days, time),
            _ => self.convert(),
        }
    }

    /// Read a DATETIMEOFFSET.
    pub fn as_datetime_offset(&self) -> Result<DateTime<FixedOffset>, TypeError> {
        self.check_not_null()?;
        match self.payload {
            Payload::DateTimeOffset {
                days,
                time,
                offset_minutes,
            } => temporal::datetime_offset(days, time, offset_minutes),
            _ => self.convert(),
        }
    }

    /// Borrow stored text.
    ///
    /// Cached XML has no contiguous text to borrow; use [`Self::as_string`].
    pub fn as_str(&self) -> Result<&str, TypeError> {
        self.check_not_null()?;
        match &self.payload {
            Payload::Text(s) => Ok(s),
            _ => Err(TypeError::cast(self.kind.name(), "&str")),
        }
    }

    /// Read text, rendering cached XML.
    pub fn as_string(&self) -> Result<String, TypeError> {
        self.check_not_null()?;
        match &self.payload {
            Payload::Text(s) => Ok(s.clone()),
            Payload::Cached(cached) => cached.render(),
            _ => self.convert(),
        }
    }

    /// Borrow binary data.
    pub fn as_bytes(&self) -> Result<&[u8], TypeError> {
        self.check_not_null()?;
        match &self.payload {
            Payload::Binary(b) => Ok(b),
            _ => Err(TypeError::cast(self.kind.name(), "&[u8]")),
        }
    }

    /// Borrow JSON text. Character data is accepted as JSON.
    pub fn as_json(&self) -> Result<&str, TypeError> {
        self.check_not_null()?;
        match (&self.payload, self.kind) {
            (Payload::Text(s), StorageKind::Json | StorageKind::String) => Ok(s),
            _ => Err(TypeError::cast(self.kind.name(), "Json")),
        }
    }

    /// Parse JSON text.
    #[cfg(feature = "json")]
    pub fn as_json_value(&self) -> Result<serde_json::Value, TypeError> {
        serde_json::from_str(self.as_json()?).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
    }

    /// Read an XML document. Character data is accepted as XML.
    pub fn as_sql_xml(&self) -> Result<SqlXml, TypeError> {
        self.check_not_null()?;
        match (&self.payload, self.kind) {
            (Payload::Cached(cached), _) => Ok(SqlXml::new(cached.render()?)),
            (Payload::Text(s), StorageKind::Xml | StorageKind::String) => Ok(SqlXml::new(s.clone())),
            _ => Err(TypeError::cast(self.kind.name(), "SqlXml")),
        }
    }

    /// Read a decimal in its full wire form.
    pub fn as_sql_decimal(&self) -> Result<SqlDecimal, TypeError> {
        self.check_not_null()?;
        match (&self.payload, self.kind) {
            (Payload::Decimal(d), _) => Ok(*d),
            (Payload::I64(v), StorageKind::Money) => {
                Ok(SqlDecimal::new(19, 4, *v >= 0, u128::from(v.unsigned_abs())))
            }
            _ => Err(TypeError::cast(self.kind.name(), "SqlDecimal")),
        }
    }

    /// Read binary data as shared bytes.
    pub fn as_sql_binary(&self) -> Result<Bytes, TypeError> {
        self.check_not_null()?;
        match &self.payload {
            Payload::Binary(b) => Ok(b.clone()),
            _ => Err(TypeError::cast(self.kind.name(), "SqlBinary")),
        }
    }

    /// Read a float vector.
    pub fn as_vector_f32(&self) -> Result<SqlVector, TypeError> {
        self.check_not_null()?;
        match &self.payload {
            Payload::Vector { bytes, .. } => SqlVector::from_wire(bytes),
            _ => Err(TypeError::cast(self.kind.name(), "SqlVector")),
        }
    }

    /// Read through any [`FromSql`] conversion. `Option<T>` maps null to `None`.
    pub fn get<T: FromSql>(&self) -> Result<T, TypeError> {
        self.convert()
    }

    /// The generic value; [`SqlValue::Null`] for null and empty cells.
    pub fn value(&self) -> Result<SqlValue, TypeError> {
        if self.is_null || self.kind == StorageKind::Empty {
            return Ok(SqlValue::Null);
        }
        Ok(match (&self.payload, self.kind) {
            (Payload::None, _) => SqlValue::Null,
            (Payload::Bool(v), _) => SqlValue::Bool(*v),
            (Payload::U8(v), _) => SqlValue::TinyInt(*v),
            (Payload::I16(v), _) => SqlValue::SmallInt(*v),
            (Payload::I32(v), _) => SqlValue::Int(*v),
            (Payload::I64(v), StorageKind::Money) => SqlValue::Decimal(money_to_decimal(*v)),
            (Payload::I64(v), _) => SqlValue::BigInt(*v),
            (Payload::F32(v), _) => SqlValue::Float(*v),
            (Payload::F64(v), _) => SqlValue::Double(*v),
            (Payload::Decimal(d), _) => SqlValue::Decimal(d.to_decimal()?),
            (Payload::Guid(v), _) => SqlValue::Uuid(*v),
            (Payload::LegacyDateTime { day, time }, _) => {
                SqlValue::DateTime(temporal::legacy_datetime(*day, *time)?)
            }
            (Payload::Date(days), _) => SqlValue::Date(temporal::date_from_days(*days)?),
            (Payload::Time(time), _) => SqlValue::Time(time.to_naive()?),
            (Payload::DateTime2 { days, time }, _) => {
                SqlValue::DateTime(temporal::datetime2(*days, *time)?)
            }
            (
                Payload::DateTimeOffset {
                    days,
                    time,
                    offset_minutes,
                },
                _,
            ) => SqlValue::DateTimeOffset(temporal::datetime_offset(*days, *time, *offset_minutes)?),
            (Payload::Text(s), StorageKind::Xml) => SqlValue::Xml(s.clone()),
            (Payload::Text(s), StorageKind::Json) => SqlValue::Json(s.clone()),
            (Payload::Text(s), _) => SqlValue::String(s.clone()),
            (Payload::Binary(b), _) => SqlValue::Binary(b.clone()),
            (Payload::Cached(cached), _) => SqlValue::String(cached.render()?),
            (Payload::Vector { bytes, .. }, _) => SqlValue::Vector(SqlVector::from_wire(bytes)?),
        })
    }

    /// The typed nullable value; [`SqlTypedValue::DbNull`] for empty cells.
    pub fn sql_value(&self) -> Result<SqlTypedValue, TypeError> {
        let null = self.is_null;
        Ok(match self.kind {
            StorageKind::Empty => SqlTypedValue::DbNull,
            StorageKind::Boolean => SqlTypedValue::Boolean(self.unless_null(Self::as_bool)?),
            StorageKind::Byte => SqlTypedValue::Byte(self.unless_null(Self::as_u8)?),
            StorageKind::Int16 => SqlTypedValue::Int16(self.unless_null(Self::as_i16)?),
            StorageKind::Int32 => SqlTypedValue::Int32(self.unless_null(Self::as_i32)?),
            StorageKind::Int64 => SqlTypedValue::Int64(self.unless_null(Self::as_i64)?),
            StorageKind::Single => SqlTypedValue::Single(self.unless_null(Self::as_f32)?),
            StorageKind::Double => SqlTypedValue::Double(self.unless_null(Self::as_f64)?),
            StorageKind::Decimal => SqlTypedValue::Decimal(self.unless_null(Self::as_sql_decimal)?),
            StorageKind::Money => SqlTypedValue::Money(self.unless_null(Self::as_money)?),
            StorageKind::Guid => SqlTypedValue::Guid(self.unless_null(Self::as_guid)?),
            StorageKind::DateTime => SqlTypedValue::DateTime(self.unless_null(Self::as_datetime)?),
            StorageKind::Date => SqlTypedValue::Date(self.unless_null(Self::as_date)?),
            StorageKind::Time => SqlTypedValue::Time(self.unless_null(Self::as_time)?),
            StorageKind::DateTime2 => {
                SqlTypedValue::DateTime2(self.unless_null(Self::as_datetime2)?)
            }
            StorageKind::DateTimeOffset => {
                SqlTypedValue::DateTimeOffset(self.unless_null(Self::as_datetime_offset)?)
            }
            StorageKind::String => SqlTypedValue::String(self.unless_null(Self::as_string)?),
            StorageKind::Json => SqlTypedValue::Json(self.unless_null(Self::as_string)?),
            StorageKind::Binary => SqlTypedValue::Binary(self.unless_null(Self::as_sql_binary)?),
            StorageKind::CachedXmlBuffer | StorageKind::Xml => {
                SqlTypedValue::Xml(self.unless_null(Self::as_sql_xml)?.unwrap_or_default())
            }
            StorageKind::Vector if null => {
                let count = match self.payload {
                    Payload::Vector { element_count, .. } => element_count,
                    _ => 0,
                };
                SqlTypedValue::Vector(SqlVector::null(count))
            }
            StorageKind::Vector => SqlTypedValue::Vector(self.as_vector_f32()?),
        })
    }

    fn unless_null<T>(
        &self,
        read: impl FnOnce(&Self) -> Result<T, TypeError>,
    ) -> Result<Option<T>, TypeError> {
        if self.is_null {
            return Ok(None);
        }
        read(self).map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_new_cell_is_empty() {
        let cell = SqlCell::new();
        assert!(cell.is_empty());
        assert!(!cell.is_null());
        assert_eq!(cell.value().unwrap(), SqlValue::Null);
        assert_eq!(cell.sql_value().unwrap(), SqlTypedValue::DbNull);
    }

    #[test]
    fn test_exact_kind_fast_path() {
        let mut cell = SqlCell::new();
        cell.set_i32(42);
        assert_eq!(cell.as_i32().unwrap(), 42);
        assert_eq!(cell.kind(), StorageKind::Int32);
    }

    #[test]
    fn test_widening_goes_through_value() {
        let mut cell = SqlCell::new();
        cell.set_i16(-7);
        assert_eq!(cell.as_i32().unwrap(), -7);
        assert_eq!(cell.as_i64().unwrap(), -7);
        assert_eq!(cell.as_decimal().unwrap(), Decimal::from(-7));
    }

    #[test]
    fn test_invalid_cast_names_both_types() {
        let mut cell = SqlCell::new();
        cell.set_i64(1);
        match cell.as_i32() {
            Err(TypeError::InvalidCast { stored, requested }) => {
                assert_eq!(stored, "Int64");
                assert_eq!(requested, "i32");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(cell.as_bool(), Err(TypeError::InvalidCast { .. })));
    }

    #[test]
    fn test_money_is_never_read_as_bigint() {
        let mut cell = SqlCell::new();
        cell.set_money(-123_456);
        assert_eq!(cell.as_decimal().unwrap(), Decimal::from_str("-12.3456").unwrap());
        assert_eq!(cell.value().unwrap(), SqlValue::Decimal(Decimal::from_str("-12.3456").unwrap()));
        assert!(matches!(cell.as_i64(), Err(TypeError::InvalidCast { .. })));
        assert_eq!(cell.as_sql_decimal().unwrap().to_string(), "-12.3456");
    }

    #[test]
    fn test_clear_allows_rewrite() {
        let mut cell = SqlCell::new();
        cell.set_string("abc".into());
        cell.clear();
        assert!(cell.is_empty());
        cell.set_bool(true);
        assert!(cell.as_bool().unwrap());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "cell written twice without clear")]
    fn test_second_write_panics_in_debug() {
        let mut cell = SqlCell::new();
        cell.set_i32(1);
        cell.set_i32(2);
    }

    #[test]
    fn test_cached_xml_renders() {
        let bytes: Vec<u8> = "<r/>".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut cell = SqlCell::new();
        cell.set_cached_xml(CachedBuffer::from_chunks([Bytes::from(bytes)]));
        assert_eq!(cell.value().unwrap(), SqlValue::String("<r/>".into()));
        assert_eq!(cell.as_sql_xml().unwrap().value(), Some("<r/>"));
        assert_eq!(
            cell.sql_value().unwrap(),
            SqlTypedValue::Xml(SqlXml::new("<r/>"))
        );
        assert!(matches!(cell.as_str(), Err(TypeError::InvalidCast { .. })));
    }

    #[test]
    fn test_null_vector_keeps_count() {
        let mut cell = SqlCell::new();
        cell.set_null_vector(0, 3);
        match cell.sql_value().unwrap() {
            SqlTypedValue::Vector(v) => {
                assert!(v.is_null());
                assert_eq!(v.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cell.value().unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_unsupported_vector_element_type() {
        let mut cell = SqlCell::new();
        cell.set_vector(Bytes::from_static(&[0xA9, 0x01, 0x00, 0x00, 0x07, 0, 0, 0]))
            .unwrap();
        assert!(matches!(cell.value(), Err(TypeError::UnsupportedType(_))));
        assert!(matches!(cell.as_vector_f32(), Err(TypeError::UnsupportedType(_))));
    }

    proptest! {
        #[test]
        fn prop_clear_then_write_reads_back(values in prop::collection::vec(any::<i32>(), 1..16)) {
            let mut cell = SqlCell::new();
            for v in values {
                cell.clear();
                cell.set_i32(v);
                prop_assert_eq!(cell.as_i32().unwrap(), v);
                prop_assert_eq!(cell.value().unwrap(), SqlValue::Int(v));
            }
        }
    }
}
