//! Trait for converting from SQL values to Rust types.
//!
//! Conversions are lossless: integers widen, `REAL` widens to `f64`, and
//! nothing narrows. Anything else is [`TypeError::InvalidCast`].

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::TypeError;
use crate::value::SqlValue;
use crate::vector::SqlVector;

/// Trait for types that can be converted from SQL values.
pub trait FromSql: Sized {
    /// Name used when a conversion is refused.
    const TYPE_NAME: &'static str;

    /// Convert from a SQL value to this type.
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError>;

    /// Convert from an optional SQL value.
    ///
    /// Returns `None` if the value is NULL.
    fn from_sql_nullable(value: &SqlValue) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_sql(value).map(Some)
        }
    }
}

fn refuse<T: FromSql>(value: &SqlValue) -> TypeError {
    match value {
        SqlValue::Null => TypeError::NullValue,
        _ => TypeError::cast(value.type_name(), T::TYPE_NAME),
    }
}

impl FromSql for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Bool(v) => Ok(*v),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for u8 {
    const TYPE_NAME: &'static str = "u8";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::TinyInt(v) => Ok(*v),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for i16 {
    const TYPE_NAME: &'static str = "i16";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::SmallInt(v) => Ok(*v),
            SqlValue::TinyInt(v) => Ok(i16::from(*v)),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for i32 {
    const TYPE_NAME: &'static str = "i32";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::SmallInt(v) => Ok(i32::from(*v)),
            SqlValue::TinyInt(v) => Ok(i32::from(*v)),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::BigInt(v) => Ok(*v),
            SqlValue::Int(v) => Ok(i64::from(*v)),
            SqlValue::SmallInt(v) => Ok(i64::from(*v)),
            SqlValue::TinyInt(v) => Ok(i64::from(*v)),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Float(v) => Ok(*v),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Double(v) => Ok(*v),
            SqlValue::Float(v) => Ok(f64::from(*v)),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for String {
    const TYPE_NAME: &'static str = "String";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::String(v) | SqlValue::Xml(v) | SqlValue::Json(v) => Ok(v.clone()),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for Bytes {
    const TYPE_NAME: &'static str = "Bytes";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(v) => Ok(v.clone()),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for Vec<u8> {
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(v) => Ok(v.to_vec()),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl<T: FromSql> FromSql for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        T::from_sql_nullable(value)
    }
}

impl FromSql for Uuid {
    const TYPE_NAME: &'static str = "Uuid";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Uuid(v) => Ok(*v),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for Decimal {
    const TYPE_NAME: &'static str = "Decimal";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Decimal(v) => Ok(*v),
            SqlValue::TinyInt(v) => Ok(Decimal::from(*v)),
            SqlValue::SmallInt(v) => Ok(Decimal::from(*v)),
            SqlValue::Int(v) => Ok(Decimal::from(*v)),
            SqlValue::BigInt(v) => Ok(Decimal::from(*v)),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for NaiveDate {
    const TYPE_NAME: &'static str = "NaiveDate";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Date(v) => Ok(*v),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for NaiveTime {
    const TYPE_NAME: &'static str = "NaiveTime";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Time(v) => Ok(*v),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for NaiveDateTime {
    const TYPE_NAME: &'static str = "NaiveDateTime";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::DateTime(v) => Ok(*v),
            SqlValue::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for DateTime<FixedOffset> {
    const TYPE_NAME: &'static str = "DateTime<FixedOffset>";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::DateTimeOffset(v) => Ok(*v),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for DateTime<Utc> {
    const TYPE_NAME: &'static str = "DateTime<Utc>";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::DateTimeOffset(v) => Ok(v.to_utc()),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

impl FromSql for SqlVector {
    const TYPE_NAME: &'static str = "SqlVector";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Vector(v) => Ok(v.clone()),
            _ => Err(refuse::<Self>(value)),
        }
    }
}

#[cfg(feature = "json")]
impl FromSql for serde_json::Value {
    const TYPE_NAME: &'static str = "serde_json::Value";

    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Json(s) | SqlValue::String(s) => {
                serde_json::from_str(s).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
            }
            _ => Err(refuse::<Self>(value)),
        }
    }
}
