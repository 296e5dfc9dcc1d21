//! Decoding column value bytes into cells.
//!
//! The row reader strips the length prefix and hands over exactly the value
//! bytes; PLP values arrive as their chunks. Nothing here touches the
//! network, so decoding never suspends.

use bytes::{Buf, Bytes};
use tds_wire::{ColumnData, TypeId};
use uuid::Uuid;

use crate::cached::CachedBuffer;
use crate::cell::{SqlCell, StorageKind};
use crate::decimal::SqlDecimal;
use crate::error::TypeError;
use crate::temporal::{self, TimeValue};
use crate::vector;

/// Storage kind a null value of this column is marked with.
#[must_use]
pub fn null_kind_for(column: &ColumnData) -> StorageKind {
    let declared = column.type_info.max_length.unwrap_or(0);
    match column.type_id {
        TypeId::Null => StorageKind::Empty,
        TypeId::Bit | TypeId::BitN => StorageKind::Boolean,
        TypeId::Int1 => StorageKind::Byte,
        TypeId::Int2 => StorageKind::Int16,
        TypeId::Int4 => StorageKind::Int32,
        TypeId::Int8 => StorageKind::Int64,
        TypeId::IntN => match declared {
            1 => StorageKind::Byte,
            2 => StorageKind::Int16,
            8 => StorageKind::Int64,
            _ => StorageKind::Int32,
        },
        TypeId::Float4 => StorageKind::Single,
        TypeId::FloatN if declared == 4 => StorageKind::Single,
        TypeId::Float8 | TypeId::FloatN => StorageKind::Double,
        TypeId::Money | TypeId::Money4 | TypeId::MoneyN => StorageKind::Money,
        TypeId::DateTime | TypeId::DateTime4 | TypeId::DateTimeN => StorageKind::DateTime,
        TypeId::Guid => StorageKind::Guid,
        TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
            StorageKind::Decimal
        }
        TypeId::Date => StorageKind::Date,
        TypeId::Time => StorageKind::Time,
        TypeId::DateTime2 => StorageKind::DateTime2,
        TypeId::DateTimeOffset => StorageKind::DateTimeOffset,
        TypeId::Char
        | TypeId::VarChar
        | TypeId::BigChar
        | TypeId::BigVarChar
        | TypeId::Text
        | TypeId::NChar
        | TypeId::NVarChar
        | TypeId::NText => StorageKind::String,
        TypeId::Xml => StorageKind::Xml,
        TypeId::Json => StorageKind::Json,
        TypeId::Vector => StorageKind::Vector,
        TypeId::Binary
        | TypeId::VarBinary
        | TypeId::BigBinary
        | TypeId::BigVarBinary
        | TypeId::Image
        | TypeId::Udt
        | TypeId::Variant
        | TypeId::Tvp => StorageKind::Binary,
    }
}

/// Mark `cell` as the null of `column`'s type.
///
/// A null vector keeps the dimension implied by its declared length.
pub fn set_null(cell: &mut SqlCell, column: &ColumnData) {
    if column.type_id == TypeId::Vector {
        let element_type = column.type_info.vector_element_type.unwrap_or(0);
        let max_length = column.type_info.max_length.unwrap_or(0);
        cell.set_null_vector(
            element_type,
            vector::declared_element_count(max_length, element_type),
        );
    } else {
        cell.set_null_of_kind(null_kind_for(column));
    }
}

/// Decode a complete PLP value delivered as chunks.
pub fn decode_plp_into(
    cell: &mut SqlCell,
    column: &ColumnData,
    chunks: Vec<Bytes>,
) -> Result<(), TypeError> {
    if column.type_id == TypeId::Xml {
        cell.set_cached_xml(CachedBuffer::from_chunks(chunks));
        return Ok(());
    }
    let data = match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.into_iter().next().unwrap_or_default(),
        _ => Bytes::from(chunks.concat()),
    };
    decode_into(cell, column, data)
}

/// Decode the value bytes of a non-null column into `cell`.
pub fn decode_into(cell: &mut SqlCell, column: &ColumnData, mut data: Bytes) -> Result<(), TypeError> {
    let len = data.len();
    match column.type_id {
        TypeId::Null => cell.set_null_of_kind(StorageKind::Empty),
        TypeId::Bit | TypeId::BitN => {
            TypeError::need(1, len)?;
            cell.set_bool(data.get_u8() != 0);
        }
        TypeId::Int1 => {
            TypeError::need(1, len)?;
            cell.set_u8(data.get_u8());
        }
        TypeId::Int2 => {
            TypeError::need(2, len)?;
            cell.set_i16(data.get_i16_le());
        }
        TypeId::Int4 => {
            TypeError::need(4, len)?;
            cell.set_i32(data.get_i32_le());
        }
        TypeId::Int8 => {
            TypeError::need(8, len)?;
            cell.set_i64(data.get_i64_le());
        }
        TypeId::IntN => match len {
            1 => cell.set_u8(data.get_u8()),
            2 => cell.set_i16(data.get_i16_le()),
            4 => cell.set_i32(data.get_i32_le()),
            8 => cell.set_i64(data.get_i64_le()),
            _ => return Err(invalid_length("INTN", len)),
        },
        TypeId::Float4 => {
            TypeError::need(4, len)?;
            cell.set_f32(data.get_f32_le());
        }
        TypeId::Float8 => {
            TypeError::need(8, len)?;
            cell.set_f64(data.get_f64_le());
        }
        TypeId::FloatN => match len {
            4 => cell.set_f32(data.get_f32_le()),
            8 => cell.set_f64(data.get_f64_le()),
            _ => return Err(invalid_length("FLOATN", len)),
        },
        TypeId::Money | TypeId::Money4 | TypeId::MoneyN => match len {
            4 => cell.set_money(i64::from(data.get_i32_le())),
            8 => {
                let high = data.get_i32_le();
                let low = data.get_u32_le();
                cell.set_money((i64::from(high) << 32) | i64::from(low));
            }
            _ => return Err(invalid_length("MONEY", len)),
        },
        TypeId::DateTime | TypeId::DateTime4 | TypeId::DateTimeN => match len {
            4 => {
                let days = data.get_u16_le();
                let minutes = data.get_u16_le();
                let (day, time) = temporal::small_datetime_parts(days, minutes);
                cell.set_datetime(day, time);
            }
            8 => {
                let day = data.get_i32_le();
                let time = data.get_u32_le();
                cell.set_datetime(day, time);
            }
            _ => return Err(invalid_length("DATETIME", len)),
        },
        TypeId::Guid => {
            let bytes: [u8; 16] = data[..]
                .try_into()
                .map_err(|_| invalid_length("UNIQUEIDENTIFIER", len))?;
            cell.set_guid(Uuid::from_bytes_le(bytes));
        }
        TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
            cell.set_decimal(decode_decimal(column, &data)?);
        }
        TypeId::Date => cell.set_date(temporal::days_from_wire(&data)?),
        TypeId::Time => cell.set_time(decode_time(column, &data)?),
        TypeId::DateTime2 => {
            let time_len = time_len(column);
            TypeError::need(time_len + 3, len)?;
            let time = TimeValue::from_wire(&data[..time_len], scale(column))?;
            let days = temporal::days_from_wire(&data[time_len..time_len + 3])?;
            cell.set_datetime2(days, time);
        }
        TypeId::DateTimeOffset => {
            let time_len = time_len(column);
            TypeError::need(time_len + 5, len)?;
            let time = TimeValue::from_wire(&data[..time_len], scale(column))?;
            let days = temporal::days_from_wire(&data[time_len..time_len + 3])?;
            let offset = i16::from_le_bytes([data[time_len + 3], data[time_len + 4]]);
            cell.set_datetime_offset(days, time, offset);
        }
        TypeId::Char | TypeId::VarChar | TypeId::BigChar | TypeId::BigVarChar | TypeId::Text => {
            cell.set_string(decode_varchar(column, &data)?);
        }
        TypeId::NChar | TypeId::NVarChar | TypeId::NText => {
            let s = tds_wire::codec::decode_utf16le(&data)
                .map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
            cell.set_string(s);
        }
        TypeId::Binary
        | TypeId::VarBinary
        | TypeId::BigBinary
        | TypeId::BigVarBinary
        | TypeId::Image
        | TypeId::Udt => cell.set_binary(data),
        TypeId::Xml => cell.set_cached_xml(CachedBuffer::from_chunks([data])),
        TypeId::Json => {
            let s = String::from_utf8(data.to_vec())
                .map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
            cell.set_json(s);
        }
        TypeId::Vector => cell.set_vector(data)?,
        TypeId::Variant | TypeId::Tvp => {
            return Err(TypeError::UnsupportedType(column.type_id.sql_name().to_string()));
        }
    }
    Ok(())
}

fn invalid_length(type_name: &str, len: usize) -> TypeError {
    TypeError::InvalidBinary(format!("invalid {type_name} length: {len}"))
}

fn scale(column: &ColumnData) -> u8 {
    column.type_info.scale.unwrap_or(7)
}

fn time_len(column: &ColumnData) -> usize {
    temporal::time_bytes_for_scale(scale(column))
}

fn decode_time(column: &ColumnData, data: &[u8]) -> Result<TimeValue, TypeError> {
    TimeValue::from_wire(data, scale(column))
}

fn decode_decimal(column: &ColumnData, data: &[u8]) -> Result<SqlDecimal, TypeError> {
    let (&sign, magnitude) = data
        .split_first()
        .ok_or(TypeError::BufferTooSmall { needed: 1, available: 0 })?;
    if magnitude.len() > 16 || magnitude.len() % 4 != 0 {
        return Err(invalid_length("DECIMAL", data.len()));
    }
    let mut raw = [0u8; 16];
    raw[..magnitude.len()].copy_from_slice(magnitude);
    let info = &column.type_info;
    Ok(SqlDecimal::new(
        info.precision.unwrap_or(38),
        info.scale.unwrap_or(0),
        sign == 1,
        u128::from_le_bytes(raw),
    ))
}

#[cfg(feature = "encoding")]
fn decode_varchar(column: &ColumnData, data: &[u8]) -> Result<String, TypeError> {
    let collation = column.type_info.collation.unwrap_or_default();
    if collation.is_utf8() {
        return String::from_utf8(data.to_vec()).map_err(|e| TypeError::InvalidEncoding(e.to_string()));
    }
    let encoding = collation.encoding().unwrap_or(encoding_rs::WINDOWS_1252);
    let (decoded, had_errors) = encoding.decode_without_bom_handling(data);
    if had_errors {
        return Err(TypeError::InvalidEncoding(format!(
            "bytes are not valid {}",
            encoding.name()
        )));
    }
    Ok(decoded.into_owned())
}

#[cfg(not(feature = "encoding"))]
fn decode_varchar(_column: &ColumnData, data: &[u8]) -> Result<String, TypeError> {
    String::from_utf8(data.to_vec()).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tds_wire::{Collation, TypeInfo};

    use super::*;
    use crate::value::SqlValue;

    fn column(type_id: TypeId, info: TypeInfo) -> ColumnData {
        ColumnData::new("c", type_id, info)
    }

    fn decode(column: &ColumnData, bytes: &[u8]) -> SqlCell {
        let mut cell = SqlCell::new();
        decode_into(&mut cell, column, Bytes::copy_from_slice(bytes)).unwrap();
        cell
    }

    #[test]
    fn test_intn_by_length() {
        let col = column(TypeId::IntN, TypeInfo { max_length: Some(8), ..Default::default() });
        assert_eq!(decode(&col, &[0x2A, 0, 0, 0]).as_i32().unwrap(), 42);
        assert_eq!(decode(&col, &(-1i64).to_le_bytes()).as_i64().unwrap(), -1);
        let mut cell = SqlCell::new();
        assert!(decode_into(&mut cell, &col, Bytes::from_static(&[1, 2, 3])).is_err());
    }

    #[test]
    fn test_money_halves() {
        let col = column(TypeId::Money, TypeInfo::default());
        let value: i64 = -123_456;
        let mut wire = Vec::new();
        wire.extend_from_slice(&((value >> 32) as i32).to_le_bytes());
        wire.extend_from_slice(&(value as u32).to_le_bytes());
        assert_eq!(
            decode(&col, &wire).as_decimal().unwrap(),
            Decimal::from_str("-12.3456").unwrap()
        );
    }

    #[test]
    fn test_guid_is_mixed_endian() {
        let col = column(TypeId::Guid, TypeInfo::default());
        let id = Uuid::from_str("01020304-0506-0708-090a-0b0c0d0e0f10").unwrap();
        let cell = decode(&col, &id.to_bytes_le());
        assert_eq!(cell.as_guid().unwrap(), id);
    }

    #[test]
    fn test_decimal() {
        let col = column(
            TypeId::DecimalN,
            TypeInfo { precision: Some(10), scale: Some(2), ..Default::default() },
        );
        let mut wire = vec![1u8];
        wire.extend_from_slice(&314u32.to_le_bytes());
        let cell = decode(&col, &wire);
        assert_eq!(cell.value().unwrap(), SqlValue::Decimal(Decimal::from_str("3.14").unwrap()));
    }

    #[test]
    fn test_datetime2() {
        let col = column(TypeId::DateTime2, TypeInfo { scale: Some(0), ..Default::default() });
        // 00:00:01 on 2024-01-01
        let cell = decode(&col, &[0x01, 0x00, 0x00, 0x45, 0x46, 0x0B]);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 1).unwrap();
        assert_eq!(cell.as_datetime2().unwrap(), expected);
    }

    #[test]
    fn test_smalldatetime() {
        let col = column(TypeId::DateTimeN, TypeInfo { max_length: Some(4), ..Default::default() });
        // one day and 90 minutes after the epoch
        let cell = decode(&col, &[0x01, 0x00, 0x5A, 0x00]);
        let expected = NaiveDate::from_ymd_opt(1900, 1, 2).unwrap().and_hms_opt(1, 30, 0).unwrap();
        assert_eq!(cell.as_datetime().unwrap(), expected);
    }

    #[test]
    fn test_nvarchar() {
        let col = column(TypeId::NVarChar, TypeInfo { max_length: Some(20), ..Default::default() });
        let wire: Vec<u8> = "abc".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(decode(&col, &wire).as_str().unwrap(), "abc");
    }

    #[test]
    fn test_varchar_uses_collation_code_page() {
        let info = TypeInfo {
            max_length: Some(10),
            collation: Some(Collation { lcid: 0x0409, sort_id: 0 }),
            ..Default::default()
        };
        let col = column(TypeId::BigVarChar, info);
        // 0xE9 is e-acute in windows-1252
        assert_eq!(decode(&col, &[b'c', b'a', b'f', 0xE9]).as_str().unwrap(), "caf\u{e9}");
    }

    #[test]
    fn test_xml_plp_chunks_are_cached() {
        let col = column(TypeId::Xml, TypeInfo::default());
        let wire: Vec<u8> = [0xFF, 0xFE]
            .into_iter()
            .chain("<x/>".encode_utf16().flat_map(u16::to_le_bytes))
            .collect();
        let (a, b) = wire.split_at(3);
        let mut cell = SqlCell::new();
        decode_plp_into(
            &mut cell,
            &col,
            vec![Bytes::copy_from_slice(a), Bytes::copy_from_slice(b)],
        )
        .unwrap();
        assert_eq!(cell.kind(), StorageKind::CachedXmlBuffer);
        assert_eq!(cell.as_string().unwrap(), "<x/>");
    }

    #[test]
    fn test_null_vector_dimension_from_declared_length() {
        let info = TypeInfo {
            max_length: Some(8 + 4 * 3),
            vector_element_type: Some(0),
            ..Default::default()
        };
        let col = column(TypeId::Vector, info);
        let mut cell = SqlCell::new();
        set_null(&mut cell, &col);
        assert!(cell.is_null());
        assert_eq!(cell.kind(), StorageKind::Vector);
        assert!(cell.sql_value().unwrap().is_null());
    }

    #[test]
    fn test_null_kind_follows_declared_length() {
        let col = column(TypeId::IntN, TypeInfo { max_length: Some(2), ..Default::default() });
        assert_eq!(null_kind_for(&col), StorageKind::Int16);
        let col = column(TypeId::FloatN, TypeInfo { max_length: Some(4), ..Default::default() });
        assert_eq!(null_kind_for(&col), StorageKind::Single);
    }
}
