//! Cell accessor behavior across storage kinds.
//!
//! Covers:
//! - null handling for every kind
//! - decimal trimming and money conversion through every accessor
//! - widening and refused conversions
//! - vectors and XML

#![allow(clippy::unwrap_used, clippy::panic)]

use std::str::FromStr;

use bytes::Bytes;
use chrono::NaiveDate;
use mssql_value::temporal::TimeValue;
use mssql_value::{
    CachedBuffer, RowBuffer, SqlCell, SqlDecimal, SqlTypedValue, SqlValue, SqlVector, SqlXml,
    StorageKind, TypeError,
};
use rust_decimal::Decimal;
use uuid::Uuid;

const ALL_KINDS: [StorageKind; 21] = [
    StorageKind::Boolean,
    StorageKind::Byte,
    StorageKind::Int16,
    StorageKind::Int32,
    StorageKind::Int64,
    StorageKind::Single,
    StorageKind::Double,
    StorageKind::Decimal,
    StorageKind::Money,
    StorageKind::Guid,
    StorageKind::DateTime,
    StorageKind::Date,
    StorageKind::Time,
    StorageKind::DateTime2,
    StorageKind::DateTimeOffset,
    StorageKind::String,
    StorageKind::Binary,
    StorageKind::CachedXmlBuffer,
    StorageKind::Xml,
    StorageKind::Json,
    StorageKind::Vector,
];

// ============================================================================
// NULL Handling
// ============================================================================

mod null_handling {
    use super::*;

    fn null_cell(kind: StorageKind) -> SqlCell {
        let mut cell = SqlCell::new();
        cell.set_null_of_kind(kind);
        cell
    }

    #[test]
    fn test_typed_accessors_raise_null_value() {
        for kind in ALL_KINDS {
            let cell = null_cell(kind);
            assert!(matches!(cell.as_bool(), Err(TypeError::NullValue)), "{kind:?}");
            assert!(matches!(cell.as_i32(), Err(TypeError::NullValue)), "{kind:?}");
            assert!(matches!(cell.as_decimal(), Err(TypeError::NullValue)), "{kind:?}");
            assert!(matches!(cell.as_string(), Err(TypeError::NullValue)), "{kind:?}");
            assert!(matches!(cell.as_bytes(), Err(TypeError::NullValue)), "{kind:?}");
            assert!(matches!(cell.as_sql_xml(), Err(TypeError::NullValue)), "{kind:?}");
            assert!(matches!(cell.as_datetime2(), Err(TypeError::NullValue)), "{kind:?}");
            assert!(matches!(cell.as_vector_f32(), Err(TypeError::NullValue)), "{kind:?}");
        }
    }

    #[test]
    fn test_generic_accessors_return_sentinels() {
        for kind in ALL_KINDS {
            let cell = null_cell(kind);
            assert_eq!(cell.value().unwrap(), SqlValue::Null, "{kind:?}");
            let typed = cell.sql_value().unwrap();
            assert!(typed.is_null(), "{kind:?}");
            assert_ne!(typed, SqlTypedValue::DbNull, "{kind:?}");
        }
    }

    #[test]
    fn test_get_option_maps_null_to_none() {
        let cell = null_cell(StorageKind::Int32);
        assert_eq!(cell.get::<Option<i32>>().unwrap(), None);
        assert!(matches!(cell.get::<i32>(), Err(TypeError::NullValue)));
    }

    #[test]
    fn test_null_xml_is_typed() {
        let typed = null_cell(StorageKind::CachedXmlBuffer).sql_value().unwrap();
        match typed {
            SqlTypedValue::Xml(xml) => assert!(xml.is_null()),
            other => panic!("unexpected {other:?}"),
        }
    }
}

// ============================================================================
// Decimal and Money
// ============================================================================

mod decimal_and_money {
    use super::*;

    #[test]
    fn test_accessors_agree_on_trimmed_decimal() {
        // 1.00000000000000000000000000000 at scale 29
        let value = SqlDecimal::new(30, 29, true, 10u128.pow(29));
        let mut cell = SqlCell::new();
        cell.set_decimal(value);

        let expected = Decimal::ONE;
        assert_eq!(cell.as_decimal().unwrap(), expected);
        assert_eq!(cell.value().unwrap(), SqlValue::Decimal(expected));
        match cell.sql_value().unwrap() {
            SqlTypedValue::Decimal(Some(d)) => assert_eq!(d.to_decimal().unwrap(), expected),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_untrimmable_decimal_overflows_everywhere() {
        // 0.12345678901234567890123456789 uses all 29 fractional digits
        let value = SqlDecimal::new(38, 29, true, 12_345_678_901_234_567_890_123_456_789);
        let mut cell = SqlCell::new();
        cell.set_decimal(value);

        assert!(matches!(cell.as_decimal(), Err(TypeError::Overflow)));
        assert!(matches!(cell.value(), Err(TypeError::Overflow)));
        // the wire form is still available
        assert_eq!(cell.as_sql_decimal().unwrap(), value);
    }

    #[test]
    fn test_money_to_decimal() {
        let mut cell = SqlCell::new();
        cell.set_money(-123_456);
        let expected = Decimal::from_str("-12.3456").unwrap();
        assert_eq!(cell.as_money().unwrap(), expected);
        assert_eq!(cell.as_decimal().unwrap(), expected);
        assert_eq!(cell.sql_value().unwrap(), SqlTypedValue::Money(Some(expected)));
    }
}

// ============================================================================
// Conversions
// ============================================================================

mod conversions {
    use super::*;

    #[test]
    fn test_integer_widening() {
        let mut cell = SqlCell::new();
        cell.set_u8(250);
        assert_eq!(cell.as_i16().unwrap(), 250);
        assert_eq!(cell.as_i32().unwrap(), 250);
        assert_eq!(cell.as_i64().unwrap(), 250);
        assert_eq!(cell.get::<Decimal>().unwrap(), Decimal::from(250));
    }

    #[test]
    fn test_int_is_not_bool() {
        let mut cell = SqlCell::new();
        cell.set_i32(1);
        match cell.as_bool() {
            Err(TypeError::InvalidCast { stored, requested }) => {
                assert_eq!(stored, "Int32");
                assert_eq!(requested, "bool");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_string_is_not_guid() {
        let mut cell = SqlCell::new();
        cell.set_string(Uuid::nil().to_string());
        assert!(matches!(cell.as_guid(), Err(TypeError::InvalidCast { .. })));
    }

    #[test]
    fn test_date_widens_to_datetime() {
        let mut cell = SqlCell::new();
        // 2024-01-01
        cell.set_date(738_885);
        let midnight = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(cell.as_datetime2().unwrap(), midnight);
    }

    #[test]
    fn test_datetime_offset_keeps_offset() {
        let mut cell = SqlCell::new();
        let noon = TimeValue {
            ticks: 12 * 3600 * 10_000_000,
            scale: 7,
        };
        cell.set_datetime_offset(738_885, noon, -300);
        let value = cell.as_datetime_offset().unwrap();
        assert_eq!(value.offset().local_minus_utc(), -300 * 60);
        assert_eq!(
            value.naive_utc(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_json_accepts_string_kind() {
        let mut cell = SqlCell::new();
        cell.set_string("{\"a\":1}".into());
        assert_eq!(cell.as_json().unwrap(), "{\"a\":1}");
        cell.clear();
        cell.set_json("[]".into());
        assert_eq!(cell.value().unwrap(), SqlValue::Json("[]".into()));
    }
}

// ============================================================================
// Vector and XML
// ============================================================================

mod vector_and_xml {
    use super::*;

    #[test]
    fn test_vector_value() {
        let wire = SqlVector::new(vec![0.5, 1.5, -2.0]).to_wire().unwrap();
        let mut cell = SqlCell::new();
        cell.set_vector(wire).unwrap();
        assert_eq!(cell.vector_element_type(), Some(0));
        match cell.value().unwrap() {
            SqlValue::Vector(v) => assert_eq!(v.values().unwrap(), &[0.5, 1.5, -2.0]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_vector_header() {
        let mut cell = SqlCell::new();
        let result = cell.set_vector(Bytes::from_static(&[0x00, 0x01]));
        assert!(matches!(result, Err(TypeError::InvalidBinary(_))));
        assert!(cell.is_empty());
    }

    #[test]
    fn test_cached_xml_sql_value_is_sql_xml() {
        let doc: Vec<u8> = "<a>1</a>".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut cell = SqlCell::new();
        cell.set_cached_xml(CachedBuffer::from_chunks([Bytes::from(doc)]));
        match cell.sql_value().unwrap() {
            SqlTypedValue::Xml(xml) => assert_eq!(xml.value(), Some("<a>1</a>")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cell.value().unwrap(), SqlValue::String("<a>1</a>".into()));
    }

    #[test]
    fn test_xml_text() {
        let mut cell = SqlCell::new();
        cell.set_xml("<b/>".into());
        assert_eq!(cell.kind(), StorageKind::Xml);
        assert_eq!(cell.as_str().unwrap(), "<b/>");
        assert_eq!(cell.as_sql_xml().unwrap(), SqlXml::new("<b/>"));
        assert_eq!(cell.value().unwrap(), SqlValue::Xml("<b/>".into()));
    }
}

// ============================================================================
// Row buffer
// ============================================================================

mod row_buffer {
    use super::*;

    #[test]
    fn test_row_values_in_column_order() {
        let mut row = RowBuffer::new(4);
        row[0].set_i32(42);
        row[1].set_string("abc".into());
        row[2].set_decimal(SqlDecimal::new(10, 2, true, 314));
        row[3].set_null_of_kind(StorageKind::Guid);

        let values: Vec<SqlValue> = row.cells().iter().map(|c| c.value().unwrap()).collect();
        assert_eq!(
            values,
            vec![
                SqlValue::Int(42),
                SqlValue::String("abc".into()),
                SqlValue::Decimal(Decimal::from_str("3.14").unwrap()),
                SqlValue::Null,
            ]
        );
    }
}
