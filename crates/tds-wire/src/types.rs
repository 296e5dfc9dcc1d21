//! TDS data type definitions.
//!
//! This module defines the SQL Server data types as they appear in column
//! metadata, and the length-prefix rules the row decoder derives from them.

/// TDS data type identifiers.
///
/// These correspond to the type bytes sent in COLMETADATA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    // Fixed-length types (no length prefix)
    /// Null type.
    Null = 0x1F,
    /// 8-bit unsigned integer.
    Int1 = 0x30,
    /// Bit (boolean).
    Bit = 0x32,
    /// 16-bit signed integer.
    Int2 = 0x34,
    /// 32-bit signed integer.
    Int4 = 0x38,
    /// 64-bit signed integer.
    Int8 = 0x7F,
    /// 32-bit floating point.
    Float4 = 0x3B,
    /// 64-bit floating point.
    Float8 = 0x3E,
    /// 8-byte money.
    Money = 0x3C,
    /// 4-byte money.
    Money4 = 0x7A,
    /// 8-byte datetime.
    DateTime = 0x3D,
    /// 4-byte small datetime.
    DateTime4 = 0x3A,

    // Variable-length types (1-byte length prefix)
    /// Variable-length GUID.
    Guid = 0x24,
    /// Variable-length integer.
    IntN = 0x26,
    /// Legacy decimal.
    Decimal = 0x37,
    /// Legacy numeric.
    Numeric = 0x3F,
    /// Variable-length bit.
    BitN = 0x68,
    /// Variable-length decimal.
    DecimalN = 0x6A,
    /// Variable-length numeric.
    NumericN = 0x6C,
    /// Variable-length float.
    FloatN = 0x6D,
    /// Variable-length money.
    MoneyN = 0x6E,
    /// Variable-length datetime.
    DateTimeN = 0x6F,
    /// Legacy fixed-length character.
    Char = 0x2F,
    /// Legacy variable-length character.
    VarChar = 0x27,
    /// Legacy fixed-length binary.
    Binary = 0x2D,
    /// Legacy variable-length binary.
    VarBinary = 0x25,

    // 2-byte length prefix, or PLP when declared as MAX
    /// Large variable-length character.
    BigVarChar = 0xA7,
    /// Large variable-length binary.
    BigVarBinary = 0xA5,
    /// Large fixed-length character.
    BigChar = 0xAF,
    /// Large fixed-length binary.
    BigBinary = 0xAD,
    /// Fixed-length Unicode character.
    NChar = 0xEF,
    /// Variable-length Unicode character.
    NVarChar = 0xE7,

    // Legacy large objects (text pointer + 4-byte length)
    /// Text.
    Text = 0x23,
    /// Image.
    Image = 0x22,
    /// NText.
    NText = 0x63,

    // Date/time types (SQL Server 2008+)
    /// Date (3 bytes).
    Date = 0x28,
    /// Time with variable precision.
    Time = 0x29,
    /// DateTime2 with variable precision.
    DateTime2 = 0x2A,
    /// DateTimeOffset with variable precision.
    DateTimeOffset = 0x2B,

    // Special types
    /// SQL Variant.
    Variant = 0x62,
    /// User-defined type.
    Udt = 0xF0,
    /// XML type.
    Xml = 0xF1,
    /// Table-valued parameter.
    Tvp = 0xF3,
    /// Native JSON type.
    Json = 0xF4,
    /// Native vector type.
    Vector = 0xF5,
}

impl TypeId {
    /// Create a type ID from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x1F => Some(Self::Null),
            0x30 => Some(Self::Int1),
            0x32 => Some(Self::Bit),
            0x34 => Some(Self::Int2),
            0x38 => Some(Self::Int4),
            0x7F => Some(Self::Int8),
            0x3B => Some(Self::Float4),
            0x3E => Some(Self::Float8),
            0x3C => Some(Self::Money),
            0x7A => Some(Self::Money4),
            0x3D => Some(Self::DateTime),
            0x3A => Some(Self::DateTime4),
            0x24 => Some(Self::Guid),
            0x26 => Some(Self::IntN),
            0x37 => Some(Self::Decimal),
            0x3F => Some(Self::Numeric),
            0x68 => Some(Self::BitN),
            0x6A => Some(Self::DecimalN),
            0x6C => Some(Self::NumericN),
            0x6D => Some(Self::FloatN),
            0x6E => Some(Self::MoneyN),
            0x6F => Some(Self::DateTimeN),
            0x2F => Some(Self::Char),
            0x27 => Some(Self::VarChar),
            0x2D => Some(Self::Binary),
            0x25 => Some(Self::VarBinary),
            0xA7 => Some(Self::BigVarChar),
            0xA5 => Some(Self::BigVarBinary),
            0xAF => Some(Self::BigChar),
            0xAD => Some(Self::BigBinary),
            0xEF => Some(Self::NChar),
            0xE7 => Some(Self::NVarChar),
            0x23 => Some(Self::Text),
            0x22 => Some(Self::Image),
            0x63 => Some(Self::NText),
            0x28 => Some(Self::Date),
            0x29 => Some(Self::Time),
            0x2A => Some(Self::DateTime2),
            0x2B => Some(Self::DateTimeOffset),
            0x62 => Some(Self::Variant),
            0xF0 => Some(Self::Udt),
            0xF1 => Some(Self::Xml),
            0xF3 => Some(Self::Tvp),
            0xF4 => Some(Self::Json),
            0xF5 => Some(Self::Vector),
            _ => None,
        }
    }

    /// Check if this is a fixed-length type.
    #[must_use]
    pub const fn is_fixed_length(&self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::Int1
                | Self::Bit
                | Self::Int2
                | Self::Int4
                | Self::Int8
                | Self::Float4
                | Self::Float8
                | Self::Money
                | Self::Money4
                | Self::DateTime
                | Self::DateTime4
        )
    }

    /// Check if this is a Unicode character type.
    #[must_use]
    pub const fn is_unicode(&self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar | Self::NText)
    }

    /// Check if a null value of this type uses the `0xFF` marker.
    ///
    /// The legacy byte-length character and binary types use `0xFF`; every
    /// other 1-byte-length type uses a zero length.
    #[must_use]
    pub const fn uses_charbin_null(&self) -> bool {
        matches!(self, Self::Char | Self::VarChar | Self::Binary | Self::VarBinary)
    }

    /// Get the fixed size of this type in bytes, if applicable.
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::Int1 => Some(1),
            Self::Bit => Some(1),
            Self::Int2 => Some(2),
            Self::Int4 => Some(4),
            Self::Int8 => Some(8),
            Self::Float4 => Some(4),
            Self::Float8 => Some(8),
            Self::Money => Some(8),
            Self::Money4 => Some(4),
            Self::DateTime => Some(8),
            Self::DateTime4 => Some(4),
            _ => None,
        }
    }

    /// SQL Server name of the type, used in diagnostics.
    #[must_use]
    pub const fn sql_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Int1 => "TINYINT",
            Self::Bit | Self::BitN => "BIT",
            Self::Int2 => "SMALLINT",
            Self::Int4 | Self::IntN => "INT",
            Self::Int8 => "BIGINT",
            Self::Float4 => "REAL",
            Self::Float8 | Self::FloatN => "FLOAT",
            Self::Money | Self::MoneyN => "MONEY",
            Self::Money4 => "SMALLMONEY",
            Self::DateTime | Self::DateTimeN => "DATETIME",
            Self::DateTime4 => "SMALLDATETIME",
            Self::Guid => "UNIQUEIDENTIFIER",
            Self::Decimal | Self::DecimalN => "DECIMAL",
            Self::Numeric | Self::NumericN => "NUMERIC",
            Self::Char | Self::BigChar => "CHAR",
            Self::VarChar | Self::BigVarChar => "VARCHAR",
            Self::Binary | Self::BigBinary => "BINARY",
            Self::VarBinary | Self::BigVarBinary => "VARBINARY",
            Self::NChar => "NCHAR",
            Self::NVarChar => "NVARCHAR",
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::NText => "NTEXT",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime2 => "DATETIME2",
            Self::DateTimeOffset => "DATETIMEOFFSET",
            Self::Variant => "SQL_VARIANT",
            Self::Udt => "UDT",
            Self::Xml => "XML",
            Self::Tvp => "TABLE",
            Self::Json => "JSON",
            Self::Vector => "VECTOR",
        }
    }
}

/// Largest length prefix a column of the given raw type byte can carry.
///
/// Fixed-length types have none. Otherwise the type byte itself encodes the
/// prefix width: bit `0x80` means a 2-byte length, bits `0x0C` clear means a
/// 4-byte length, anything else a 1-byte length.
#[must_use]
pub const fn max_length_prefix_size(col_type: u8) -> usize {
    if col_type & 0x30 == 0x30 {
        0
    } else if col_type & 0x80 != 0 {
        2
    } else if col_type & 0x0C == 0 {
        4
    } else {
        1
    }
}

bitflags::bitflags! {
    /// Column flags from COLMETADATA.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ColumnFlags: u16 {
        /// Column is nullable.
        const NULLABLE = 0x0001;
        /// Column allows case-sensitive comparison.
        const CASE_SENSITIVE = 0x0002;
        /// Column is an identity column.
        const IDENTITY = 0x0010;
        /// Column is computed.
        const COMPUTED = 0x0020;
        /// Column is a sparse column set.
        const SPARSE_COLUMN_SET = 0x0200;
        /// Column is encrypted.
        const ENCRYPTED = 0x0400;
        /// Column is hidden (browse mode key).
        const HIDDEN = 0x2000;
        /// Column is a key column.
        const KEY = 0x4000;
        /// Nullability unknown at query time.
        const NULLABLE_UNKNOWN = 0x8000;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_from_u8() {
        assert_eq!(TypeId::from_u8(0x38), Some(TypeId::Int4));
        assert_eq!(TypeId::from_u8(0xE7), Some(TypeId::NVarChar));
        assert_eq!(TypeId::from_u8(0xF5), Some(TypeId::Vector));
        assert_eq!(TypeId::from_u8(0x99), None);
    }

    #[test]
    fn test_fixed_length_detection() {
        assert!(TypeId::Int4.is_fixed_length());
        assert!(TypeId::Float8.is_fixed_length());
        assert!(!TypeId::NVarChar.is_fixed_length());
        assert!(!TypeId::Date.is_fixed_length());
    }

    #[test]
    fn test_max_length_prefix_size() {
        assert_eq!(max_length_prefix_size(TypeId::Int4 as u8), 0);
        assert_eq!(max_length_prefix_size(TypeId::Money as u8), 0);
        assert_eq!(max_length_prefix_size(TypeId::IntN as u8), 1);
        assert_eq!(max_length_prefix_size(TypeId::DecimalN as u8), 1);
        assert_eq!(max_length_prefix_size(TypeId::Date as u8), 1);
        assert_eq!(max_length_prefix_size(TypeId::NVarChar as u8), 2);
        assert_eq!(max_length_prefix_size(TypeId::BigVarBinary as u8), 2);
        assert_eq!(max_length_prefix_size(TypeId::Text as u8), 4);
    }

    #[test]
    fn test_column_flags() {
        let flags = ColumnFlags::from_bits_truncate(0x4011);
        assert!(flags.contains(ColumnFlags::NULLABLE));
        assert!(flags.contains(ColumnFlags::IDENTITY));
        assert!(flags.contains(ColumnFlags::KEY));
        assert!(!flags.contains(ColumnFlags::HIDDEN));
    }
}
