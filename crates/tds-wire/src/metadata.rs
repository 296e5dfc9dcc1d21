//! Result-set column metadata.
//!
//! A COLMETADATA token describes every column of the rows that follow it.
//! Row decoding needs three things from each column: how its value is
//! length-prefixed on the wire, how large that prefix and the value can be,
//! and the type details (precision, scale, collation) used to interpret the
//! value bytes.

use bytes::{Buf, BufMut};

use crate::codec::{read_b_varchar, read_us_varchar, write_b_varchar};
use crate::error::ProtocolError;
use crate::types::{ColumnFlags, TypeId, max_length_prefix_size};

/// Declared length that marks a `(MAX)` column.
pub const MAX_LENGTH_MARKER: u32 = 0xFFFF;

/// User type id the server assigns to `rowversion`/`timestamp` columns.
pub const USER_TYPE_ROW_VERSION: u32 = 0x50;

/// Column metadata token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColMetaData {
    /// Column definitions.
    pub columns: Vec<ColumnData>,
}

/// Column definition within metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData {
    /// Column name.
    pub name: String,
    /// Column data type ID.
    pub type_id: TypeId,
    /// Column data type raw byte.
    pub col_type: u8,
    /// Column flags.
    pub flags: ColumnFlags,
    /// User type ID.
    pub user_type: u32,
    /// Type-specific metadata.
    pub type_info: TypeInfo,
}

/// Type-specific metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeInfo {
    /// Maximum length for variable-length types.
    pub max_length: Option<u32>,
    /// Precision for numeric types.
    pub precision: Option<u8>,
    /// Scale for numeric and time types.
    pub scale: Option<u8>,
    /// Collation for string types.
    pub collation: Option<Collation>,
    /// Element type byte for vector columns.
    pub vector_element_type: Option<u8>,
}

/// SQL Server collation.
///
/// For `VARCHAR` columns the collation determines the code page used to
/// store the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collation {
    /// Locale ID. Bit 27 marks a UTF-8 collation.
    pub lcid: u32,
    /// Sort ID.
    pub sort_id: u8,
}

impl Collation {
    /// Character encoding for `VARCHAR` data, `None` for UTF-8 collations.
    #[cfg(feature = "encoding")]
    pub fn encoding(&self) -> Option<&'static encoding_rs::Encoding> {
        crate::collation::encoding_for_lcid(self.lcid)
    }

    /// Returns whether this collation stores UTF-8.
    #[must_use]
    pub fn is_utf8(&self) -> bool {
        crate::collation::is_utf8_collation(self.lcid)
    }

    /// Windows code page for this collation.
    #[must_use]
    pub fn code_page(&self) -> Option<u16> {
        crate::collation::code_page_for_lcid(self.lcid)
    }
}

/// How a column value is length-prefixed inside a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    /// No prefix, the value always occupies this many bytes.
    Fixed(usize),
    /// 1-byte length.
    Byte,
    /// 2-byte length.
    UShort,
    /// 4-byte length (`sql_variant`).
    Int,
    /// Text pointer, timestamp and 4-byte length (legacy LOBs).
    TextPtr,
    /// Partially length-prefixed: 8-byte total length followed by chunks.
    Plp,
}

impl ColMetaData {
    /// Special value indicating no metadata.
    pub const NO_METADATA: u16 = 0xFFFF;

    /// Decode a COLMETADATA token body (without the token byte).
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let column_count = src.get_u16_le();
        if column_count == Self::NO_METADATA {
            return Ok(Self::default());
        }

        let columns = (0..column_count)
            .map(|_| ColumnData::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { columns })
    }

    /// Encode a COLMETADATA token body.
    ///
    /// Only the fields row decoding depends on are written, which is enough
    /// to build result streams for tests and tools.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u16_le(self.columns.len() as u16);
        for column in &self.columns {
            column.encode(dst);
        }
    }

    /// Get the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if this represents no metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl ColumnData {
    /// Build a column description with default flags.
    #[must_use]
    pub fn new(name: impl Into<String>, type_id: TypeId, type_info: TypeInfo) -> Self {
        Self {
            name: name.into(),
            type_id,
            col_type: type_id as u8,
            flags: ColumnFlags::NULLABLE,
            user_type: 0,
            type_info,
        }
    }

    /// Set the user type id.
    #[must_use]
    pub fn with_user_type(mut self, user_type: u32) -> Self {
        self.user_type = user_type;
        self
    }

    fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        // UserType (4) + Flags (2) + TypeId (1)
        if src.remaining() < 7 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let user_type = src.get_u32_le();
        let flags = ColumnFlags::from_bits_retain(src.get_u16_le());
        let col_type = src.get_u8();
        let type_id = TypeId::from_u8(col_type).ok_or(ProtocolError::UnsupportedType(col_type))?;
        let type_info = decode_type_info(src, type_id, col_type)?;
        let name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

        Ok(Self {
            name,
            type_id,
            col_type,
            flags,
            user_type,
            type_info,
        })
    }

    fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.user_type);
        dst.put_u16_le(self.flags.bits());
        dst.put_u8(self.col_type);

        let info = &self.type_info;
        let max_length = info.max_length.unwrap_or(0);
        match self.length_prefix() {
            LengthPrefix::Fixed(_) => {}
            LengthPrefix::Byte => match self.type_id {
                TypeId::Date => {}
                TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
                    dst.put_u8(info.scale.unwrap_or(7));
                }
                TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
                    dst.put_u8(max_length as u8);
                    dst.put_u8(info.precision.unwrap_or(18));
                    dst.put_u8(info.scale.unwrap_or(0));
                }
                _ => dst.put_u8(max_length as u8),
            },
            LengthPrefix::UShort | LengthPrefix::Plp if self.type_id == TypeId::Vector => {
                dst.put_u16_le(max_length as u16);
                dst.put_u8(info.vector_element_type.unwrap_or(0));
            }
            LengthPrefix::UShort | LengthPrefix::Plp => match self.type_id {
                TypeId::Xml => dst.put_u8(0),
                TypeId::Json => {}
                TypeId::Udt => {
                    dst.put_u16_le(max_length as u16);
                    for _ in 0..3 {
                        write_b_varchar(dst, "");
                    }
                    dst.put_u16_le(0);
                }
                _ => {
                    dst.put_u16_le(max_length as u16);
                    if let Some(collation) = info.collation {
                        put_collation(dst, collation);
                    }
                }
            },
            LengthPrefix::Int => dst.put_u32_le(max_length),
            LengthPrefix::TextPtr => {
                dst.put_u32_le(max_length);
                if let Some(collation) = info.collation {
                    put_collation(dst, collation);
                }
                dst.put_u8(0);
            }
        }

        write_b_varchar(dst, &self.name);
    }

    /// Check if this column is nullable.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.flags.contains(ColumnFlags::NULLABLE)
    }

    /// Get the fixed size in bytes for this column, if applicable.
    #[must_use]
    pub fn fixed_size(&self) -> Option<usize> {
        self.type_id.fixed_size()
    }

    /// Length-prefix form of this column's values.
    #[must_use]
    pub fn length_prefix(&self) -> LengthPrefix {
        if let Some(size) = self.type_id.fixed_size() {
            return LengthPrefix::Fixed(size);
        }
        match self.type_id {
            TypeId::Xml | TypeId::Json | TypeId::Udt => LengthPrefix::Plp,
            TypeId::Text | TypeId::NText | TypeId::Image => LengthPrefix::TextPtr,
            TypeId::Variant => LengthPrefix::Int,
            TypeId::BigVarChar
            | TypeId::BigVarBinary
            | TypeId::BigChar
            | TypeId::BigBinary
            | TypeId::NChar
            | TypeId::NVarChar
                if self.type_info.max_length == Some(MAX_LENGTH_MARKER) =>
            {
                LengthPrefix::Plp
            }
            TypeId::BigVarChar
            | TypeId::BigVarBinary
            | TypeId::BigChar
            | TypeId::BigBinary
            | TypeId::NChar
            | TypeId::NVarChar
            | TypeId::Vector => LengthPrefix::UShort,
            _ => LengthPrefix::Byte,
        }
    }

    /// Returns whether values are sent in PLP chunks.
    #[must_use]
    pub fn is_plp(&self) -> bool {
        self.length_prefix() == LengthPrefix::Plp
    }

    /// Returns whether this is a large-object column (PLP or text pointer).
    #[must_use]
    pub fn is_long(&self) -> bool {
        matches!(self.length_prefix(), LengthPrefix::Plp | LengthPrefix::TextPtr)
    }

    /// Returns whether this is a user-defined type column.
    #[must_use]
    pub fn is_udt(&self) -> bool {
        self.type_id == TypeId::Udt
    }

    /// Returns whether this is a table-valued column.
    #[must_use]
    pub fn is_tvp(&self) -> bool {
        self.type_id == TypeId::Tvp
    }

    /// Returns whether this is a `rowversion` column.
    #[must_use]
    pub fn is_row_version(&self) -> bool {
        self.user_type == USER_TYPE_ROW_VERSION
    }

    /// Largest length prefix this column's values can carry.
    #[must_use]
    pub fn max_header_size(&self) -> usize {
        match self.type_id {
            TypeId::Vector => 2,
            _ => max_length_prefix_size(self.col_type),
        }
    }

    /// Largest value this column can carry, in bytes.
    ///
    /// For fixed types this is the fixed size; otherwise the declared length.
    #[must_use]
    pub fn max_data_length(&self) -> usize {
        if let Some(size) = self.type_id.fixed_size() {
            return size;
        }
        match self.type_id {
            TypeId::Date => 3,
            TypeId::Time => 5,
            TypeId::DateTime2 => 8,
            TypeId::DateTimeOffset => 10,
            _ => self.type_info.max_length.unwrap_or(0) as usize,
        }
    }
}

fn decode_type_info(
    src: &mut impl Buf,
    type_id: TypeId,
    col_type: u8,
) -> Result<TypeInfo, ProtocolError> {
    let info = match type_id {
        TypeId::Null
        | TypeId::Int1
        | TypeId::Bit
        | TypeId::Int2
        | TypeId::Int4
        | TypeId::Int8
        | TypeId::Float4
        | TypeId::Float8
        | TypeId::Money
        | TypeId::Money4
        | TypeId::DateTime
        | TypeId::DateTime4
        | TypeId::Date
        | TypeId::Json => TypeInfo::default(),

        TypeId::IntN
        | TypeId::BitN
        | TypeId::FloatN
        | TypeId::MoneyN
        | TypeId::DateTimeN
        | TypeId::Guid
        | TypeId::Char
        | TypeId::VarChar
        | TypeId::Binary
        | TypeId::VarBinary => TypeInfo {
            max_length: Some(u32::from(get_u8(src)?)),
            ..Default::default()
        },

        TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
            need(src, 3)?;
            TypeInfo {
                max_length: Some(u32::from(src.get_u8())),
                precision: Some(src.get_u8()),
                scale: Some(src.get_u8()),
                ..Default::default()
            }
        }

        TypeId::BigVarChar | TypeId::BigChar | TypeId::NChar | TypeId::NVarChar => {
            need(src, 7)?;
            let max_length = u32::from(src.get_u16_le());
            TypeInfo {
                max_length: Some(max_length),
                collation: Some(get_collation(src)?),
                ..Default::default()
            }
        }

        TypeId::BigVarBinary | TypeId::BigBinary => {
            need(src, 2)?;
            TypeInfo {
                max_length: Some(u32::from(src.get_u16_le())),
                ..Default::default()
            }
        }

        TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => TypeInfo {
            scale: Some(get_u8(src)?),
            ..Default::default()
        },

        TypeId::Text | TypeId::NText | TypeId::Image => {
            need(src, 4)?;
            let max_length = src.get_u32_le();
            let collation = if type_id == TypeId::Image {
                None
            } else {
                Some(get_collation(src)?)
            };
            // Table name parts, not needed to read values.
            let num_parts = get_u8(src)?;
            for _ in 0..num_parts {
                read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
            }
            TypeInfo {
                max_length: Some(max_length),
                collation,
                ..Default::default()
            }
        }

        TypeId::Xml => {
            if get_u8(src)? != 0 {
                // database, owning schema, schema collection
                for _ in 0..2 {
                    read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                }
                read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
            }
            TypeInfo {
                max_length: Some(MAX_LENGTH_MARKER),
                ..Default::default()
            }
        }

        TypeId::Udt => {
            need(src, 2)?;
            let max_length = u32::from(src.get_u16_le());
            // database, schema, type name, assembly qualified name
            for _ in 0..3 {
                read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
            }
            read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
            TypeInfo {
                max_length: Some(max_length),
                ..Default::default()
            }
        }

        TypeId::Vector => {
            need(src, 3)?;
            TypeInfo {
                max_length: Some(u32::from(src.get_u16_le())),
                vector_element_type: Some(src.get_u8()),
                ..Default::default()
            }
        }

        TypeId::Variant => {
            need(src, 4)?;
            TypeInfo {
                max_length: Some(src.get_u32_le()),
                ..Default::default()
            }
        }

        TypeId::Tvp => return Err(ProtocolError::UnsupportedType(col_type)),
    };
    Ok(info)
}

fn need(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(())
}

fn get_u8(src: &mut impl Buf) -> Result<u8, ProtocolError> {
    need(src, 1)?;
    Ok(src.get_u8())
}

fn get_collation(src: &mut impl Buf) -> Result<Collation, ProtocolError> {
    need(src, 5)?;
    let lcid = src.get_u32_le();
    let sort_id = src.get_u8();
    Ok(Collation { lcid, sort_id })
}

fn put_collation(dst: &mut impl BufMut, collation: Collation) {
    dst.put_u32_le(collation.lcid);
    dst.put_u8(collation.sort_id);
}
