//! Native `VECTOR` values.
//!
//! A vector travels as an 8-byte header followed by packed elements:
//! layout byte `0xA9`, version `0x01`, element count (`u16` LE), element
//! type, and three reserved bytes. Only 32-bit float elements exist today.

use bytes::Bytes;

use crate::error::TypeError;

/// Size of the vector header.
pub const VECTOR_HEADER_SIZE: usize = 8;

const VECTOR_LAYOUT_FORMAT: u8 = 0xA9;
const VECTOR_LAYOUT_VERSION: u8 = 0x01;

/// Element types a vector can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VectorElementType {
    /// IEEE 754 single precision.
    Float32 = 0x00,
}

impl VectorElementType {
    /// Map the wire byte, naming it when unknown.
    pub fn from_u8(value: u8) -> Result<Self, TypeError> {
        match value {
            0x00 => Ok(Self::Float32),
            other => Err(TypeError::UnsupportedType(format!(
                "vector element type 0x{other:02X}"
            ))),
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Float32 => 4,
        }
    }
}

/// A vector of `f32` values, or a typed null that still knows its length.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlVector {
    element_count: u16,
    values: Option<Vec<f32>>,
}

impl SqlVector {
    /// A non-null vector.
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            element_count: values.len() as u16,
            values: Some(values),
        }
    }

    /// A null vector of the declared dimension.
    #[must_use]
    pub fn null(element_count: u16) -> Self {
        Self {
            element_count,
            values: None,
        }
    }

    /// Returns whether this vector is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.values.is_none()
    }

    /// Number of elements, also known for a null vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.element_count as usize
    }

    /// Returns whether the vector has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    /// The elements, `None` when null.
    #[must_use]
    pub fn values(&self) -> Option<&[f32]> {
        self.values.as_deref()
    }

    /// Parse a vector payload.
    pub fn from_wire(payload: &[u8]) -> Result<Self, TypeError> {
        let header = parse_header(payload)?;
        let element_type = VectorElementType::from_u8(header.element_type)?;
        let body = &payload[VECTOR_HEADER_SIZE..];
        let expected = header.element_count as usize * element_type.size();
        if body.len() != expected {
            return Err(TypeError::InvalidBinary(format!(
                "vector body is {} bytes, expected {expected}",
                body.len()
            )));
        }
        let values = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self {
            element_count: header.element_count,
            values: Some(values),
        })
    }

    /// Encode as a wire payload. A null vector encodes as `None`.
    #[must_use]
    pub fn to_wire(&self) -> Option<Bytes> {
        let values = self.values.as_ref()?;
        let mut out = Vec::with_capacity(VECTOR_HEADER_SIZE + values.len() * 4);
        out.extend_from_slice(&[VECTOR_LAYOUT_FORMAT, VECTOR_LAYOUT_VERSION]);
        out.extend_from_slice(&self.element_count.to_le_bytes());
        out.extend_from_slice(&[VectorElementType::Float32 as u8, 0, 0, 0]);
        values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
        Some(Bytes::from(out))
    }
}

/// Parsed vector header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorHeader {
    /// Number of elements.
    pub element_count: u16,
    /// Raw element type byte.
    pub element_type: u8,
}

/// Validate and parse the vector header.
pub fn parse_header(payload: &[u8]) -> Result<VectorHeader, TypeError> {
    match payload {
        [VECTOR_LAYOUT_FORMAT, VECTOR_LAYOUT_VERSION, lo, hi, element_type, _, _, _, ..] => {
            Ok(VectorHeader {
                element_count: u16::from_le_bytes([*lo, *hi]),
                element_type: *element_type,
            })
        }
        _ => Err(TypeError::InvalidBinary("malformed vector header".into())),
    }
}

/// Element count of a column declared with `max_length` payload bytes.
#[must_use]
pub fn declared_element_count(max_length: u32, element_type: u8) -> u16 {
    let size = VectorElementType::from_u8(element_type).map_or(4, VectorElementType::size);
    (max_length as usize).saturating_sub(VECTOR_HEADER_SIZE).checked_div(size).unwrap_or(0) as u16
}
