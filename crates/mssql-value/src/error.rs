//! Value access error types.

use thiserror::Error;

/// Errors raised while decoding a column value or reading it from a cell.
#[derive(Debug, Error)]
pub enum TypeError {
    /// A typed accessor was called on a null value.
    #[error("data is null")]
    NullValue,

    /// The stored value cannot be read as the requested type.
    #[error("unable to cast value stored as {stored} to {requested}")]
    InvalidCast {
        /// Name of the stored kind.
        stored: &'static str,
        /// Name of the requested type.
        requested: &'static str,
    },

    /// A decimal or numeric value does not fit the target representation.
    #[error("conversion overflows")]
    Overflow,

    /// The value uses a type this reader cannot represent.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Invalid encoding in string data.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// Invalid binary data.
    #[error("invalid binary data: {0}")]
    InvalidBinary(String),

    /// Invalid date/time value.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// Value bytes are shorter than the type requires.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
}

impl TypeError {
    pub(crate) fn cast(stored: &'static str, requested: &'static str) -> Self {
        Self::InvalidCast { stored, requested }
    }

    pub(crate) fn need(needed: usize, available: usize) -> Result<(), Self> {
        if available < needed {
            return Err(Self::BufferTooSmall { needed, available });
        }
        Ok(())
    }
}
