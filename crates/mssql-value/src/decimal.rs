//! Full-precision `DECIMAL`/`NUMERIC` values.
//!
//! SQL Server decimals carry up to 38 digits in a 128-bit magnitude, while
//! [`rust_decimal::Decimal`] holds 96 bits and at most 28 fractional digits.
//! [`SqlDecimal`] keeps the wire form unchanged; [`SqlDecimal::to_decimal`]
//! narrows it, dropping trailing fractional zeros when that is enough to
//! make the value fit.

use std::fmt;

use rust_decimal::Decimal;

use crate::error::TypeError;

/// Largest scale a [`Decimal`] can carry.
const MAX_DECIMAL_SCALE: u8 = 28;

/// Most digits a [`Decimal`] can hold.
const MAX_DECIMAL_PRECISION: u32 = 29;

/// A decimal exactly as it came off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlDecimal {
    /// Declared precision.
    pub precision: u8,
    /// Declared scale.
    pub scale: u8,
    /// Sign; `true` for zero and positive values.
    pub positive: bool,
    /// Magnitude as four little-endian 32-bit words.
    pub data: [u32; 4],
}

impl SqlDecimal {
    /// Build from a 128-bit magnitude.
    #[must_use]
    pub fn new(precision: u8, scale: u8, positive: bool, magnitude: u128) -> Self {
        let data = [
            magnitude as u32,
            (magnitude >> 32) as u32,
            (magnitude >> 64) as u32,
            (magnitude >> 96) as u32,
        ];
        Self {
            precision,
            scale,
            positive,
            data,
        }
    }

    /// The unsigned magnitude.
    #[must_use]
    pub fn magnitude(&self) -> u128 {
        self.data
            .iter()
            .rev()
            .fold(0u128, |acc, &word| (acc << 32) | u128::from(word))
    }

    /// Convert to a [`Decimal`].
    ///
    /// Values that need the fourth magnitude word or a scale above 28 are
    /// trimmed of trailing fractional zeros first; if they still do not fit,
    /// the result is [`TypeError::Overflow`].
    pub fn to_decimal(&self) -> Result<Decimal, TypeError> {
        if self.data[3] == 0 && self.scale <= MAX_DECIMAL_SCALE {
            return build(self.magnitude(), u32::from(self.scale), self.positive);
        }
        if self.scale == 0 {
            return Err(TypeError::Overflow);
        }
        self.trimmed()
    }

    fn trimmed(&self) -> Result<Decimal, TypeError> {
        let magnitude = self.magnitude();
        let scale = i32::from(self.scale);
        let (zero_count, precision) = trailing_zeros_and_precision(magnitude, self.scale);
        let min_scale = scale - zero_count as i32;

        if zero_count == 0
            || min_scale > i32::from(MAX_DECIMAL_SCALE)
            || precision > MAX_DECIMAL_PRECISION
        {
            return Err(TypeError::Overflow);
        }

        let integral = precision as i32 - min_scale;
        let new_precision = if integral != 1 && precision != MAX_DECIMAL_PRECISION {
            28
        } else {
            29
        };
        let new_scale = new_precision - integral;
        if new_scale < 0 {
            return Err(TypeError::Overflow);
        }

        let rescaled = if new_scale <= scale {
            magnitude / pow10((scale - new_scale) as u32)?
        } else {
            magnitude
                .checked_mul(pow10((new_scale - scale) as u32)?)
                .ok_or(TypeError::Overflow)?
        };
        build(rescaled, new_scale as u32, self.positive)
    }
}

/// Count trailing zero digits and the precision left once they are removed.
///
/// A zero magnitude counts every fractional digit as a trailing zero. When
/// the remaining digits do not reach the decimal point, precision is padded
/// up to one leading integral digit.
fn trailing_zeros_and_precision(magnitude: u128, scale: u8) -> (u32, u32) {
    let mut rest = magnitude;
    let mut zeros = 0u32;
    let mut precision = 0u32;
    let mut last_digit = 0u128;

    while rest != 0 {
        last_digit = rest % 10;
        rest /= 10;
        if last_digit == 0 && precision == 0 {
            zeros += 1;
        } else {
            precision += 1;
        }
    }

    if last_digit == 0 {
        zeros = u32::from(scale);
    }
    if zeros + precision <= u32::from(scale) {
        precision = u32::from(scale) - zeros + 1;
    }
    (zeros, precision)
}

fn pow10(exp: u32) -> Result<u128, TypeError> {
    10u128.checked_pow(exp).ok_or(TypeError::Overflow)
}

fn build(magnitude: u128, scale: u32, positive: bool) -> Result<Decimal, TypeError> {
    let signed = i128::try_from(magnitude).map_err(|_| TypeError::Overflow)?;
    let signed = if positive { signed } else { -signed };
    Decimal::try_from_i128_with_scale(signed, scale).map_err(|_| TypeError::Overflow)
}

/// Convert a money value in ten-thousandths to a [`Decimal`].
#[must_use]
pub fn money_to_decimal(value: i64) -> Decimal {
    Decimal::new(value, 4)
}

impl fmt::Display for SqlDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.magnitude().to_string();
        let scale = self.scale as usize;
        let digits = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let negative = !self.positive && self.magnitude() != 0;
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);

        if negative {
            f.write_str("-")?;
        }
        f.write_str(int_part)?;
        if scale > 0 {
            write!(f, ".{frac_part}")?;
        }
        Ok(())
    }
}
