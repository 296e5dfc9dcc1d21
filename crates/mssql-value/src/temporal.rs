//! Date and time storage forms.
//!
//! Cells keep temporal values in their wire units and only build `chrono`
//! values when read:
//!
//! - `DATETIME`: days since 1900-01-01 and 1/300 s ticks since midnight
//! - `DATE`: days since 0001-01-01
//! - `TIME`: 100 ns ticks since midnight plus the declared scale
//! - `DATETIME2`: date + time
//! - `DATETIMEOFFSET`: UTC date + time and the offset in minutes

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::error::TypeError;

const NANOS_PER_TICK: u64 = 100;
const TICKS_PER_SECOND: u64 = 10_000_000;
const SECONDS_PER_DAY: u64 = 86_400;

/// A time of day in 100 ns ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeValue {
    /// Ticks of 100 ns since midnight.
    pub ticks: u64,
    /// Declared fractional-second scale (0-7).
    pub scale: u8,
}

impl TimeValue {
    /// Decode the 3 to 5 little-endian bytes of a scaled time.
    pub fn from_wire(bytes: &[u8], scale: u8) -> Result<Self, TypeError> {
        if !(3..=5).contains(&bytes.len()) || scale > 7 {
            return Err(TypeError::InvalidDateTime(format!(
                "invalid time length {} for scale {scale}",
                bytes.len()
            )));
        }
        let mut raw = [0u8; 8];
        raw[..bytes.len()].copy_from_slice(bytes);
        let units = u64::from_le_bytes(raw);
        let ticks = units * 10u64.pow(u32::from(7 - scale));
        if ticks >= TICKS_PER_SECOND * SECONDS_PER_DAY {
            return Err(TypeError::InvalidDateTime(format!("time ticks {ticks} past midnight")));
        }
        Ok(Self { ticks, scale })
    }

    /// Build the `chrono` time.
    pub fn to_naive(self) -> Result<NaiveTime, TypeError> {
        let secs = (self.ticks / TICKS_PER_SECOND) as u32;
        let nanos = ((self.ticks % TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
            .ok_or_else(|| TypeError::InvalidDateTime(format!("invalid time ticks {}", self.ticks)))
    }
}

/// Bytes used by a scaled time on the wire.
#[must_use]
pub const fn time_bytes_for_scale(scale: u8) -> usize {
    match scale {
        0..=2 => 3,
        3..=4 => 4,
        _ => 5,
    }
}

/// Decode a 3-byte little-endian day count.
pub fn days_from_wire(bytes: &[u8]) -> Result<i32, TypeError> {
    match bytes {
        [a, b, c] => Ok(i32::from(*a) | (i32::from(*b) << 8) | (i32::from(*c) << 16)),
        _ => Err(TypeError::InvalidDateTime(format!(
            "invalid date length {}",
            bytes.len()
        ))),
    }
}

/// Date for a day count since 0001-01-01.
pub fn date_from_days(days: i32) -> Result<NaiveDate, TypeError> {
    NaiveDate::from_num_days_from_ce_opt(days + 1)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day {days} out of range")))
}

fn legacy_epoch() -> Result<NaiveDate, TypeError> {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .ok_or_else(|| TypeError::InvalidDateTime("invalid 1900 epoch".into()))
}

/// Build a legacy `DATETIME` from its day and 1/300 s parts.
///
/// The tick part is rounded to the nearest millisecond.
pub fn legacy_datetime(day: i32, time: u32) -> Result<NaiveDateTime, TypeError> {
    let epoch = legacy_epoch()?;
    let date = if day >= 0 {
        epoch.checked_add_days(Days::new(day as u64))
    } else {
        epoch.checked_sub_days(Days::new(u64::from(day.unsigned_abs())))
    }
    .ok_or_else(|| TypeError::InvalidDateTime(format!("day {day} out of range")))?;

    let millis = (u64::from(time) * 10 + 1) / 3;
    let secs = (millis / 1000) as u32;
    let nanos = ((millis % 1000) * 1_000_000) as u32;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("time part {time} out of range")))?;
    Ok(date.and_time(time))
}

/// Build a `SMALLDATETIME` given as days since 1900 and minutes since midnight.
///
/// Returns the equivalent `DATETIME` parts.
#[must_use]
pub fn small_datetime_parts(days: u16, minutes: u16) -> (i32, u32) {
    (i32::from(days), u32::from(minutes) * 60 * 300)
}

/// Build a `DATETIME2`.
pub fn datetime2(days: i32, time: TimeValue) -> Result<NaiveDateTime, TypeError> {
    Ok(date_from_days(days)?.and_time(time.to_naive()?))
}

/// Build a `DATETIMEOFFSET` from its UTC parts.
pub fn datetime_offset(
    days: i32,
    time: TimeValue,
    offset_minutes: i16,
) -> Result<DateTime<FixedOffset>, TypeError> {
    let utc = datetime2(days, time)?;
    let offset = FixedOffset::east_opt(i32::from(offset_minutes) * 60)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("invalid offset {offset_minutes}")))?;
    Ok(offset.from_utc_datetime(&utc))
}
