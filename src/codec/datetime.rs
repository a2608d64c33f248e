//! DATETIME/EXT_DATETIME codecs.
//!
//! Legacy DATETIME is an 8-byte IEEE-754 double counting days since
//! 1899-12-30 (the VBA/OLE Automation date epoch), fractional part encoding
//! time of day. EXT_DATETIME (Access 2007+) is an 8-byte little-endian
//! integer counting 100-nanosecond ticks since 0001-01-01, matching
//! Jackcess's handling of the extended column type. Both decode to a
//! timezone-naive [`chrono::NaiveDateTime`]; interpreting it against a wall
//! clock is left to the caller via `OpenOptions::time_zone`.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, ErrorCode, Result};

const OLE_EPOCH_YEAR: i32 = 1899;
const OLE_EPOCH_MONTH: u32 = 12;
const OLE_EPOCH_DAY: u32 = 30;
const TICKS_PER_DAY: i64 = 24 * 60 * 60 * 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeValue(pub NaiveDateTime);

fn ole_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(OLE_EPOCH_YEAR, OLE_EPOCH_MONTH, OLE_EPOCH_DAY)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn decode_legacy(buf: &[u8]) -> Result<DateTimeValue> {
    if buf.len() < 8 {
        return Err(Error::with_message(ErrorCode::CorruptFormat, "DATETIME value truncated"));
    }
    let days = f64::from_le_bytes(buf[0..8].try_into().unwrap());
    let whole_days = days.trunc() as i64;
    let frac_seconds = (days.fract().abs() * 86_400.0).round() as i64;
    let dt = ole_epoch()
        .checked_add_signed(chrono::Duration::days(whole_days))
        .and_then(|d| d.checked_add_signed(chrono::Duration::seconds(frac_seconds)))
        .ok_or_else(|| Error::with_message(ErrorCode::CorruptFormat, "DATETIME value out of range"))?;
    Ok(DateTimeValue(dt))
}

pub fn encode_legacy(value: &DateTimeValue) -> Vec<u8> {
    let delta = value.0.signed_duration_since(ole_epoch());
    let days = delta.num_seconds() as f64 / 86_400.0;
    days.to_le_bytes().to_vec()
}

pub fn decode_extended(buf: &[u8]) -> Result<DateTimeValue> {
    if buf.len() < 8 {
        return Err(Error::with_message(ErrorCode::CorruptFormat, "EXT_DATETIME value truncated"));
    }
    let ticks = i64::from_le_bytes(buf[0..8].try_into().unwrap());
    let days = ticks / TICKS_PER_DAY;
    let remainder_ticks = ticks % TICKS_PER_DAY;
    let nanos = remainder_ticks * 100;
    let base = NaiveDate::from_ymd_opt(1, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let dt = base
        .checked_add_signed(chrono::Duration::days(days))
        .and_then(|d| d.checked_add_signed(chrono::Duration::nanoseconds(nanos)))
        .ok_or_else(|| Error::with_message(ErrorCode::CorruptFormat, "EXT_DATETIME value out of range"))?;
    Ok(DateTimeValue(dt))
}

pub fn encode_extended(value: &DateTimeValue) -> Vec<u8> {
    let base = NaiveDate::from_ymd_opt(1, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let delta = value.0.signed_duration_since(base);
    let ticks = delta.num_seconds() * 10_000_000 + (delta.num_nanoseconds().unwrap_or(0) % 1_000_000_000) / 100;
    ticks.to_le_bytes().to_vec()
}
