//! Date coercion for spreadsheet cells.
//!
//! Cells arrive as real dates, spreadsheet serials (number or digit string) or
//! day/month/year text. Anything else is treated as unset.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::types::CellValue;

const MS_PER_DAY: f64 = 86_400_000.0;
const MIN_TEXT_YEAR: i32 = 100;

fn serial_epoch() -> NaiveDateTime {
    // 1899-12-30, the spreadsheet serial epoch (serial 1 = 1899-12-31).
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert a day serial to a timestamp. Fractional days carry the time of day.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let millis = (serial * MS_PER_DAY).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    serial_epoch().checked_add_signed(Duration::milliseconds(millis as i64))
}

/// Coerce a cell to a calendar date; `None` means "unset".
///
/// Zero and negative serials are treated as unset: blank numeric cells come
/// through some exports as `0`.
pub fn coerce_date(raw: &CellValue) -> Option<NaiveDate> {
    match raw {
        CellValue::Date(dt) => Some(dt.date()),
        CellValue::Number(n) => coerce_serial(*n),
        CellValue::Text(s) => coerce_text(s),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

fn coerce_serial(serial: f64) -> Option<NaiveDate> {
    if serial <= 0.0 {
        return None;
    }
    serial_to_datetime(serial).map(|dt| dt.date())
}

fn coerce_text(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let serial: u32 = trimmed.parse().ok()?;
        return coerce_serial(serial as f64);
    }

    let parts: Vec<&str> = trimmed.split(['/', '-']).map(str::trim).collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let year: i32 = parts[2].parse().ok()?;
    // Two-digit years are ambiguous; treat them as unset.
    if day == 0 || month == 0 || year < MIN_TEXT_YEAR {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}
