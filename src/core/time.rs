//! Timestamp parsing for values read from source files
//!
//! Formats are written in strftime style as users know it from other
//! tooling, where `%f` means microseconds. chrono reads `%f` differently,
//! so formats are translated before use.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Translate a strftime-style format into chrono's dialect
pub fn chrono_format(format: &str) -> String {
    format.replace(".%f", "%.f").replace("%f", "%6f")
}

/// Parse `value` with `format`; values without an offset are taken as UTC
pub fn parse_with_format(value: &str, format: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    let format = chrono_format(format);

    if let Ok(ts) = DateTime::parse_from_str(value, &format) {
        return Some(ts);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, &format) {
        return Some(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    NaiveDate::parse_from_str(value, &format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

/// Parse a timestamp without a known format
pub fn parse_flexible(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts);
    }
    const FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
        "%Y-%m-%d",
    ];
    FORMATS.iter().find_map(|format| parse_with_format(value, format))
}
