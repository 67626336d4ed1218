//! Timestamp normalization.
//!
//! Audit timestamps arrive in several textual shapes (offset-qualified
//! instants, naive date-times with or without fractional seconds, bare
//! dates). [`normalize_date`] reduces any of them to a calendar date so that
//! two timestamps can be compared at day granularity.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::trace;

/// Marker returned when a value cannot be read as a timestamp.
pub const UNPARSEABLE_DATE: NaiveDate = NaiveDate::MIN;

/// ISO-8601 shapes with a UTC offset (`Z` is rewritten to `+00:00` first).
const ISO_OFFSET_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%z",
    "%Y%m%dT%H%M%S%z",
];

/// ISO-8601 shapes without an offset.
const ISO_NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S",
];

const ISO_BASIC_DATE_FORMAT: &str = "%Y%m%d";

const DATETIME_MICROS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Normalizes an arbitrary JSON value to a calendar date.
///
/// Non-string values and strings that match none of the accepted formats
/// yield [`UNPARSEABLE_DATE`]. This function never fails.
pub fn normalize_date(value: &Value) -> NaiveDate {
    match value.as_str() {
        Some(text) => normalize_date_str(text),
        None => {
            trace!(value = %value, "Timestamp is not a string");
            UNPARSEABLE_DATE
        }
    }
}

/// Normalizes an optional JSON value, treating absence like a non-string.
pub fn normalize_optional_date(value: Option<&Value>) -> NaiveDate {
    value.map(normalize_date).unwrap_or(UNPARSEABLE_DATE)
}

/// Normalizes a textual timestamp to a calendar date.
///
/// Formats are tried in order and the first match wins:
///
/// 1. ISO-8601: extended or basic form, `T` or space separator, optional
///    seconds and fraction, optional offset or `Z`
///    (`2024-01-05T10:00:00.123-05:00`, `2024-01-05 10:00`, `20240105`)
/// 2. `YYYY-MM-DDTHH:MM:SS.ffffff`
/// 3. `YYYY-MM-DDTHH:MM:SS`
/// 4. `YYYY-MM-DD`
///
/// Offset-qualified instants keep the date as written, not converted to UTC.
pub fn normalize_date_str(text: &str) -> NaiveDate {
    let text = text.trim();

    trace!(input = text, "Trying ISO-8601 parse");
    if let Some(date) = parse_iso8601(text) {
        return date;
    }

    for format in [DATETIME_MICROS_FORMAT, DATETIME_FORMAT] {
        trace!(input = text, format, "Trying date-time format");
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return parsed.date();
        }
    }

    trace!(input = text, format = DATE_FORMAT, "Trying date format");
    if let Ok(parsed) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return parsed;
    }

    trace!(input = text, "No timestamp format matched");
    UNPARSEABLE_DATE
}

fn parse_iso8601(text: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = text.parse::<DateTime<FixedOffset>>() {
        return Some(parsed.date_naive());
    }

    let with_offset = match text.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{}+00:00", rest),
        None => text.to_string(),
    };
    if let Some(parsed) = ISO_OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(&with_offset, format).ok())
    {
        return Some(parsed.date_naive());
    }

    if let Some(parsed) = ISO_NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Some(parsed.date());
    }

    NaiveDate::parse_from_str(text, ISO_BASIC_DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jan_5() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    #[test]
    fn test_all_accepted_formats() {
        for input in [
            "2024-01-05T10:00:00.123456",
            "2024-01-05T10:00:00",
            "2024-01-05",
            "2024-01-05T10:00:00.123456-05:00",
            "2024-01-05T23:59:59Z",
            "2024-01-05T10:00",
            "2024-01-05T10:00Z",
            "2024-01-05 10:00:00",
            "2024-01-05 10:00:00.5+01:00",
            "2024-01-05T10:00:00+0500",
            "20240105",
            "20240105T100000",
        ] {
            assert_eq!(normalize_date(&json!(input)), jan_5(), "input {}", input);
        }
    }

    #[test]
    fn test_offset_keeps_local_date() {
        // 23:30 at -05:00 is already the next day in UTC
        let date = normalize_date_str("2024-01-05T23:30:00-05:00");
        assert_eq!(date, jan_5());
    }

    #[test]
    fn test_millisecond_fraction() {
        assert_eq!(normalize_date_str("2024-01-05T10:00:00.123"), jan_5());
    }

    #[test]
    fn test_non_string_inputs() {
        for value in [json!(null), json!(42), json!(true), json!([]), json!({})] {
            assert_eq!(normalize_date(&value), UNPARSEABLE_DATE);
        }
        assert_eq!(normalize_optional_date(None), UNPARSEABLE_DATE);
    }

    #[test]
    fn test_malformed_strings() {
        for input in ["", "   ", "yesterday", "2024-13-45", "05/01/2024", "2024-01-05T25:00:00"] {
            assert_eq!(normalize_date_str(input), UNPARSEABLE_DATE, "input {:?}", input);
        }
    }
}
