//! Fixed coercion rules from raw text cells to typed values
//!
//! These rules are the only place text is interpreted as numbers, dates or
//! booleans. Transforms never re-parse text.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

/// Cell texts treated as null, in addition to the empty string
pub const NULL_MARKERS: &[&str] = &["NA", "N/A", "n/a", "null", "NULL", "NaN", "nan", "-"];

/// Returns true if the trimmed cell text denotes a missing value
pub fn is_null_marker(text: &str) -> bool {
    text.is_empty() || NULL_MARKERS.contains(&text)
}

/// `1,234` / `-12,345.67`: comma-grouped thousands with an optional fraction
fn is_grouped_number(text: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

/// Parse a numeric literal: plain/scientific (`12.5`, `1e3`) or
/// thousands-grouped (`1,234.5`). Non-finite results are rejected.
pub fn coerce_numeric(text: &str) -> Option<f64> {
    let parsed = match text.parse::<f64>() {
        Ok(n) => Some(n),
        Err(_) if is_grouped_number(text) => text.replace(',', "").parse::<f64>().ok(),
        Err(_) => None,
    };

    // `f64::from_str` accepts "inf" and "NaN"; neither is a quantity
    parsed.filter(|n| n.is_finite())
}

/// Parse an ISO-8601 date (`2024-03-01`) or date-time; the time part is dropped.
pub fn coerce_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date())
}

pub fn coerce_boolean(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_literals() {
        assert_eq!(coerce_numeric("10"), Some(10.0));
        assert_eq!(coerce_numeric("-2.5"), Some(-2.5));
        assert_eq!(coerce_numeric("1e3"), Some(1000.0));
        assert_eq!(coerce_numeric("1,234.5"), Some(1234.5));
        assert_eq!(coerce_numeric("12,345,678"), Some(12_345_678.0));
    }

    #[test]
    fn numeric_rejections() {
        assert_eq!(coerce_numeric("abc"), None);
        assert_eq!(coerce_numeric("12,34"), None);
        assert_eq!(coerce_numeric("inf"), None);
        assert_eq!(coerce_numeric("NaN"), None);
        assert_eq!(coerce_numeric("10 Kgs"), None);
    }

    #[test]
    fn iso_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(coerce_date("2024-03-01"), Some(d));
        assert_eq!(coerce_date("2024-03-01T10:30:00Z"), Some(d));
        assert_eq!(coerce_date("2024-03-01T10:30:00+05:30"), Some(d));
        assert_eq!(coerce_date("2024-03-01T10:30:00"), Some(d));
        assert_eq!(coerce_date("01/03/2024"), None);
        assert_eq!(coerce_date("2024-02-30"), None);
    }

    #[test]
    fn booleans() {
        assert_eq!(coerce_boolean("Yes"), Some(true));
        assert_eq!(coerce_boolean("0"), Some(false));
        assert_eq!(coerce_boolean("maybe"), None);
    }

    #[test]
    fn null_markers() {
        assert!(is_null_marker(""));
        assert!(is_null_marker("N/A"));
        assert!(!is_null_marker("0"));
    }
}
