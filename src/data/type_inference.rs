//! Shared type inference logic for data loaders
//!
//! Loaders read every cell as text first and then cast whole columns at once.
//! A column is only converted when a clear majority of its non-empty cells
//! parse as the target type; the stragglers become nulls.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

/// Static compiled regex patterns for date detection
static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // YYYY-MM-DD
        Regex::new(r"^\d{4}-(0?[1-9]|1[0-2])-(0?[1-9]|[12]\d|3[01])$").unwrap(),
        // MM/DD/YYYY
        Regex::new(r"^(0?[1-9]|1[0-2])/(0?[1-9]|[12]\d|3[01])/\d{4}$").unwrap(),
        // DD-MM-YYYY
        Regex::new(r"^(0?[1-9]|[12]\d|3[01])-(0?[1-9]|1[0-2])-\d{4}$").unwrap(),
        // YYYY/MM/DD
        Regex::new(r"^\d{4}/(0?[1-9]|1[0-2])/(0?[1-9]|[12]\d|3[01])$").unwrap(),
        // YYYY-MM-DD HH:MM:SS or YYYY-MM-DDTHH:MM:SS, optional fraction and zone
        Regex::new(
            r"^\d{4}-(0?[1-9]|1[0-2])-(0?[1-9]|[12]\d|3[01])[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$",
        )
        .unwrap(),
        // MM/DD/YYYY HH:MM[:SS]
        Regex::new(r"^(0?[1-9]|1[0-2])/(0?[1-9]|[12]\d|3[01])/\d{4} \d{1,2}:\d{2}(:\d{2})?$")
            .unwrap(),
    ]
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%Y/%m/%d"];

/// Detected data type for a value or column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferredType {
    Boolean,
    Integer,
    Float,
    DateTime,
    String,
    Null,
}

/// Type inference utilities
pub struct TypeInference;

impl TypeInference {
    /// Infer the type of a single string value
    ///
    /// Order of checks is important: booleans and numbers are cheap to test,
    /// datetimes go through regexes and chrono.
    pub fn infer_from_string(value: &str) -> InferredType {
        let value = value.trim();
        if value.is_empty() {
            return InferredType::Null;
        }

        if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
            return InferredType::Boolean;
        }

        if value.parse::<i64>().is_ok() {
            return InferredType::Integer;
        }

        if Self::parse_number(value).is_some() {
            return InferredType::Float;
        }

        if Self::looks_like_datetime(value) {
            return InferredType::DateTime;
        }

        InferredType::String
    }

    /// Check if a string looks like a datetime value
    ///
    /// Uses strict regex patterns to avoid false positives with ID strings
    /// like "STU-123456" or "APP-2024-001"
    pub fn looks_like_datetime(value: &str) -> bool {
        if value.len() < 8 || value.len() > 35 {
            return false;
        }

        DATE_PATTERNS.iter().any(|pattern| pattern.is_match(value))
    }

    /// Parse a finite number, tolerating surrounding whitespace
    pub fn parse_number(value: &str) -> Option<f64> {
        let parsed = value.trim().parse::<f64>().ok()?;
        parsed.is_finite().then_some(parsed)
    }

    /// Parse a date or datetime string to a calendar date, dropping any time part
    pub fn parse_date(value: &str) -> Option<NaiveDate> {
        Self::parse_datetime(value).map(|dt| dt.date())
    }

    /// Parse the supported date and datetime layouts
    pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        if !Self::looks_like_datetime(value) {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.naive_local());
        }

        for format in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
                return Some(dt);
            }
        }

        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return Some(date.and_time(NaiveTime::MIN));
            }
        }

        None
    }

    /// Render a parsed datetime the way the table stores it
    ///
    /// Midnight values print as a bare date so date-only columns stay compact.
    pub fn format_datetime(dt: &NaiveDateTime) -> String {
        if dt.time() == NaiveTime::MIN {
            dt.format("%Y-%m-%d").to_string()
        } else {
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
    }

    /// Merge two types when a column has mixed types
    pub fn merge_types(type1: InferredType, type2: InferredType) -> InferredType {
        use InferredType::*;

        match (type1, type2) {
            (t1, t2) if t1 == t2 => t1,
            (Null, t) | (t, Null) => t,
            (Integer, Float) | (Float, Integer) => Float,
            _ => String,
        }
    }

    /// Decide the type of a whole column from its raw text cells
    ///
    /// Dates are only attempted when at least `threshold` of the cells carry a
    /// `/` or `-` separator, then at least `threshold` must actually parse.
    /// Numbers follow the same ratio rule. Columns that are all booleans stay
    /// boolean, everything else stays text.
    pub fn infer_column<'a, I>(values: I, threshold: f64) -> InferredType
    where
        I: IntoIterator<Item = &'a str>,
    {
        let cells: Vec<&str> = values
            .into_iter()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();

        if cells.is_empty() {
            return InferredType::Null;
        }

        let total = cells.len() as f64;
        let ratio = |count: usize| count as f64 / total;

        let with_separator = cells
            .iter()
            .filter(|v| v.contains('/') || v.contains('-'))
            .count();
        if ratio(with_separator) >= threshold {
            let parsed = cells
                .iter()
                .filter(|v| Self::parse_datetime(v).is_some())
                .count();
            if parsed > 0 && ratio(parsed) >= threshold {
                return InferredType::DateTime;
            }
        }

        let numeric: Vec<&str> = cells
            .iter()
            .copied()
            .filter(|v| Self::parse_number(v).is_some())
            .collect();
        if !numeric.is_empty() && ratio(numeric.len()) >= threshold {
            if numeric.iter().all(|v| v.parse::<i64>().is_ok()) {
                return InferredType::Integer;
            }
            return InferredType::Float;
        }

        if cells
            .iter()
            .all(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"))
        {
            return InferredType::Boolean;
        }

        InferredType::String
    }
}
