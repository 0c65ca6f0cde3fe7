//! Timestamp formatting utilities
//!
//! Formatters and file segment names share these formats.

use super::error::{LoggerError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Timestamp format options for rendered output
///
/// # Examples
///
/// ```
/// use log_hood::core::TimestampFormat;
/// use chrono::Utc;
///
/// let format = TimestampFormat::Iso8601;
/// assert!(format.format(&Utc::now()).ends_with('Z'));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// ISO 8601 with milliseconds: `2025-01-08T10:30:45.123Z`
    #[default]
    Iso8601,

    /// ISO 8601 with microseconds: `2025-01-08T10:30:45.123456Z`
    Iso8601Micros,

    /// RFC 3339 with offset: `2025-01-08T10:30:45+00:00`
    Rfc3339,

    /// Wall-clock time only: `10:30:45.123`
    TimeOnly,

    /// Unix timestamp in seconds
    Unix,

    /// Unix timestamp in milliseconds
    UnixMillis,

    /// Custom strftime format; an invalid pattern renders as `Iso8601`
    Custom(String),
}

fn parse_pattern(pattern: &str) -> Option<Vec<Item<'_>>> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        None
    } else {
        Some(items)
    }
}

impl TimestampFormat {
    /// Custom strftime format, rejecting patterns chrono cannot render
    pub fn custom(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if parse_pattern(&pattern).is_none() {
            return Err(LoggerError::config(
                "TimestampFormat",
                format!("invalid strftime pattern '{}'", pattern),
            ));
        }
        Ok(TimestampFormat::Custom(pattern))
    }

    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601 => datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimestampFormat::Iso8601Micros => datetime.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            TimestampFormat::Rfc3339 => datetime.to_rfc3339(),
            TimestampFormat::TimeOnly => datetime.format("%H:%M:%S%.3f").to_string(),
            TimestampFormat::Unix => datetime.timestamp().to_string(),
            TimestampFormat::UnixMillis => datetime.timestamp_millis().to_string(),
            TimestampFormat::Custom(pattern) => format_custom(datetime, pattern)
                .unwrap_or_else(|| TimestampFormat::Iso8601.format(datetime)),
        }
    }

    /// Check if this is a Unix-based numeric format
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, TimestampFormat::Unix | TimestampFormat::UnixMillis)
    }
}

fn format_custom(datetime: &DateTime<Utc>, pattern: &str) -> Option<String> {
    let items = parse_pattern(pattern)?;
    let mut out = String::new();
    write!(out, "{}", datetime.format_with_items(items.iter())).ok()?;
    Some(out)
}

/// ISO 8601 stamp safe for file names (colons replaced by dashes)
pub(crate) fn file_safe_stamp(datetime: &DateTime<Utc>) -> String {
    TimestampFormat::Iso8601Micros
        .format(datetime)
        .replace(':', "-")
}
