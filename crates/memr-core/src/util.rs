//! Shared utility functions used across multiple modules.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current time truncated to millisecond precision.
///
/// Stored timestamps only keep milliseconds, so values produced here survive a
/// round trip through the store unchanged.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Drop sub-millisecond precision so a value compares equal after storage.
pub fn truncate_millis(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(value)
}

/// The zero watermark.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Format a timestamp the way the store persists it.
///
/// Fixed-width UTC with a `Z` suffix, so text comparison in SQL matches
/// chronological order.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp written by [`format_timestamp`] or any RFC 3339 source.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| Error::Timestamp(format!("{value}: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let earlier = parse_timestamp("2024-03-01T09:00:00.5Z").unwrap();
        let later = parse_timestamp("2024-03-01T10:00:00+01:00").unwrap();
        let much_later = parse_timestamp("2024-03-01T09:00:01Z").unwrap();

        let mut formatted = vec![
            format_timestamp(&much_later),
            format_timestamp(&earlier),
            format_timestamp(&later),
        ];
        formatted.sort();
        assert_eq!(
            formatted,
            vec![
                "2024-03-01T09:00:00.000Z",
                "2024-03-01T09:00:00.500Z",
                "2024-03-01T09:00:01.000Z",
            ]
        );
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn now_millis_round_trips_through_storage_format() {
        let now = now_millis();
        assert_eq!(parse_timestamp(&format_timestamp(&now)).unwrap(), now);
    }
}
