//! Normalizes the many ways feeds express publication times.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, trace};

type Parser = fn(&str) -> Option<DateTime<Utc>>;

/// Text formats tried in order; the first successful parse wins.
const TEXT_FORMATS: &[(&str, Parser)] = &[
    ("rfc822 numeric offset", rfc822_numeric),
    ("rfc822 GMT", rfc822_gmt),
    ("rfc2822", rfc2822),
    ("rfc3339", rfc3339),
    ("iso8601 offset", iso_offset),
    ("iso8601 zulu", iso_zulu),
    ("iso8601 local", iso_local),
    ("sql datetime", sql_datetime),
    ("date only", date_only),
];

fn rfc822_numeric(s: &str) -> Option<DateTime<Utc>> {
    with_offset(s, "%a, %d %b %Y %H:%M:%S %z")
}

fn rfc822_gmt(s: &str) -> Option<DateTime<Utc>> {
    naive(s, "%a, %d %b %Y %H:%M:%S GMT")
}

/// Also covers obsolete named zones such as EST or UT.
fn rfc2822(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn iso_offset(s: &str) -> Option<DateTime<Utc>> {
    with_offset(s, "%Y-%m-%dT%H:%M:%S%z")
}

fn iso_zulu(s: &str) -> Option<DateTime<Utc>> {
    naive(s, "%Y-%m-%dT%H:%M:%SZ")
}

fn iso_local(s: &str) -> Option<DateTime<Utc>> {
    naive(s, "%Y-%m-%dT%H:%M:%S%.f")
}

fn sql_datetime(s: &str) -> Option<DateTime<Utc>> {
    naive(s, "%Y-%m-%d %H:%M:%S")
}

fn date_only(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn with_offset(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, fmt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Zone-less timestamps are taken to be UTC.
fn naive(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, fmt)
        .ok()
        .map(|dt| dt.and_utc())
}

/// Resolve a publication time from whatever the feed gave us.
///
/// A structured timestamp (already decoded by the feed parser) always wins.
/// Otherwise the raw text is tried against each known format. Returns `None`
/// when nothing parses; callers must not substitute "now".
pub fn normalize(structured: Option<DateTime<Utc>>, text: Option<&str>) -> Option<DateTime<Utc>> {
    structured.or_else(|| text.and_then(parse_text))
}

pub fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = TEXT_FORMATS
        .iter()
        .find_map(|(name, parse)| parse(raw).map(|dt| (*name, dt)));
    match parsed {
        Some((format, dt)) => {
            trace!(format, raw, "parsed text date");
            Some(dt)
        }
        None => {
            debug!(raw, "unrecognized date format");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 9, 14, 30, 15).unwrap()
    }

    #[test]
    fn test_structured_wins_over_text() {
        let structured = instant();
        let result = normalize(Some(structured), Some("2001-01-01"));
        assert_eq!(result, Some(structured));
    }

    #[test]
    fn test_falls_back_to_text() {
        let result = normalize(None, Some("2024-12-09"));
        assert_eq!(result, Some(Utc.with_ymd_and_hms(2024, 12, 9, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_absent_input_is_none() {
        assert_eq!(normalize(None, None), None);
        assert_eq!(normalize(None, Some("")), None);
        assert_eq!(parse_text("   "), None);
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_text("yesterday afternoon"), None);
        assert_eq!(parse_text("2024-13-45"), None);
        assert_eq!(parse_text("Mon, 99 Foo 2024"), None);
    }

    #[test]
    fn test_rfc822_numeric_offset_round_trip() {
        let t = instant();
        let s = t.format("%a, %d %b %Y %H:%M:%S %z").to_string();
        assert_eq!(parse_text(&s), Some(t));
    }

    #[test]
    fn test_rfc822_offset_is_converted_to_utc() {
        let parsed = parse_text("Mon, 09 Dec 2024 16:30:15 +0200").unwrap();
        assert_eq!(parsed, instant());
    }

    #[test]
    fn test_rfc822_gmt_round_trip() {
        let t = instant();
        let s = t.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        assert_eq!(parse_text(&s), Some(t));
    }

    #[test]
    fn test_rfc822_named_zone() {
        let parsed = parse_text("Mon, 09 Dec 2024 09:30:15 EST").unwrap();
        assert_eq!(parsed, instant());
    }

    #[test]
    fn test_rfc3339_round_trip() {
        let t = instant();
        assert_eq!(parse_text(&t.to_rfc3339()), Some(t));
        assert_eq!(parse_text("2024-12-09T14:30:15Z"), Some(t));
    }

    #[test]
    fn test_iso_fractional_seconds() {
        let t = instant().with_nanosecond(250_000_000).unwrap();
        assert_eq!(parse_text("2024-12-09T14:30:15.25Z"), Some(t));
        assert_eq!(parse_text("2024-12-09T14:30:15.25"), Some(t));
    }

    #[test]
    fn test_iso_compact_offset_round_trip() {
        let t = instant();
        let s = t.format("%Y-%m-%dT%H:%M:%S%z").to_string();
        assert_eq!(parse_text(&s), Some(t));
    }

    #[test]
    fn test_iso_without_zone_round_trip() {
        let t = instant();
        let s = t.format("%Y-%m-%dT%H:%M:%S").to_string();
        assert_eq!(parse_text(&s), Some(t));
    }

    #[test]
    fn test_sql_datetime_round_trip() {
        let t = instant();
        let s = t.format("%Y-%m-%d %H:%M:%S").to_string();
        assert_eq!(parse_text(&s), Some(t));
    }

    #[test]
    fn test_date_only_round_trip() {
        let t = Utc.with_ymd_and_hms(2023, 2, 28, 0, 0, 0).unwrap();
        let s = t.format("%Y-%m-%d").to_string();
        assert_eq!(parse_text(&s), Some(t));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(parse_text("  2024-12-09T14:30:15Z\n"), Some(instant()));
    }
}
