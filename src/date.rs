//! Parser for the many expiration date styles WHOIS servers print.

use crate::types::{HijackError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// How a pattern is interpreted by chrono.
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// Date and time without offset, taken as UTC.
    Naive(&'static str),
    /// Date only, midnight UTC.
    Date(&'static str),
    /// Date and time with a numeric offset.
    Offset(&'static str),
    Rfc3339,
    Rfc2822,
}

/// Tried in order, first match wins.
const LAYOUTS: &[Layout] = &[
    Layout::Naive("%Y-%m-%dT%H:%M:%SZ"),
    Layout::Date("%Y-%m-%d"),
    Layout::Naive("%Y-%m-%d %H:%M:%S"),
    Layout::Date("%Y. %m. %d."),
    Layout::Date("%d-%b-%Y"),
    Layout::Naive("%d/%m/%Y %H:%M:%S"),
    Layout::Date("%d.%m.%Y"),
    Layout::Date("%d-%m-%Y"),
    Layout::Naive("%d.%m.%Y %H:%M:%S"),
    Layout::Offset("%Y-%m-%d %H:%M:%S%#z"),
    Layout::Naive("%d-%b-%Y %H:%M:%S"),
    Layout::Date("%B %d %Y"),
    Layout::Date("%d/%m/%Y"),
    Layout::Date("%m/%d/%Y"),
    Layout::Date("%Y-%b-%d"),
    Layout::Date("%Y-%b-%d."),
    Layout::Rfc3339,
    Layout::Naive("%Y-%m-%dT%H:%M:%S%.f"),
    Layout::Rfc2822,
    // ANSIC
    Layout::Naive("%a %b %d %H:%M:%S %Y"),
    // Unix date
    Layout::Naive("%a %b %d %H:%M:%S %Z %Y"),
    // Ruby date
    Layout::Offset("%a %b %d %H:%M:%S %z %Y"),
    // RFC 822 / 822Z
    Layout::Naive("%d %b %y %H:%M %Z"),
    Layout::Offset("%d %b %y %H:%M %z"),
    // RFC 850
    Layout::Naive("%A, %d-%b-%y %H:%M:%S %Z"),
    // RFC 1123
    Layout::Naive("%a, %d %b %Y %H:%M:%S %Z"),
];

/// Trailing annotations registrars append after an otherwise valid date:
/// `(UTC+8)`, `CLST`, `UTC`, `.`.
fn trailing_annotation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\s*\([^)]*\)|\s+[A-Za-z]{1,5}|\.)$").unwrap())
}

/// Parse a WHOIS date string into a UTC timestamp.
///
/// Each known layout is tried against the string as given, then against the
/// string with a trailing timezone name or punctuation removed.
pub fn parse_date(input: &str) -> Result<DateTime<Utc>> {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(HijackError::DateFormatError(input.to_string()));
    }

    if let Some(parsed) = try_layouts(&collapsed) {
        return Ok(parsed);
    }

    let stripped = trailing_annotation().replace(&collapsed, "");
    if stripped != collapsed {
        if let Some(parsed) = try_layouts(stripped.trim_end()) {
            return Ok(parsed);
        }
    }

    Err(HijackError::DateFormatError(input.to_string()))
}

fn try_layouts(s: &str) -> Option<DateTime<Utc>> {
    LAYOUTS.iter().find_map(|layout| parse_with(*layout, s))
}

fn parse_with(layout: Layout, s: &str) -> Option<DateTime<Utc>> {
    match layout {
        Layout::Naive(fmt) => NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|dt| dt.and_utc()),
        Layout::Date(fmt) => NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc()),
        Layout::Offset(fmt) => DateTime::parse_from_str(s, fmt)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Layout::Rfc3339 => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Layout::Rfc2822 => DateTime::parse_from_rfc2822(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_known_whois_dates() {
        let dates = [
            "09-Mar-2023",
            "31-Jul-2022",
            "2022-12-12T11:01:02Z",
            "2022-12-03",
            "2022. 12. 01.",
            "2022-12-12 11:40:12",
            "28/06/2022 23:59:59",
            "24.10.2022",
            "2022-06-29 14:08:21+03",
            "31.8.2025 00:00:00",
            "01-10-2025",
            "20-Apr-2023 03:28:40",
            "2022-12-08 14:00:00 CLST",
            "December  2 2022",
            "02/28/2025",
            "April 10 2023",
            "2025-Dec-11",
            "2025-Dec-11.",
            "2024-06-05 00:00:00 (UTC+8)",
            "2026-01-15T04:59:59.000Z",
            "2025-08-13T04:00:00+00:00",
            "Mon, 02 Jan 2006 15:04:05 -0700",
            "Mon Jan  2 15:04:05 2006",
            "Mon Jan 02 15:04:05 -0700 2006",
            "Mon Jan  2 15:04:05 MST 2006",
            "02 Jan 06 15:04 MST",
            "Monday, 02-Jan-06 15:04:05 MST",
            "Mon, 02 Jan 2006 15:04:05 MST",
        ];

        for date in dates {
            assert!(
                parse_date(date).is_ok(),
                "{} should not error out: {:?}",
                date,
                parse_date(date)
            );
        }
    }

    #[test]
    fn test_parse_values() {
        let parsed = parse_date("2022-12-12T11:01:02Z").unwrap();
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2022, 12, 12));
        assert_eq!((parsed.hour(), parsed.minute(), parsed.second()), (11, 1, 2));

        let parsed = parse_date("31-Jul-2022").unwrap();
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2022, 7, 31));

        let parsed = parse_date("28/06/2022 23:59:59").unwrap();
        assert_eq!((parsed.month(), parsed.day(), parsed.hour()), (6, 28, 23));
    }

    #[test]
    fn test_numeric_offset_is_applied() {
        let parsed = parse_date("2022-06-29 14:08:21+03").unwrap();
        assert_eq!(parsed.hour(), 11);
    }

    #[test]
    fn test_day_first_wins_over_month_first() {
        let parsed = parse_date("02/01/2006").unwrap();
        assert_eq!((parsed.month(), parsed.day()), (1, 2));

        // 28 is not a month, so the month-first layout is used.
        let parsed = parse_date("02/28/2025").unwrap();
        assert_eq!((parsed.month(), parsed.day()), (2, 28));
    }

    #[test]
    fn test_unparseable_dates() {
        for input in ["not-a-date", "", "   ", "2022-13-45", "tomorrow", "31/31/2031"] {
            assert!(
                matches!(parse_date(input), Err(HijackError::DateFormatError(_))),
                "{:?} should fail",
                input
            );
        }
    }
}
