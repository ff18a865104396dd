//! Date normalization for extracted date tokens.
//!
//! A raw token is tried against a fixed, ordered list of accepted formats and
//! rendered as `YYYY-MM-DD` on the first success. Tokens that match nothing
//! are returned untouched: a non-empty but unparseable date is still more
//! informative to the reader than the "not specified" sentinel.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use tracing::debug;

/// One entry of the accepted-format list.
#[derive(Debug, Clone, Copy)]
enum DateFormat {
    /// A calendar date `strftime` pattern. `full_year` marks `%Y` patterns,
    /// which must not swallow two-digit years.
    Calendar { pattern: &'static str, full_year: bool },
    /// A naive timestamp pattern; only the date part is kept.
    Timestamp(&'static str),
    /// RSS `pubDate` style, e.g. `Sat, 13 Jul 2025 09:00:00 -0400`.
    Rfc2822,
    /// Atom `published`/`updated`, e.g. `2025-07-13T09:00:00Z`.
    Rfc3339,
}

const fn calendar(pattern: &'static str, full_year: bool) -> DateFormat {
    DateFormat::Calendar { pattern, full_year }
}

/// Accepted input formats, in trial order.
const FORMATS: &[DateFormat] = &[
    calendar("%m/%d/%Y", true),
    calendar("%m-%d-%Y", true),
    calendar("%Y-%m-%d", true),
    calendar("%Y/%m/%d", true),
    calendar("%b %d, %Y", true),
    calendar("%B %d, %Y", true),
    calendar("%d %b %Y", true),
    calendar("%d %B %Y", true),
    calendar("%d %b, %Y", true),
    DateFormat::Rfc2822,
    DateFormat::Rfc3339,
    DateFormat::Timestamp("%Y-%m-%d %H:%M:%S"),
    calendar("%m/%d/%y", false),
    calendar("%m-%d-%y", false),
];

impl DateFormat {
    fn parse(self, token: &str) -> Option<NaiveDate> {
        match self {
            DateFormat::Calendar { pattern, full_year } => {
                let date = NaiveDate::parse_from_str(token, pattern).ok()?;
                // chrono's %Y happily reads "25" as year 25
                if full_year && date.year() < 1000 {
                    return None;
                }
                Some(date)
            }
            DateFormat::Timestamp(pattern) => NaiveDateTime::parse_from_str(token, pattern)
                .ok()
                .map(|dt| dt.date()),
            DateFormat::Rfc2822 => DateTime::parse_from_rfc2822(token)
                .ok()
                .map(|dt| dt.date_naive()),
            DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(token)
                .ok()
                .map(|dt| dt.date_naive()),
        }
    }
}

/// Parse a date token into a calendar date, if any accepted format matches.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }
    FORMATS.iter().find_map(|format| format.parse(token))
}

/// Normalize a raw date token to `YYYY-MM-DD`.
///
/// Returns `raw` unmodified when no accepted format parses it. Applying the
/// function to its own output yields the same output.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_date("Jul 13, 2025"), "2025-07-13");
/// assert_eq!(normalize_date("Saturday morning"), "Saturday morning");
/// ```
pub fn normalize_date(raw: &str) -> String {
    match parse_date(raw) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => {
            debug!(raw, "Date token did not match any accepted format");
            raw.to_string()
        }
    }
}
