//! Timestamp and date parsing for the wire format.
//!
//! Every non-all-day timestamp is a UTC instant. Inputs carrying an offset are
//! converted to UTC, inputs without one are read as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601-like timestamp. A bare `YYYY-MM-DD` is midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Parse a calendar date. Full timestamps are accepted and truncated to
/// their UTC date, so an event switched to all-day keeps its day.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|dt| dt.date_naive()))
}

/// RFC 3339 in UTC. Fractional seconds are written only when present, so
/// a stored value parses back to the same instant.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Midnight UTC at the start of the day after `date`. The last
/// representable day has no successor and ends at `DateTime::MAX_UTC`.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.succ_opt().map_or(DateTime::<Utc>::MAX_UTC, start_of_day)
}

/// Half-open UTC range `[start, end)` used to filter events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Build a range from query arguments. A date-only `end` covers that
    /// whole day.
    pub fn from_args(start: &str, end: &str) -> Result<Self, String> {
        let from = parse_timestamp(start)
            .ok_or_else(|| format!("Invalid start '{}'. Expected YYYY-MM-DD or a timestamp", start))?;
        let to = match NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d") {
            Ok(date) => end_of_day(date),
            Err(_) => parse_timestamp(end)
                .ok_or_else(|| format!("Invalid end '{}'. Expected YYYY-MM-DD or a timestamp", end))?,
        };
        if to <= from {
            return Err("Range end must be after range start".to_string());
        }
        Ok(DateRange { start: from, end: to })
    }

    /// Last calendar date touched by the range.
    pub fn last_date(&self) -> NaiveDate {
        (self.end - chrono::Duration::nanoseconds(1)).date_naive()
    }
}
