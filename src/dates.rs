//! Timestamp helpers.
//!
//! Raw sources use epoch milliseconds (Roam), epoch seconds (Slack), and a
//! couple of textual formats (Twitter). Everything is normalized to ISO-8601
//! with an explicit offset, and parsed back for display.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Display pattern for result dates, e.g. `06/01/20`.
pub const DISPLAY_FORMAT: &str = "%m/%d/%y";

/// Twitter API `created_at` layout: `Wed Oct 10 20:19:24 +0000 2018`.
const TWITTER_API_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Current time as an ISO-8601 UTC string, used for `parsing_time`.
pub fn now_iso() -> String {
    to_iso(Utc::now())
}

pub fn to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

pub fn epoch_millis_to_iso(ms: i64) -> Result<String> {
    let dt = DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow!("timestamp out of range: {} ms", ms))?;
    Ok(to_iso(dt))
}

/// Fractional epoch seconds (Slack `ts`), kept to microsecond precision.
pub fn epoch_secs_to_iso(secs: f64) -> Result<String> {
    if !secs.is_finite() {
        return Err(anyhow!("timestamp is not a finite number: {}", secs));
    }
    let micros = (secs * 1_000_000.0).round() as i64;
    let dt = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| anyhow!("timestamp out of range: {} s", secs))?;
    Ok(to_iso(dt))
}

pub fn twitter_api_date_to_iso(raw: &str) -> Result<String> {
    let dt = DateTime::parse_from_str(raw, TWITTER_API_FORMAT)
        .with_context(|| format!("invalid tweet date: {}", raw))?;
    Ok(to_iso(dt.with_timezone(&Utc)))
}

/// Parse the timestamp layouts found in stored documents.
///
/// Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    for layout in ["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S %z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, layout) {
            return Some(dt);
        }
    }
    let utc = FixedOffset::east_opt(0)?;
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return utc.from_local_datetime(&naive).single();
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| utc.from_local_datetime(&naive).single())
}

/// Render a stored timestamp with [`DISPLAY_FORMAT`], in its own offset.
pub fn format_display_date(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|dt| dt.format(DISPLAY_FORMAT).to_string())
}
