//! Scheduling and time parsing utilities
//!
//! Turns the user's schedule input into a unix timestamp, interpreting
//! wall-clock times in the post's timezone.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CadenceError, Result};

/// Wall-clock formats interpreted in the post's timezone
const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| CadenceError::validation(format!("Unknown timezone: '{}'", name)))
}

/// Parse a schedule string into an instant
///
/// Supports multiple formats:
/// - RFC 3339 instants: "2025-11-20T15:00:00Z", "2025-11-20T15:00:00+07:00"
/// - Wall-clock times in `tz`: "2025-11-20 15:00"
/// - Relative durations: "1h", "30m", "2d"
/// - Natural language in `tz`: "tomorrow 3pm", "next monday 10am"
///
/// # Errors
///
/// Returns a validation error if the input is not a parseable instant.
pub fn parse_schedule(input: &str, tz: Tz, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CadenceError::validation("Scheduled time is required"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Some(dt) = parse_local(input, tz)? {
        return Ok(dt);
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|_| CadenceError::validation("Duration out of range"))?;
        return now
            .checked_add_signed(duration)
            .ok_or_else(|| CadenceError::validation("Duration out of range"));
    }

    let local_now = now.with_timezone(&tz).fixed_offset();
    if let Ok(dt) = chrono_english::parse_date_string(input, local_now, chrono_english::Dialect::Us)
    {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(CadenceError::validation(format!(
        "Could not parse scheduled time: '{}'",
        input
    )))
}

/// Interpret a naive wall-clock time in `tz`
///
/// Returns `Ok(None)` when the input is not in a wall-clock format, and an
/// error when it names a time skipped by a DST transition.
fn parse_local(input: &str, tz: Tz) -> Result<Option<DateTime<Utc>>> {
    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok());

    let Some(naive) = naive else {
        return Ok(None);
    };

    // Ambiguous times (clocks going back) resolve to the earlier instant
    match tz.from_local_datetime(&naive).earliest() {
        Some(local) => Ok(Some(local.with_timezone(&Utc))),
        None => Err(CadenceError::validation(format!(
            "'{}' does not exist in timezone {}",
            input, tz
        ))),
    }
}
