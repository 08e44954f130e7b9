//! Time expression resolution
//!
//! Turns a free-form time expression plus a stored IANA timezone into an
//! absolute UTC instant. An expression is either a bare clock time
//! ("18", "18:30", "18:30:15"), composed with today's date in the target
//! zone and bumped to tomorrow if already past, or a full date-time parsed
//! against a fixed set of permissive formats.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

use crate::core::TimeError;

/// Accepted date-time layouts for the explicit-date path, tried in order.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Accepted date-only layouts; the time defaults to midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Hour, hour:minute or hour:minute:second. The hour range tolerates a
/// leading zero form (`09`) without anchoring to 0-23; out-of-range hours
/// like `25` are rejected later when the clock time is built.
fn clock_time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-2]?[0-9])(:([0-5][0-9]))?(:([0-5][0-9]))?$").expect("valid regex")
    })
}

/// Resolve `expr` in `zone` relative to `now`.
///
/// Returns the absolute fire instant, or [`TimeError::InvalidTime`] when the
/// expression (or the zone name) cannot be understood, or
/// [`TimeError::PastTime`] when an explicit date-time lies in the past.
/// Clock-time expressions are future by construction and never yield
/// `PastTime`.
pub fn resolve(expr: &str, zone: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(TimeError::InvalidTime(expr.to_string()));
    }

    let tz: Tz = zone
        .parse()
        .map_err(|_| TimeError::InvalidTime(format!("unknown timezone `{zone}`")))?;

    if let Some(caps) = clock_time_pattern().captures(expr) {
        debug!("Resolving `{expr}` as a clock time in {zone}");
        resolve_clock_time(&caps, tz, now, expr)
    } else {
        debug!("Resolving `{expr}` as a date-time in {zone}");
        resolve_date_time(expr, tz, now)
    }
}

fn resolve_clock_time(
    caps: &regex::Captures<'_>,
    tz: Tz,
    now: DateTime<Utc>,
    expr: &str,
) -> Result<DateTime<Utc>, TimeError> {
    let invalid = || TimeError::InvalidTime(expr.to_string());

    let hour: u32 = caps[1].parse().map_err(|_| invalid())?;
    let minute: u32 = caps
        .get(3)
        .map(|m| m.as_str().parse())
        .transpose()
        .map_err(|_| invalid())?
        .unwrap_or(0);
    let second: u32 = caps
        .get(5)
        .map(|m| m.as_str().parse())
        .transpose()
        .map_err(|_| invalid())?
        .unwrap_or(0);

    let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)?;

    let today = now.with_timezone(&tz).date_naive();
    let candidate = local_to_utc(today.and_time(time), tz).ok_or_else(invalid)?;

    if candidate > now {
        Ok(candidate)
    } else {
        // That clock time already passed today; take tomorrow instead.
        let tomorrow = today.succ_opt().ok_or_else(invalid)?;
        local_to_utc(tomorrow.and_time(time), tz).ok_or_else(invalid)
    }
}

fn resolve_date_time(expr: &str, tz: Tz, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeError> {
    let naive = parse_permissive(expr).ok_or_else(|| TimeError::InvalidTime(expr.to_string()))?;

    let resolved =
        local_to_utc(naive, tz).ok_or_else(|| TimeError::InvalidTime(expr.to_string()))?;

    if resolved <= now {
        return Err(TimeError::PastTime(resolved));
    }
    Ok(resolved)
}

fn parse_permissive(expr: &str) -> Option<NaiveDateTime> {
    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(expr, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(expr, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Interpret a naive local timestamp in `tz`, normalized to UTC.
///
/// DST gaps make some local timestamps nonexistent; ambiguous ones take the
/// earlier occurrence.
fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, _) => Some(earlier.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// The start of the next full hour after `now`.
///
/// Used as the reconciliation cutoff: each sweep arms everything due before
/// the next sweep would run.
pub fn next_full_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = now
        - Duration::minutes(now.minute() as i64)
        - Duration::seconds(now.second() as i64)
        - Duration::nanoseconds(now.nanosecond() as i64);
    truncated + Duration::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_clock_time_later_today() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(resolve("11:30", "UTC", now).unwrap(), at("2024-01-01T11:30:00Z"));
    }

    #[test]
    fn test_clock_time_already_passed_rolls_to_tomorrow() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(resolve("09:00", "UTC", now).unwrap(), at("2024-01-02T09:00:00Z"));
    }

    #[test]
    fn test_clock_time_exactly_now_rolls_to_tomorrow() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(resolve("10:00", "UTC", now).unwrap(), at("2024-01-02T10:00:00Z"));
    }

    #[test]
    fn test_hour_only_and_seconds_forms() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(resolve("18", "UTC", now).unwrap(), at("2024-01-01T18:00:00Z"));
        assert_eq!(
            resolve("18:30:15", "UTC", now).unwrap(),
            at("2024-01-01T18:30:15Z")
        );
    }

    #[test]
    fn test_clock_time_respects_timezone() {
        // 18:00 in Warsaw (UTC+1 in winter) is 17:00 UTC.
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(
            resolve("18:00", "Europe/Warsaw", now).unwrap(),
            at("2024-01-01T17:00:00Z")
        );
    }

    #[test]
    fn test_out_of_range_hour_is_invalid() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(
            resolve("25", "UTC", now),
            Err(TimeError::InvalidTime("25".to_string()))
        );
    }

    #[test]
    fn test_garbage_expression_is_invalid() {
        let now = at("2024-01-01T10:00:00Z");
        assert!(matches!(
            resolve("not-a-time-zz", "UTC", now),
            Err(TimeError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_unknown_zone_is_invalid() {
        let now = at("2024-01-01T10:00:00Z");
        assert!(matches!(
            resolve("11:30", "Mars/Olympus_Mons", now),
            Err(TimeError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_explicit_date_time_in_future() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(
            resolve("2024-03-15 18:00", "UTC", now).unwrap(),
            at("2024-03-15T18:00:00Z")
        );
        assert_eq!(
            resolve("15/03/2024 18:00", "UTC", now).unwrap(),
            at("2024-03-15T18:00:00Z")
        );
    }

    #[test]
    fn test_date_only_resolves_to_midnight() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(
            resolve("2024-03-15", "UTC", now).unwrap(),
            at("2024-03-15T00:00:00Z")
        );
    }

    #[test]
    fn test_explicit_date_time_in_zone() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(
            resolve("2024-03-15 18:00", "Europe/Warsaw", now).unwrap(),
            at("2024-03-15T17:00:00Z")
        );
    }

    #[test]
    fn test_past_date_time_is_reported() {
        let now = at("2024-01-01T10:00:00Z");
        assert_eq!(
            resolve("2023-12-31 18:00", "UTC", now),
            Err(TimeError::PastTime(at("2023-12-31T18:00:00Z")))
        );
    }

    #[test]
    fn test_next_full_hour() {
        assert_eq!(
            next_full_hour(at("2024-01-01T10:17:42Z")),
            at("2024-01-01T11:00:00Z")
        );
        // Already on the boundary still advances a full hour.
        assert_eq!(
            next_full_hour(at("2024-01-01T10:00:00Z")),
            at("2024-01-01T11:00:00Z")
        );
    }
}
