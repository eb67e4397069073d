//! Wall-clock helpers for daily scheduling and game time parsing.
//!
//! Feature schedules are expressed as a local clock time of day; game
//! responses report remaining durations either as `H时M分S秒` countdowns
//! or as `N分钟` offsets. Both are resolved here into UTC timestamps.

use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use regex::Regex;

use crate::models::config::ClockTime;

/// Times earlier than this far in the past still count as "today".
const ROLLOVER_GRACE: i64 = 60 * 60;

/// Resolve a clock-of-day to its next occurrence as a UTC timestamp.
///
/// With `day_offset` the date is pinned relative to today; without it,
/// a time more than an hour in the past rolls over to tomorrow.
#[must_use]
pub fn at_clock(clock: &ClockTime, day_offset: Option<i64>) -> DateTime<Utc> {
    let now = Local::now();
    let time = NaiveTime::from_hms_milli_opt(clock.hours, clock.minutes, clock.seconds, 999)
        .unwrap_or_default();
    let mut date = now.date_naive();
    if let Some(days) = day_offset {
        date += Duration::days(days);
    }
    let mut candidate = resolve_local(date.and_time(time));
    if day_offset.is_none() && candidate < now - Duration::seconds(ROLLOVER_GRACE) {
        candidate = resolve_local((date + Duration::days(1)).and_time(time));
    }
    candidate.with_timezone(&Utc)
}

/// Extract a countdown or clock reading from game text.
///
/// The pattern's named groups drive the interpretation: an `hours` group
/// is treated as a clock-of-day (rolling to tomorrow when already past),
/// a bare `minutes` group as an offset from now.
#[must_use]
pub fn parse_clock(text: &str, pattern: &Regex) -> Option<DateTime<Utc>> {
    let caps = pattern.captures(text)?;
    let group = |name: &str| {
        caps.name(name)
            .and_then(|m| m.as_str().parse::<u32>().ok())
    };
    if let Some(hours) = group("hours") {
        let clock = ClockTime {
            hours,
            minutes: group("minutes").unwrap_or(0),
            seconds: group("seconds").unwrap_or(0),
        };
        Some(at_clock(&clock, None))
    } else {
        let minutes = group("minutes")?;
        Some(Utc::now() + Duration::minutes(i64::from(minutes)))
    }
}

/// The earlier of two timestamps.
#[must_use]
pub fn min_date(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    if a < b {
        a
    } else {
        b
    }
}

/// Midnight at the start of the next local day.
#[must_use]
pub fn next_local_midnight() -> DateTime<Utc> {
    let tomorrow = Local::now().date_naive() + Duration::days(1);
    resolve_local(tomorrow.and_time(NaiveTime::MIN)).with_timezone(&Utc)
}

/// Whether two timestamps fall on the same local calendar day.
#[must_use]
pub fn same_local_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.with_timezone(&Local).date_naive() == b.with_timezone(&Local).date_naive()
}

// DST gaps make some local datetimes ambiguous or nonexistent; take the
// earliest valid reading, falling back past the gap hour by hour.
fn resolve_local(naive: chrono::NaiveDateTime) -> DateTime<Local> {
    let mut candidate = naive;
    for _ in 0..3 {
        if let Some(resolved) = candidate.and_local_timezone(Local).earliest() {
            return resolved;
        }
        candidate += Duration::hours(1);
    }
    Local::now()
}
