//! Unit tests for clock parsing and daily scheduling helpers.

use channel_pilot::models::config::ClockTime;
use channel_pilot::timeutil::{at_clock, min_date, next_local_midnight, parse_clock, same_local_day};
use chrono::{Duration, Utc};
use regex::Regex;

#[test]
fn countdown_pattern_resolves_relative_minutes() {
    let pattern = Regex::new(r"(?<minutes>\d+)分钟成熟").expect("pattern");
    let before = Utc::now();
    let at = parse_clock("仙露草 30分钟成熟", &pattern).expect("parsed");
    let after = Utc::now();

    assert!(at >= before + Duration::minutes(30));
    assert!(at <= after + Duration::minutes(30));
}

#[test]
fn clock_pattern_resolves_to_a_nearby_calendar_time() {
    let pattern =
        Regex::new(r"(?<hours>\d+)时(?<minutes>\d+)分(?<seconds>\d+)秒").expect("pattern");
    let at = parse_clock("剩余0时29分59秒", &pattern).expect("parsed");
    let now = Utc::now();

    // Clock-of-day readings land today or roll to tomorrow.
    assert!(at > now - Duration::hours(2));
    assert!(at < now + Duration::hours(25));
}

#[test]
fn unmatched_text_parses_to_none() {
    let pattern = Regex::new(r"(?<minutes>\d+)分钟成熟").expect("pattern");
    assert!(parse_clock("暂无种植的区域", &pattern).is_none());
}

#[test]
fn day_offset_pins_the_calendar_day() {
    let clock = ClockTime::new(12, 0, 0);
    let today = at_clock(&clock, Some(0));
    let tomorrow = at_clock(&clock, Some(1));

    let gap = tomorrow - today;
    // DST shifts can move the gap by an hour either way.
    assert!(gap >= Duration::hours(23) && gap <= Duration::hours(25));
}

#[test]
fn without_offset_a_long_past_time_rolls_to_tomorrow() {
    let clock = ClockTime::new(0, 0, 0);
    let resolved = at_clock(&clock, None);

    // Midnight is always more than the grace hour behind by mid-day;
    // either reading must never be far in the past.
    assert!(resolved > Utc::now() - Duration::hours(2));
}

#[test]
fn min_date_picks_the_earlier_timestamp() {
    let now = Utc::now();
    let later = now + Duration::minutes(5);
    assert_eq!(min_date(now, later), now);
    assert_eq!(min_date(later, now), now);
}

#[test]
fn next_midnight_is_in_the_future_and_within_a_day() {
    let midnight = next_local_midnight();
    let now = Utc::now();
    assert!(midnight > now);
    assert!(midnight <= now + Duration::hours(25));
}

#[test]
fn same_local_day_distinguishes_days() {
    let now = Utc::now();
    assert!(same_local_day(now, now));
    assert!(!same_local_day(now, now + Duration::days(2)));
}
