//! Tests for RRULE expansion over query windows.

use agenda_engine::dst::DstPolicy;
use agenda_engine::error::EngineError;
use agenda_engine::expander::{expand, expand_in};
use chrono::{DateTime, Datelike, TimeZone, Utc, Weekday};
use chrono_tz::America::Los_Angeles;

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn starts(rule: &str, anchor: DateTime<Utc>, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    expand(rule, anchor, 60, from, to)
        .expect("rule should expand")
        .into_iter()
        .map(|e| e.start)
        .collect()
}

// ---------------------------------------------------------------------------
// Weekly
// ---------------------------------------------------------------------------

#[test]
fn weekly_monday_through_january() {
    // 2024-01-01 is a Monday.
    let result = expand(
        "FREQ=WEEKLY;BYDAY=MO",
        utc(2024, 1, 1, 9, 0),
        60,
        utc(2024, 1, 1, 0, 0),
        Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
    )
    .unwrap();

    let days: Vec<u32> = result.iter().map(|e| e.start.day()).collect();
    assert_eq!(days, vec![1, 8, 15, 22, 29]);
    for event in &result {
        assert_eq!(event.start.weekday(), Weekday::Mon);
        assert_eq!(event.end - event.start, chrono::Duration::minutes(60));
    }
}

#[test]
fn biweekly_two_days() {
    let got = starts(
        "FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TH",
        utc(2024, 1, 1, 9, 0),
        utc(2024, 1, 1, 0, 0),
        utc(2024, 2, 2, 0, 0),
    );
    assert_eq!(
        got,
        vec![
            utc(2024, 1, 1, 9, 0),
            utc(2024, 1, 4, 9, 0),
            utc(2024, 1, 15, 9, 0),
            utc(2024, 1, 18, 9, 0),
            utc(2024, 1, 29, 9, 0),
            utc(2024, 2, 1, 9, 0),
        ]
    );
}

#[test]
fn weekly_without_byday_repeats_anchor_weekday() {
    // 2024-01-03 is a Wednesday.
    let got = starts("FREQ=WEEKLY", utc(2024, 1, 3, 9, 0), utc(2024, 1, 1, 0, 0), utc(2024, 1, 20, 0, 0));
    assert_eq!(got, vec![utc(2024, 1, 3, 9, 0), utc(2024, 1, 10, 9, 0), utc(2024, 1, 17, 9, 0)]);
}

#[test]
fn anchor_is_first_even_when_byday_excludes_it() {
    let got = starts("FREQ=WEEKLY;BYDAY=TU", utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 0, 0), utc(2024, 1, 10, 0, 0));
    assert_eq!(got, vec![utc(2024, 1, 1, 9, 0), utc(2024, 1, 2, 9, 0), utc(2024, 1, 9, 9, 0)]);
}

// ---------------------------------------------------------------------------
// COUNT / UNTIL
// ---------------------------------------------------------------------------

#[test]
fn count_includes_anchor_and_is_counted_from_it() {
    // Occurrences are Jan 1..=5; the window only sees the last three.
    let got = starts("FREQ=DAILY;COUNT=5", utc(2024, 1, 1, 9, 0), utc(2024, 1, 3, 0, 0), utc(2024, 1, 31, 0, 0));
    assert_eq!(got, vec![utc(2024, 1, 3, 9, 0), utc(2024, 1, 4, 9, 0), utc(2024, 1, 5, 9, 0)]);
}

#[test]
fn count_of_one_is_just_the_anchor() {
    let got = starts("FREQ=WEEKLY;COUNT=1", utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 0, 0), utc(2024, 12, 31, 0, 0));
    assert_eq!(got, vec![utc(2024, 1, 1, 9, 0)]);
}

#[test]
fn until_is_inclusive() {
    let got = starts(
        "FREQ=DAILY;UNTIL=20240105T090000Z",
        utc(2024, 1, 1, 9, 0),
        utc(2024, 1, 1, 0, 0),
        utc(2024, 1, 31, 0, 0),
    );
    assert_eq!(got.len(), 5);
    assert_eq!(got.last(), Some(&utc(2024, 1, 5, 9, 0)));
}

#[test]
fn until_before_anchor_yields_nothing() {
    let got = starts("FREQ=DAILY;UNTIL=20231231", utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 0, 0), utc(2024, 1, 31, 0, 0));
    assert!(got.is_empty());
}

// ---------------------------------------------------------------------------
// Monthly / yearly
// ---------------------------------------------------------------------------

#[test]
fn monthly_on_the_31st_skips_short_months() {
    let got = starts("FREQ=MONTHLY", utc(2024, 1, 31, 9, 0), utc(2024, 1, 1, 0, 0), utc(2024, 6, 30, 23, 0));
    assert_eq!(got, vec![utc(2024, 1, 31, 9, 0), utc(2024, 3, 31, 9, 0), utc(2024, 5, 31, 9, 0)]);
}

#[test]
fn monthly_last_day() {
    let got = starts(
        "FREQ=MONTHLY;BYMONTHDAY=-1",
        utc(2024, 1, 31, 9, 0),
        utc(2024, 1, 1, 0, 0),
        utc(2024, 4, 1, 0, 0),
    );
    assert_eq!(got, vec![utc(2024, 1, 31, 9, 0), utc(2024, 2, 29, 9, 0), utc(2024, 3, 31, 9, 0)]);
}

#[test]
fn monthly_on_several_days() {
    let got = starts(
        "FREQ=MONTHLY;BYMONTHDAY=1,15",
        utc(2024, 1, 1, 9, 0),
        utc(2024, 1, 1, 0, 0),
        utc(2024, 2, 20, 0, 0),
    );
    assert_eq!(
        got,
        vec![utc(2024, 1, 1, 9, 0), utc(2024, 1, 15, 9, 0), utc(2024, 2, 1, 9, 0), utc(2024, 2, 15, 9, 0)]
    );
}

#[test]
fn yearly_on_leap_day_only_in_leap_years() {
    let got = starts("FREQ=YEARLY", utc(2024, 2, 29, 9, 0), utc(2024, 1, 1, 0, 0), utc(2032, 12, 31, 0, 0));
    assert_eq!(got, vec![utc(2024, 2, 29, 9, 0), utc(2028, 2, 29, 9, 0), utc(2032, 2, 29, 9, 0)]);
}

// ---------------------------------------------------------------------------
// Window boundaries
// ---------------------------------------------------------------------------

#[test]
fn window_bounds_are_inclusive() {
    let got = starts("FREQ=DAILY", utc(2024, 1, 1, 9, 0), utc(2024, 1, 2, 9, 0), utc(2024, 1, 4, 9, 0));
    assert_eq!(got, vec![utc(2024, 1, 2, 9, 0), utc(2024, 1, 3, 9, 0), utc(2024, 1, 4, 9, 0)]);
}

#[test]
fn weekly_scenario_ends_exactly_on_window_end() {
    let anchor = utc(2024, 1, 1, 0, 0);
    let got = starts("FREQ=WEEKLY;BYDAY=MO", anchor, anchor, utc(2024, 1, 22, 0, 0));
    assert_eq!(
        got,
        vec![utc(2024, 1, 1, 0, 0), utc(2024, 1, 8, 0, 0), utc(2024, 1, 15, 0, 0), utc(2024, 1, 22, 0, 0)]
    );

    let short = utc(2024, 1, 22, 0, 0) - chrono::Duration::milliseconds(1);
    assert_eq!(starts("FREQ=WEEKLY;BYDAY=MO", anchor, anchor, short).len(), 3);
}

#[test]
fn occurrence_running_at_window_start_is_included() {
    let got = starts("FREQ=DAILY", utc(2024, 1, 1, 9, 0), utc(2024, 1, 2, 9, 30), utc(2024, 1, 2, 12, 0));
    assert_eq!(got, vec![utc(2024, 1, 2, 9, 0)]);
}

#[test]
fn occurrence_ending_at_window_start_is_excluded() {
    let got = starts("FREQ=DAILY", utc(2024, 1, 1, 9, 0), utc(2024, 1, 2, 10, 0), utc(2024, 1, 2, 12, 0));
    assert!(got.is_empty());
}

#[test]
fn inverted_window_or_future_anchor_yields_nothing() {
    assert!(starts("FREQ=DAILY", utc(2024, 1, 1, 9, 0), utc(2024, 2, 1, 0, 0), utc(2024, 1, 1, 0, 0)).is_empty());
    assert!(starts("FREQ=DAILY", utc(2025, 1, 1, 9, 0), utc(2024, 1, 1, 0, 0), utc(2024, 12, 31, 0, 0)).is_empty());
}

#[test]
fn old_series_fast_forwards_to_the_window() {
    // 2015-01-05 and 2024-01-01 are both Mondays.
    let got = starts("FREQ=WEEKLY", utc(2015, 1, 5, 9, 0), utc(2024, 1, 1, 0, 0), utc(2024, 1, 7, 23, 0));
    assert_eq!(got, vec![utc(2024, 1, 1, 9, 0)]);
}

// ---------------------------------------------------------------------------
// Timezones and DST
// ---------------------------------------------------------------------------

#[test]
fn wall_clock_time_survives_spring_forward() {
    // 09:00 PST on 2026-03-07; DST starts 2026-03-08 in Los Angeles.
    let got = expand_in(
        "FREQ=DAILY;COUNT=3",
        utc(2026, 3, 7, 17, 0),
        30,
        utc(2026, 3, 1, 0, 0),
        utc(2026, 3, 31, 0, 0),
        Los_Angeles,
        DstPolicy::WallClock,
    )
    .unwrap();
    let got: Vec<_> = got.into_iter().map(|e| e.start).collect();
    assert_eq!(got, vec![utc(2026, 3, 7, 17, 0), utc(2026, 3, 8, 16, 0), utc(2026, 3, 9, 16, 0)]);
}

#[test]
fn utc_frame_keeps_utc_time_of_day() {
    let got = starts("FREQ=DAILY;COUNT=3", utc(2026, 3, 7, 17, 0), utc(2026, 3, 1, 0, 0), utc(2026, 3, 31, 0, 0));
    assert_eq!(got, vec![utc(2026, 3, 7, 17, 0), utc(2026, 3, 8, 17, 0), utc(2026, 3, 9, 17, 0)]);
}

#[test]
fn gap_times_follow_the_policy() {
    // 02:30 PST on 2026-03-07; 02:30 does not exist on 2026-03-08.
    let anchor = utc(2026, 3, 7, 10, 30);
    let run = |policy| -> Vec<DateTime<Utc>> {
        expand_in(
            "FREQ=DAILY;COUNT=3",
            anchor,
            30,
            utc(2026, 3, 1, 0, 0),
            utc(2026, 3, 31, 0, 0),
            Los_Angeles,
            policy,
        )
        .unwrap()
        .into_iter()
        .map(|e| e.start)
        .collect()
    };

    assert_eq!(
        run(DstPolicy::Skip),
        vec![anchor, utc(2026, 3, 9, 9, 30), utc(2026, 3, 10, 9, 30)]
    );
    assert_eq!(
        run(DstPolicy::ShiftForward),
        vec![anchor, utc(2026, 3, 8, 10, 0), utc(2026, 3, 9, 9, 30)]
    );
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn malformed_rules_are_errors() {
    let anchor = utc(2024, 1, 1, 9, 0);
    for bad in ["", "FREQ=SOMETIMES", "FREQ=DAILY;BYHOUR=9"] {
        let result = expand(bad, anchor, 60, anchor, utc(2024, 2, 1, 0, 0));
        assert!(matches!(result, Err(EngineError::InvalidRule(_))), "{:?}", bad);
    }
}
