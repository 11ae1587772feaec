//! RRULE expansion -- converts recurrence rule strings into concrete occurrences
//! inside a query window.
//!
//! Expansion is anchored on the series' original start: the anchor is always
//! the first occurrence, later occurrences repeat its wall-clock time of day in
//! the expansion timezone, and COUNT is counted from the anchor no matter where
//! the window lies. Rules without COUNT fast-forward to the window, so series
//! that started years ago cost the same as new ones.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use tracing::trace;

use crate::dst::DstPolicy;
use crate::error::{EngineError, Result};
use crate::rule::{Freq, RecurrenceRule};

/// A single expanded occurrence with start and end times.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExpandedEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Parse an IANA timezone identifier.
///
/// # Errors
/// Returns `EngineError::InvalidTimezone` for unknown identifiers.
pub fn parse_timezone(timezone: &str) -> Result<Tz> {
    timezone
        .parse()
        .map_err(|_| EngineError::InvalidTimezone(timezone.to_string()))
}

/// Expand a rule string over `[window_start, window_end]`, repeating the
/// anchor's UTC time of day.
///
/// An occurrence is returned when it starts inside the window (both bounds
/// inclusive) or started earlier and is still running at `window_start`.
/// Every occurrence lasts `duration_minutes`. Results are chronological.
///
/// # Errors
/// Returns `EngineError::InvalidRule` if the rule string is empty or unparseable.
pub fn expand(
    rule: &str,
    anchor: DateTime<Utc>,
    duration_minutes: u32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<ExpandedEvent>> {
    expand_in(
        rule,
        anchor,
        duration_minutes,
        window_start,
        window_end,
        Tz::UTC,
        DstPolicy::default(),
    )
}

/// Like [`expand`], but occurrences repeat the anchor's wall-clock time in
/// `tz`, with `policy` deciding what happens to times inside a DST gap.
///
/// # Errors
/// Returns `EngineError::InvalidRule` if the rule string is empty or unparseable.
pub fn expand_in(
    rule: &str,
    anchor: DateTime<Utc>,
    duration_minutes: u32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    tz: Tz,
    policy: DstPolicy,
) -> Result<Vec<ExpandedEvent>> {
    let parsed: RecurrenceRule = rule.parse()?;
    Ok(expand_rule(
        &parsed,
        anchor,
        duration_minutes,
        window_start,
        window_end,
        tz,
        policy,
    ))
}

/// Expand an already-parsed rule. See [`expand_in`].
pub fn expand_rule(
    rule: &RecurrenceRule,
    anchor: DateTime<Utc>,
    duration_minutes: u32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    tz: Tz,
    policy: DstPolicy,
) -> Vec<ExpandedEvent> {
    let duration = Duration::minutes(i64::from(duration_minutes));
    let mut events = Vec::new();

    if window_start > window_end || anchor > window_end || rule.count == Some(0) {
        return events;
    }
    if rule.until.is_some_and(|until| anchor > until) {
        return events;
    }

    let in_window =
        |start: DateTime<Utc>| start >= window_start || start + duration > window_start;
    let occurrence = |start: DateTime<Utc>| ExpandedEvent {
        start,
        end: start + duration,
    };

    if in_window(anchor) {
        events.push(occurrence(anchor));
    }
    let mut produced: u32 = 1;

    let local_anchor = anchor.with_timezone(&tz).naive_local();
    let anchor_date = local_anchor.date();
    let time_of_day = local_anchor.time();
    let last_date = window_end.with_timezone(&tz).date_naive() + Duration::days(1);
    let interval = i64::from(rule.interval.max(1));

    let mut period = if rule.count.is_some() {
        0
    } else {
        let earliest = (window_start - duration).with_timezone(&tz).date_naive() - Duration::days(1);
        first_relevant_period(rule.freq, anchor_date, earliest, interval)
    };

    loop {
        let Some(start) = period_start(rule.freq, anchor_date, period * interval) else {
            break;
        };
        if start > last_date {
            break;
        }

        for date in period_dates(rule, anchor_date, start) {
            if date <= anchor_date {
                continue;
            }
            let Some(instant) = policy.resolve(tz, date.and_time(time_of_day)) else {
                continue;
            };
            if rule.until.is_some_and(|until| instant > until)
                || rule.count.is_some_and(|count| produced >= count)
                || instant > window_end
            {
                trace!(produced, kept = events.len(), "expansion finished");
                return events;
            }
            produced += 1;
            if in_window(instant) {
                events.push(occurrence(instant));
            }
        }
        period += 1;
    }

    trace!(produced, kept = events.len(), "expansion reached window end");
    events
}

/// Index of the last period that starts on or before `earliest`, so skipping
/// everything before it cannot drop an occurrence that reaches the window.
fn first_relevant_period(freq: Freq, anchor: NaiveDate, earliest: NaiveDate, interval: i64) -> i64 {
    if earliest <= anchor {
        return 0;
    }
    let elapsed = match freq {
        Freq::Daily => (earliest - anchor).num_days(),
        Freq::Weekly => (week_start(earliest) - week_start(anchor)).num_days() / 7,
        Freq::Monthly => month_index(earliest) - month_index(anchor),
        Freq::Yearly => i64::from(earliest.year() - anchor.year()),
    };
    elapsed / interval
}

/// First date of the period `steps` frequency units after the anchor's period.
fn period_start(freq: Freq, anchor: NaiveDate, steps: i64) -> Option<NaiveDate> {
    match freq {
        Freq::Daily => anchor.checked_add_signed(Duration::try_days(steps)?),
        Freq::Weekly => week_start(anchor).checked_add_signed(Duration::try_weeks(steps)?),
        Freq::Monthly => {
            let index = month_index(anchor).checked_add(steps)?;
            let year = i32::try_from(index.div_euclid(12)).ok()?;
            NaiveDate::from_ymd_opt(year, index.rem_euclid(12) as u32 + 1, 1)
        }
        Freq::Yearly => {
            let year = i32::try_from(i64::from(anchor.year()).checked_add(steps)?).ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
    }
}

/// Candidate dates of one period, ascending.
fn period_dates(rule: &RecurrenceRule, anchor: NaiveDate, start: NaiveDate) -> Vec<NaiveDate> {
    let matches_weekday = |d: &NaiveDate| rule.by_day.is_empty() || rule.by_day.contains(&d.weekday());
    let matches_month_day = |d: &NaiveDate| {
        rule.by_month_day.is_empty() || rule.by_month_day.iter().any(|md| month_day_matches(*d, *md))
    };

    let candidates: Vec<NaiveDate> = match rule.freq {
        Freq::Daily => vec![start],
        Freq::Weekly => {
            let days: Vec<Weekday> = if rule.by_day.is_empty() {
                vec![anchor.weekday()]
            } else {
                rule.by_day.clone()
            };
            let mut dates: Vec<NaiveDate> = days
                .iter()
                .filter_map(|d| {
                    start.checked_add_signed(Duration::days(i64::from(d.num_days_from_monday())))
                })
                .collect();
            dates.sort_unstable();
            return dates.into_iter().filter(matches_month_day).collect();
        }
        Freq::Monthly => {
            if rule.by_day.is_empty() && rule.by_month_day.is_empty() {
                start.with_day(anchor.day()).into_iter().collect()
            } else {
                month_days(start.year(), start.month())
            }
        }
        Freq::Yearly => {
            if !rule.by_day.is_empty() {
                year_days(start.year())
            } else if !rule.by_month_day.is_empty() {
                month_days(start.year(), anchor.month())
            } else {
                NaiveDate::from_ymd_opt(start.year(), anchor.month(), anchor.day())
                    .into_iter()
                    .collect()
            }
        }
    };

    candidates
        .into_iter()
        .filter(matches_weekday)
        .filter(matches_month_day)
        .collect()
}

fn month_day_matches(date: NaiveDate, month_day: i8) -> bool {
    let day = i64::from(date.day());
    let wanted = if month_day > 0 {
        i64::from(month_day)
    } else {
        i64::from(days_in_month(date.year(), date.month())) + 1 + i64::from(month_day)
    };
    day == wanted
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

fn month_days(year: i32, month: u32) -> Vec<NaiveDate> {
    (1..=days_in_month(year, month))
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .collect()
}

fn year_days(year: i32) -> Vec<NaiveDate> {
    (1..=12).flat_map(|month| month_days(year, month)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn days_in_month_handles_leap_years_and_december() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 12), 31);
    }

    #[test]
    fn negative_month_day_counts_from_end() {
        assert!(month_day_matches(date(2025, 2, 28), -1));
        assert!(month_day_matches(date(2024, 2, 28), -2));
        assert!(!month_day_matches(date(2024, 2, 28), -1));
    }

    #[test]
    fn fast_forward_never_overshoots() {
        let anchor = date(2020, 1, 15);
        let earliest = date(2025, 6, 10);
        for interval in 1..=5 {
            let period = first_relevant_period(Freq::Monthly, anchor, earliest, interval);
            let start = period_start(Freq::Monthly, anchor, period * interval).unwrap();
            assert!(start <= earliest);
        }
    }

    #[test]
    fn weekly_period_starts_on_monday() {
        // 2025-01-01 is a Wednesday.
        let start = period_start(Freq::Weekly, date(2025, 1, 1), 1).unwrap();
        assert_eq!(start, date(2025, 1, 6));
        assert_eq!(start.weekday(), Weekday::Mon);
    }
}
