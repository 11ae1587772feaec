//! Open booking slots for one day under working-hours, buffer and conflict
//! constraints.
//!
//! Candidate slots start every [`SLOT_STEP_MINUTES`] from the start of the
//! working window. Wall-clock times are read in the scheduling page's
//! timezone; every comparison against stored events happens on UTC instants.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::busy::{self, BusyBlock};
use crate::dst::DstPolicy;
use crate::materialize::EventRows;
use crate::model::{Event, EventKind, WorkingHours};

/// Spacing between candidate slot starts.
pub const SLOT_STEP_MINUTES: u32 = 15;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Working hours plus the owner's buffer, as resolved for one booking page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfig {
    pub working_hours: WorkingHours,
    pub buffer_minutes: u32,
}

/// A bookable interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Parameters of one availability request.
#[derive(Debug, Clone)]
pub struct SlotQuery<'a> {
    /// Day in `timezone`.
    pub date: NaiveDate,
    pub duration_minutes: u32,
    /// Padding requested by the caller (e.g. the scheduling page); the larger
    /// of this and the configured buffer wins.
    pub extra_buffer_minutes: u32,
    /// Calendars whose events count as busy; `None` means every event given.
    pub calendar_ids: Option<&'a [Uuid]>,
    pub timezone: Tz,
    pub now: DateTime<Utc>,
}

/// Compute the open slots of `query.date`.
///
/// Returns nothing when the date is not a working day, the whole day has
/// already passed, the working window is empty, or the duration is zero or
/// longer than the window.
/// Otherwise every candidate that has not yet ended and overlaps no padded
/// busy block is returned, in chronological order.
pub fn available_slots(query: &SlotQuery<'_>, config: &SchedulingConfig, events: &[Event]) -> Vec<TimeSlot> {
    let hours = &config.working_hours;
    if query.duration_minutes == 0 || !hours.is_working_day(query.date.weekday()) {
        return Vec::new();
    }

    let (day_start, day_end) = day_bounds(query.date, query.timezone);
    if day_end < query.now {
        return Vec::new();
    }

    let (window_start, window_end) = if hours.is_always_available {
        (0, MINUTES_PER_DAY)
    } else {
        (minutes_from_midnight(hours.start), minutes_from_midnight(hours.end))
    };
    if window_start >= window_end || query.duration_minutes > window_end - window_start {
        return Vec::new();
    }
    let last_start = window_end - query.duration_minutes;

    let buffer = config.buffer_minutes.max(query.extra_buffer_minutes);
    let padded: Vec<BusyBlock> = busy_blocks(events, query.calendar_ids, day_start, day_end)
        .into_iter()
        .map(|b| b.padded(buffer))
        .collect();
    let merged = busy::merge_busy_periods(&padded);

    let midnight = query.date.and_time(NaiveTime::MIN);
    let duration = Duration::minutes(i64::from(query.duration_minutes));
    let mut slots = Vec::new();
    let mut offset = window_start;
    while offset <= last_start {
        let local = midnight + Duration::minutes(i64::from(offset));
        offset += SLOT_STEP_MINUTES;

        // Wall-clock times skipped by a DST change are never offered.
        let Some(start_time) = DstPolicy::Skip.resolve(query.timezone, local) else {
            continue;
        };
        let end_time = start_time + duration;
        if end_time < query.now {
            continue;
        }
        if busy::is_free(&merged, start_time, end_time) {
            slots.push(TimeSlot { start_time, end_time });
        }
    }

    debug!(
        date = %query.date,
        busy = merged.len(),
        slots = slots.len(),
        buffer,
        "computed availability"
    );
    slots
}

/// Busy intervals of `[day_start, day_end]` from in-scope events: regular
/// events, series occurrences (respecting exclusions and exceptions) and
/// exception rows whose own time falls on the day.
pub fn busy_blocks(
    events: &[Event],
    calendar_ids: Option<&[Uuid]>,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
) -> Vec<BusyBlock> {
    let in_scope = |e: &&Event| calendar_ids.is_none_or(|ids| ids.contains(&e.calendar_id));
    let rows = EventRows::partition(events.iter().filter(in_scope).cloned());

    let mut blocks: Vec<BusyBlock> = rows
        .materialize(day_start, day_end)
        .iter()
        .map(BusyBlock::from)
        .collect();
    // An exception moved onto this day from another date is not reached by
    // expanding this day's window.
    blocks.extend(
        rows.exceptions
            .iter()
            .filter(|e| e.kind() == EventKind::Exception && e.overlaps(day_start, day_end))
            .map(|e| BusyBlock {
                start: e.start_time,
                end: e.end_time,
            }),
    );
    blocks
}

/// UTC bounds of a local day: midnight through 23:59:59.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    (
        resolve_wall_clock(date.and_time(NaiveTime::MIN), tz),
        resolve_wall_clock(date.and_time(last_second), tz),
    )
}

fn resolve_wall_clock(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    DstPolicy::WallClock
        .resolve(tz, local)
        .unwrap_or_else(|| local.and_utc())
}

fn minutes_from_midnight(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}
