//! DST transition policies for wall-clock times that must become instants.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Policy for local times that fall during DST transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DstPolicy {
    /// Skip instances that fall in the DST gap (e.g., 2:30 AM during spring forward)
    Skip,
    /// Shift to the next valid time after the gap
    ShiftForward,
    /// Keep the wall clock time: gap times move forward by the gap length,
    /// ambiguous times take the earlier offset
    #[default]
    WallClock,
}

impl DstPolicy {
    /// Resolve a wall-clock time in `tz` to an instant, or `None` when the
    /// policy drops it.
    pub fn resolve(self, tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => match self {
                DstPolicy::Skip => None,
                DstPolicy::ShiftForward => first_valid_after(tz, local),
                DstPolicy::WallClock => {
                    // The offset in force before the gap, applied to the local time.
                    let before = first_valid_before(tz, local)?;
                    let offset = before.naive_local() - before.naive_utc();
                    Some((local - offset).and_utc())
                }
            },
        }
    }
}

/// Gaps are at most a few hours; search in one-minute steps.
const GAP_SEARCH_MINUTES: i64 = 24 * 60;

fn first_valid_after(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    (1..=GAP_SEARCH_MINUTES).find_map(|m| {
        tz.from_local_datetime(&(local + Duration::minutes(m)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn first_valid_before(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    (1..=GAP_SEARCH_MINUTES).find_map(|m| tz.from_local_datetime(&(local - Duration::minutes(m))).latest())
}
