//! Reminder fire times. The engine computes when notifications are due; the
//! notification dispatcher owns delivery.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Minutes before the event start.
    pub minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireTime {
    pub minutes: u32,
    pub fire_at: DateTime<Utc>,
}

/// When each reminder fires for an event starting at `start`.
pub fn fire_times(start: DateTime<Utc>, reminders: &[Reminder]) -> Vec<FireTime> {
    reminders
        .iter()
        .map(|r| FireTime {
            minutes: r.minutes,
            fire_at: start - Duration::minutes(i64::from(r.minutes)),
        })
        .collect()
}

/// Fire times strictly after `now`; reminders already due are not scheduled.
pub fn pending_fire_times(
    start: DateTime<Utc>,
    reminders: &[Reminder],
    now: DateTime<Utc>,
) -> Vec<FireTime> {
    fire_times(start, reminders)
        .into_iter()
        .filter(|ft| ft.fire_at > now)
        .collect()
}

/// Parse the JSON reminders column; malformed input yields no reminders.
pub fn parse_reminders(raw: Option<&str>) -> Vec<Reminder> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(%err, "ignoring malformed reminders");
        Vec::new()
    })
}

/// Short label for a reminder offset, e.g. "15 min before" or "2h 30m before".
pub fn reminder_label(minutes: u32) -> String {
    match minutes {
        0 => "At time of event".to_string(),
        1..=59 => format!("{} min before", minutes),
        60 => "1 hour before".to_string(),
        61..=1439 => match (minutes / 60, minutes % 60) {
            (hours, 0) => format!("{} hours before", hours),
            (hours, mins) => format!("{}h {}m before", hours, mins),
        },
        1440 => "1 day before".to_string(),
        _ => format!("{} days before", minutes / 1440),
    }
}
