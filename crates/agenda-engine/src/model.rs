//! Persisted entities the engine reads and produces.
//!
//! Storage itself is an external collaborator (see [`crate::store`]); these are
//! the shapes it hands over. Helpers for the legacy string columns (comma-joined
//! exDates, JSON working days and durations, `"HH:mm"` times) degrade to safe
//! defaults instead of failing, since that data is advisory configuration.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::reminder::Reminder;
use crate::weekday;

/// Date-key of an instant: its UTC calendar date.
///
/// Exclusions and exception rows are matched on this key, so every caller must
/// derive it the same way.
pub fn date_key(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub name: String,
    pub email: String,
}

/// Occurrence dates removed from a series without replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExDates(BTreeSet<NaiveDate>);

impl ExDates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the legacy comma-joined `YYYY-MM-DD` column. Blank entries are
    /// ignored; malformed entries are logged and dropped.
    pub fn from_column(raw: &str) -> Self {
        let dates = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    warn!(entry = s, "ignoring malformed exDate");
                    None
                }
            })
            .collect();
        Self(dates)
    }

    /// Render as the legacy comma-joined column (empty string when empty).
    pub fn to_column(&self) -> String {
        self.0
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Returns `false` if the date was already excluded.
    pub fn insert(&mut self, date: NaiveDate) -> bool {
        self.0.insert(date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0.contains(&date)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NaiveDate> {
        self.0.iter()
    }
}

impl FromIterator<NaiveDate> for ExDates {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Which of the three row roles an event plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A standalone, non-recurring event.
    Regular,
    /// The template row of a recurring series.
    Master,
    /// A row replacing one occurrence of a series.
    Exception,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub calendar_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub rrule: Option<String>,
    /// Inclusive bound on the series' occurrence starts.
    #[serde(default)]
    pub recurrence_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub series_id: Option<Uuid>,
    #[serde(default)]
    pub ex_dates: ExDates,
    #[serde(default)]
    pub is_exception: bool,
    /// Start of the occurrence an exception row replaces.
    #[serde(default)]
    pub original_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    #[serde(default)]
    pub is_focus_time: bool,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Event {
    /// A regular event with a fresh id.
    pub fn new(
        calendar_id: Uuid,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            calendar_id,
            title: title.into(),
            description: None,
            location: None,
            start_time,
            end_time,
            is_all_day: false,
            timezone: default_timezone(),
            is_recurring: false,
            rrule: None,
            recurrence_end: None,
            series_id: None,
            ex_dates: ExDates::new(),
            is_exception: false,
            original_date: None,
            tags: Vec::new(),
            reminders: Vec::new(),
            is_focus_time: false,
            participants: Vec::new(),
        }
    }

    /// Turn this event into the master of a new series.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.is_recurring = true;
        self.rrule = Some(rule.into());
        self.series_id = Some(Uuid::new_v4());
        self
    }

    pub fn kind(&self) -> EventKind {
        if self.is_exception {
            EventKind::Exception
        } else if self.is_recurring {
            EventKind::Master
        } else {
            EventKind::Regular
        }
    }

    /// Whole minutes between start and end (never negative).
    pub fn duration_minutes(&self) -> u32 {
        u32::try_from((self.end_time - self.start_time).num_minutes().max(0)).unwrap_or(u32::MAX)
    }

    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }

    /// Whether a master's series may produce occurrences in `[start, end]`.
    pub fn series_may_intersect(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time <= end && self.recurrence_end.is_none_or(|until| until >= start)
    }

    /// Reject rows whose end is not after their start.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidDate` naming the event.
    pub fn validate(&self) -> Result<()> {
        if self.end_time <= self.start_time {
            return Err(EngineError::InvalidDate(format!(
                "event {} ends at or before its start",
                self.id
            )));
        }
        Ok(())
    }
}

/// Working-hours configuration carried by a calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    /// Serialized as working-day indices (`Sunday = 0`).
    #[serde(with = "working_day_indices")]
    pub days: Vec<Weekday>,
    #[serde(default)]
    pub is_always_available: bool,
}

impl WorkingHours {
    /// Build from the raw calendar columns, falling back to `defaults` for
    /// anything missing or malformed.
    pub fn from_columns(
        start: Option<&str>,
        end: Option<&str>,
        days_json: Option<&str>,
        is_always_available: bool,
        defaults: &WorkingHours,
    ) -> Self {
        let time_or = |raw: Option<&str>, fallback: NaiveTime| {
            raw.map_or(fallback, |s| {
                parse_hhmm(s).unwrap_or_else(|err| {
                    warn!(%err, "falling back to default working hours");
                    fallback
                })
            })
        };
        Self {
            start: time_or(start, defaults.start),
            end: time_or(end, defaults.end),
            days: days_json.map_or_else(|| defaults.days.clone(), parse_working_days),
            is_always_available,
        }
    }

    pub fn is_working_day(&self, day: Weekday) -> bool {
        self.is_always_available || self.days.contains(&day)
    }
}

impl Default for WorkingHours {
    /// Monday to Friday, 09:00 to 17:00.
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            days: weekday::WEEK[..5].to_vec(),
            is_always_available: false,
        }
    }
}

/// Parse `"HH:mm"` (seconds, if present, are accepted).
///
/// # Errors
/// Returns `EngineError::InvalidTime` for anything else.
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| EngineError::InvalidTime(raw.to_string()))
}

/// Parse the JSON working-days column (`[1,2,3,4,5]`, Sunday = 0). Anything
/// unparseable yields Monday to Friday; out-of-range entries are dropped.
pub fn parse_working_days(raw: &str) -> Vec<Weekday> {
    match serde_json::from_str::<Vec<u8>>(raw) {
        Ok(indices) => {
            let mut days: Vec<Weekday> = indices
                .into_iter()
                .filter_map(weekday::from_working_day_index)
                .collect();
            weekday::normalize(&mut days);
            days
        }
        Err(err) => {
            warn!(%err, raw, "malformed working days, using Monday to Friday");
            WorkingHours::default().days
        }
    }
}

/// Parse the JSON durations column (`[15,30,60]`). Anything unparseable yields
/// `[30]`; zero durations are dropped.
pub fn parse_durations(raw: &str) -> Vec<u32> {
    match serde_json::from_str::<Vec<u32>>(raw) {
        Ok(durations) => durations.into_iter().filter(|d| *d > 0).collect(),
        Err(err) => {
            warn!(%err, raw, "malformed durations, using 30 minutes");
            vec![30]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "visible")]
    pub is_visible: bool,
    #[serde(default)]
    pub is_default: bool,
    pub working_hours: WorkingHours,
}

fn visible() -> bool {
    true
}

/// A public booking page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPage {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Allowed booking lengths in minutes.
    pub durations: Vec<u32>,
    #[serde(default)]
    pub buffer_minutes: u32,
    pub days_in_advance: u32,
    pub timezone: String,
    pub is_active: bool,
    /// Falls back to the owner's default calendar when unset.
    #[serde(default)]
    pub calendar_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingStatus {
    Confirmed,
}

/// A guest's confirmed slot. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub scheduling_page_id: Uuid,
    pub event_id: Uuid,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: u32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub user_id: Uuid,
    /// Floor applied on top of any page buffer.
    #[serde(default)]
    pub buffer_minutes: u32,
    /// Display only.
    #[serde(default)]
    pub secondary_timezone: Option<String>,
}

pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_hhmm(&raw).map_err(D::Error::custom)
    }
}

pub(crate) mod working_day_indices {
    use chrono::Weekday;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::weekday;

    pub fn serialize<S: Serializer>(days: &[Weekday], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(days.iter().map(|d| weekday::to_working_day_index(*d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Weekday>, D::Error> {
        let mut days = Vec::<u8>::deserialize(deserializer)?
            .into_iter()
            .map(|i| {
                weekday::from_working_day_index(i)
                    .ok_or_else(|| D::Error::custom(format!("working day {} out of range", i)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        weekday::normalize(&mut days);
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exdates_column_tolerates_blanks_and_garbage() {
        let ex = ExDates::from_column(" 2024-01-08, ,not-a-date,2024-01-01,");
        assert_eq!(ex.len(), 2);
        assert_eq!(ex.to_column(), "2024-01-01,2024-01-08");
        assert!(ExDates::from_column("").is_empty());
    }

    #[test]
    fn working_days_fall_back_to_weekdays() {
        assert_eq!(parse_working_days("{oops"), WorkingHours::default().days);
        assert_eq!(parse_working_days("[0,6]"), vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn durations_fall_back_to_thirty_minutes() {
        assert_eq!(parse_durations("nope"), vec![30]);
        assert_eq!(parse_durations("[15,0,60]"), vec![15, 60]);
    }

    #[test]
    fn working_hours_columns_fall_back_per_field() {
        let defaults = WorkingHours::default();
        let hours = WorkingHours::from_columns(Some("8:30"), Some("25:99"), None, false, &defaults);
        assert_eq!(hours.start, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(hours.end, defaults.end);
        assert_eq!(hours.days, defaults.days);
    }

    #[test]
    fn working_hours_serialize_with_sunday_zero_indices() {
        let json = serde_json::to_value(WorkingHours::default()).unwrap();
        assert_eq!(json["start"], "09:00");
        assert_eq!(json["days"], serde_json::json!([1, 2, 3, 4, 5]));
    }
}
