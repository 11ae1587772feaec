//! Edits and deletions scoped to a recurring series.
//!
//! Every function is pure: it takes the current rows and returns the rows to
//! write (and ids to delete). Persisting them, ideally in one transaction, is
//! the store's job.
//!
//! | scope    | edit                 | delete               |
//! |----------|----------------------|----------------------|
//! | single   | [`edit_occurrence`]  | [`delete_occurrence`]|
//! | future   | [`split_series`]     | [`delete_following`] |
//! | all      | [`update_series`]    | [`delete_series`]    |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::{date_key, Event, EventKind, ExDates, Participant};
use crate::reminder::Reminder;
use crate::rule::RecurrenceRule;

/// Which part of a series an edit or deletion applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecurrenceScope {
    Single,
    Future,
    All,
}

/// Field changes requested by an edit. `None` leaves a field untouched; for
/// nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPatch {
    pub title: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_all_day: Option<bool>,
    pub timezone: Option<String>,
    pub calendar_id: Option<Uuid>,
    pub is_recurring: Option<bool>,
    #[serde(deserialize_with = "nullable")]
    pub rrule: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub recurrence_end: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
    pub reminders: Option<Vec<Reminder>>,
    pub is_focus_time: Option<bool>,
    pub participants: Option<Vec<Participant>>,
}

/// Distinguish an explicit `null` (clear) from an absent field (keep).
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl EventPatch {
    /// Apply the descriptive fields (everything except times and recurrence).
    fn apply_content(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(location) = &self.location {
            event.location = location.clone();
        }
        if let Some(is_all_day) = self.is_all_day {
            event.is_all_day = is_all_day;
        }
        if let Some(timezone) = &self.timezone {
            event.timezone = timezone.clone();
        }
        if let Some(calendar_id) = self.calendar_id {
            event.calendar_id = calendar_id;
        }
        if let Some(tags) = &self.tags {
            event.tags = tags.clone();
        }
        if let Some(reminders) = &self.reminders {
            event.reminders = reminders.clone();
        }
        if let Some(is_focus_time) = self.is_focus_time {
            event.is_focus_time = is_focus_time;
        }
        if let Some(participants) = &self.participants {
            event.participants = participants.clone();
        }
    }

    /// Times for a row replacing the slot at `slot_start`: patched values win,
    /// otherwise the slot start and the master's duration.
    fn times_for(&self, slot_start: DateTime<Utc>, master: &Event) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start_time.unwrap_or(slot_start);
        let end = self
            .end_time
            .unwrap_or_else(|| start + (master.end_time - master.start_time));
        (start, end)
    }
}

/// Result of a "this and following" edit.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSplit {
    /// The old master, now ending just before the split point.
    pub previous: Event,
    /// The new master covering the split point onwards.
    pub next: Event,
}

/// Result of a single or "this and following" deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesDeletion {
    /// The updated master.
    pub master: Event,
    /// Exception rows that no longer belong to any occurrence.
    pub removed_exceptions: Vec<Uuid>,
}

/// Prepare a new recurring master: validates the rule and assigns a fresh
/// series id.
///
/// # Errors
/// `InvalidRule` when the rule is missing or malformed, `InvalidDate` when the
/// event ends before it starts.
pub fn new_series(mut event: Event) -> Result<Event> {
    let rule = event
        .rrule
        .as_deref()
        .ok_or_else(|| EngineError::InvalidRule("recurring event requires a rule".to_string()))?;
    rule.parse::<RecurrenceRule>()?;
    event.validate()?;
    event.is_recurring = true;
    event.is_exception = false;
    event.original_date = None;
    event.series_id = Some(Uuid::new_v4());
    Ok(event)
}

/// Apply a patch to a whole event or series. A plain event that becomes
/// recurring gets a series id.
///
/// # Errors
/// `InvalidRule` for a malformed rule on a recurring result, `InvalidDate` when
/// the result ends before it starts.
pub fn update_series(event: &Event, patch: &EventPatch) -> Result<Event> {
    let mut updated = event.clone();
    patch.apply_content(&mut updated);
    if let Some(start) = patch.start_time {
        updated.start_time = start;
    }
    if let Some(end) = patch.end_time {
        updated.end_time = end;
    }
    if let Some(rrule) = &patch.rrule {
        updated.rrule = rrule.clone();
    }
    if let Some(recurrence_end) = patch.recurrence_end {
        updated.recurrence_end = recurrence_end;
    }
    if let Some(is_recurring) = patch.is_recurring {
        updated.is_recurring = is_recurring;
    }
    if updated.is_recurring && !updated.is_exception {
        let rule = updated
            .rrule
            .as_deref()
            .ok_or_else(|| EngineError::InvalidRule("recurring event requires a rule".to_string()))?;
        rule.parse::<RecurrenceRule>()?;
        if updated.series_id.is_none() {
            updated.series_id = Some(Uuid::new_v4());
        }
    }
    updated.validate()?;
    Ok(updated)
}

/// Build the exception row that replaces the occurrence starting at
/// `occurrence_start` ("edit this occurrence").
///
/// # Errors
/// `NotRecurring` when `master` is not a series master, `InvalidDate` when the
/// patched occurrence ends before it starts.
pub fn edit_occurrence(master: &Event, occurrence_start: DateTime<Utc>, patch: &EventPatch) -> Result<Event> {
    require_master(master)?;
    let (start, end) = patch.times_for(occurrence_start, master);

    let mut exception = master.clone();
    patch.apply_content(&mut exception);
    exception.id = Uuid::new_v4();
    exception.start_time = start;
    exception.end_time = end;
    exception.is_recurring = false;
    exception.rrule = None;
    exception.recurrence_end = None;
    exception.ex_dates = ExDates::new();
    exception.is_exception = true;
    exception.original_date = Some(occurrence_start);
    exception.validate()?;

    debug!(master = %master.id, date = %date_key(occurrence_start), "created exception");
    Ok(exception)
}

/// Split a series at `occurrence_start` ("edit this and following").
///
/// The old master ends 1ms before the split point. The new master starts at
/// the patched start (or the split point), takes a fresh series id and
/// inherits the old series end. Exceptions and exclusions stay with the old
/// series.
///
/// # Errors
/// `NotRecurring` when `master` is not a series master; `InvalidRule` or
/// `InvalidDate` for an invalid new master.
pub fn split_series(master: &Event, occurrence_start: DateTime<Utc>, patch: &EventPatch) -> Result<SeriesSplit> {
    require_master(master)?;
    let (start, end) = patch.times_for(occurrence_start, master);

    let mut previous = master.clone();
    previous.recurrence_end = Some(occurrence_start - Duration::milliseconds(1));

    let mut next = master.clone();
    patch.apply_content(&mut next);
    next.id = Uuid::new_v4();
    next.start_time = start;
    next.end_time = end;
    next.ex_dates = ExDates::new();
    if let Some(rrule) = &patch.rrule {
        next.rrule = rrule.clone();
    }
    if let Some(recurrence_end) = patch.recurrence_end {
        next.recurrence_end = recurrence_end;
    }
    let next = if next.rrule.is_some() {
        new_series(next)?
    } else {
        next.is_recurring = false;
        next.series_id = None;
        next.recurrence_end = None;
        next.validate()?;
        next
    };

    debug!(previous = %previous.id, next = %next.id, "split series");
    Ok(SeriesSplit { previous, next })
}

/// Remove the single occurrence starting at `occurrence_start`: its date-key
/// joins the master's exclusions and any exception row for that date goes.
///
/// # Errors
/// `NotRecurring` when `master` is not a series master.
pub fn delete_occurrence(master: &Event, occurrence_start: DateTime<Utc>, exceptions: &[Event]) -> Result<SeriesDeletion> {
    require_master(master)?;
    let key = date_key(occurrence_start);

    let mut updated = master.clone();
    updated.ex_dates.insert(key);

    let removed_exceptions = series_exceptions(master, exceptions)
        .filter(|ex| ex.original_date.map(date_key) == Some(key))
        .map(|ex| ex.id)
        .collect();

    Ok(SeriesDeletion {
        master: updated,
        removed_exceptions,
    })
}

/// Remove the occurrence starting at `occurrence_start` and everything after
/// it: the series is truncated 1ms before and later exceptions go.
///
/// # Errors
/// `NotRecurring` when `master` is not a series master.
pub fn delete_following(master: &Event, occurrence_start: DateTime<Utc>, exceptions: &[Event]) -> Result<SeriesDeletion> {
    require_master(master)?;

    let mut updated = master.clone();
    updated.recurrence_end = Some(occurrence_start - Duration::milliseconds(1));

    let removed_exceptions = series_exceptions(master, exceptions)
        .filter(|ex| ex.original_date.is_some_and(|d| d >= occurrence_start))
        .map(|ex| ex.id)
        .collect();

    Ok(SeriesDeletion {
        master: updated,
        removed_exceptions,
    })
}

/// Ids to delete when removing an event and, for a master, its exceptions.
pub fn delete_series(event: &Event, exceptions: &[Event]) -> Vec<Uuid> {
    let mut ids = vec![event.id];
    if event.kind() == EventKind::Master {
        ids.extend(series_exceptions(event, exceptions).map(|ex| ex.id));
    }
    ids
}

fn series_exceptions<'a>(master: &'a Event, exceptions: &'a [Event]) -> impl Iterator<Item = &'a Event> + 'a {
    exceptions.iter().filter(move |ex| {
        ex.kind() == EventKind::Exception && ex.series_id.is_some() && ex.series_id == master.series_id
    })
}

fn require_master(event: &Event) -> Result<()> {
    if event.kind() == EventKind::Master && event.series_id.is_some() {
        Ok(())
    } else {
        Err(EngineError::NotRecurring(event.id))
    }
}
