//! Merge expanded series with exclusions and exception rows into the final
//! occurrence list of a calendar view.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::expander;
use crate::model::{date_key, Event, EventKind};

/// One concrete occurrence as shown in a calendar view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Content and effective times. For virtual occurrences this is the
    /// master with its start/end moved to the expanded slot.
    #[serde(flatten)]
    pub event: Event,
    /// Start of the slot this occurrence fills in its series (the event's own
    /// start for regular events).
    pub occurrence_date: DateTime<Utc>,
    /// `true` when no row backs this occurrence.
    pub is_virtual: bool,
    pub master_event_id: Option<Uuid>,
}

impl Occurrence {
    pub fn start(&self) -> DateTime<Utc> {
        self.event.start_time
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.event.end_time
    }
}

/// Event rows split by role.
#[derive(Debug, Clone, Default)]
pub struct EventRows {
    pub masters: Vec<Event>,
    pub regular: Vec<Event>,
    pub exceptions: Vec<Event>,
}

impl EventRows {
    pub fn partition(events: impl IntoIterator<Item = Event>) -> Self {
        let mut rows = Self::default();
        for event in events {
            match event.kind() {
                EventKind::Master => rows.masters.push(event),
                EventKind::Regular => rows.regular.push(event),
                EventKind::Exception => rows.exceptions.push(event),
            }
        }
        rows
    }

    pub fn materialize(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Vec<Occurrence> {
        materialize(
            &self.masters,
            &self.regular,
            &self.exceptions,
            window_start,
            window_end,
        )
    }
}

/// Build the ordered occurrence list for `[window_start, window_end]`.
///
/// - regular events overlapping the window pass through unchanged;
/// - each master is expanded over the window and clipped to its
///   `recurrence_end`;
/// - occurrences whose date-key is in the master's exDates are dropped;
/// - an exception row with the same series id and original date-key replaces
///   the occurrence, keeping its own times and content;
/// - everything else becomes a virtual copy of the master.
///
/// The result is sorted by effective start; equal starts keep input order.
/// Masters with a missing or malformed rule are logged and skipped.
pub fn materialize(
    masters: &[Event],
    regular: &[Event],
    exceptions: &[Event],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Occurrence> {
    let mut occurrences: Vec<Occurrence> = regular
        .iter()
        .filter(|e| e.kind() == EventKind::Regular && e.overlaps(window_start, window_end))
        .map(|e| Occurrence {
            event: e.clone(),
            occurrence_date: e.start_time,
            is_virtual: false,
            master_event_id: None,
        })
        .collect();

    let by_original: HashMap<(Uuid, NaiveDate), &Event> = exceptions
        .iter()
        .filter_map(|ex| Some(((ex.series_id?, date_key(ex.original_date?)), ex)))
        .collect();

    for master in masters {
        if master.kind() != EventKind::Master || !master.series_may_intersect(window_start, window_end) {
            continue;
        }
        let Some(rule) = master.rrule.as_deref() else {
            warn!(event_id = %master.id, "recurring event has no rule");
            continue;
        };
        let expanded = match expander::expand(
            rule,
            master.start_time,
            master.duration_minutes(),
            window_start,
            window_end,
        ) {
            Ok(expanded) => expanded,
            Err(err) => {
                warn!(event_id = %master.id, %err, "skipping series with malformed rule");
                continue;
            }
        };

        for slot in expanded {
            if master.recurrence_end.is_some_and(|until| slot.start > until) {
                break;
            }
            let key = date_key(slot.start);
            if master.ex_dates.contains(key) {
                continue;
            }
            let exception = master
                .series_id
                .and_then(|series| by_original.get(&(series, key)));
            let occurrence = match exception {
                Some(ex) => Occurrence {
                    event: (*ex).clone(),
                    occurrence_date: slot.start,
                    is_virtual: false,
                    master_event_id: Some(master.id),
                },
                None => {
                    let mut event = master.clone();
                    event.start_time = slot.start;
                    event.end_time = slot.end;
                    Occurrence {
                        event,
                        occurrence_date: slot.start,
                        is_virtual: true,
                        master_event_id: Some(master.id),
                    }
                }
            };
            occurrences.push(occurrence);
        }
    }

    occurrences.sort_by_key(Occurrence::start);
    debug!(count = occurrences.len(), "materialized occurrences");
    occurrences
}
