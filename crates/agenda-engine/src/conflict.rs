//! Detect occurrences that collide with a candidate time range.
//!
//! Adjacent events (where one ends exactly when another starts) are NOT
//! conflicts. All-day occurrences never conflict.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::materialize::Occurrence;

/// An occurrence that collides with the candidate range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub occurrence: Occurrence,
    /// Only the buffer zone around the occurrence is hit.
    pub is_buffer_conflict: bool,
    /// Directly overlaps a focus-time block.
    pub is_focus_conflict: bool,
}

/// Find occurrences overlapping `[candidate_start, candidate_end)`.
///
/// A direct overlap is reported with `is_buffer_conflict = false` and
/// `is_focus_conflict` set when the occurrence is focus time. Without a direct
/// overlap, and with a positive `buffer_minutes`, the occurrence is widened by
/// the buffer on both sides; an overlap then is a buffer conflict, never a
/// focus conflict. Occurrences whose event id equals `exclude_event_id` are
/// skipped, so an event being edited does not conflict with itself.
pub fn detect_conflicts(
    candidate_start: DateTime<Utc>,
    candidate_end: DateTime<Utc>,
    occurrences: &[Occurrence],
    exclude_event_id: Option<Uuid>,
    buffer_minutes: Option<u32>,
) -> Vec<Conflict> {
    let buffer = buffer_minutes.filter(|b| *b > 0).map(|b| Duration::minutes(i64::from(b)));
    let overlaps = |start: DateTime<Utc>, end: DateTime<Utc>| candidate_start < end && candidate_end > start;

    occurrences
        .iter()
        .filter(|o| Some(o.event.id) != exclude_event_id && !o.event.is_all_day)
        .filter_map(|o| {
            if overlaps(o.start(), o.end()) {
                return Some(Conflict {
                    occurrence: o.clone(),
                    is_buffer_conflict: false,
                    is_focus_conflict: o.event.is_focus_time,
                });
            }
            let pad = buffer?;
            overlaps(o.start() - pad, o.end() + pad).then(|| Conflict {
                occurrence: o.clone(),
                is_buffer_conflict: true,
                is_focus_conflict: false,
            })
        })
        .collect()
}

/// Just the conflicting occurrences, ignoring buffers.
pub fn conflicting_occurrences(
    candidate_start: DateTime<Utc>,
    candidate_end: DateTime<Utc>,
    occurrences: &[Occurrence],
    exclude_event_id: Option<Uuid>,
) -> Vec<Occurrence> {
    detect_conflicts(candidate_start, candidate_end, occurrences, exclude_event_id, None)
        .into_iter()
        .map(|c| c.occurrence)
        .collect()
}
