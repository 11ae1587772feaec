//! WASM bindings for agenda-engine.
//!
//! Exposes the recurrence rule codec, rule expansion, occurrence
//! materialization, and conflict detection to JavaScript via `wasm-bindgen`.
//! All complex types are passed as JSON strings using the engine's camelCase
//! serde shapes, so an `Event` produced by the web client deserializes as is.
//!
//! ## Build process
//!
//! ```sh
//! cargo build -p agenda-engine-wasm --target wasm32-unknown-unknown --release
//! wasm-bindgen --target web --out-dir packages/agenda-engine-js/wasm/ \
//!   target/wasm32-unknown-unknown/release/agenda_engine_wasm.wasm
//! ```

use agenda_engine::conflict::detect_conflicts;
use agenda_engine::dst::DstPolicy;
use agenda_engine::expander::{expand_in, parse_timezone};
use agenda_engine::materialize::EventRows;
use agenda_engine::model::Event;
use agenda_engine::rule::{self, Preset, RecurrenceConfig};
use agenda_engine::weekday;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use wasm_bindgen::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Parse an ISO 8601 datetime string into `DateTime<Utc>`.
///
/// Accepts RFC 3339 with an offset, or a naive datetime read as UTC.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, JsValue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| JsValue::from_str(&format!("Invalid datetime '{}': {}", s, e)))
}

fn parse_events_json(json: &str) -> Result<Vec<Event>, JsValue> {
    serde_json::from_str(json).map_err(|e| JsValue::from_str(&format!("Invalid events JSON: {}", e)))
}

fn parse_policy(policy: Option<&str>) -> Result<DstPolicy, JsValue> {
    match policy.map(str::to_ascii_lowercase).as_deref() {
        None | Some("wallclock") | Some("wall-clock") => Ok(DstPolicy::WallClock),
        Some("skip") => Ok(DstPolicy::Skip),
        Some("shiftforward") | Some("shift-forward") => Ok(DstPolicy::ShiftForward),
        Some(other) => Err(JsValue::from_str(&format!("Unknown DST policy '{}'", other))),
    }
}

// ---------------------------------------------------------------------------
// Rule codec
// ---------------------------------------------------------------------------

/// Encode a recurrence form config (JSON) into an RRULE body.
///
/// The config uses the form's shape:
/// `{"frequency":"weekly","interval":1,"byWeekday":[0,2],"byMonthDay":[],"end":{"type":"never"}}`.
#[wasm_bindgen(js_name = "encodeRule")]
pub fn encode_rule(config_json: &str) -> Result<String, JsValue> {
    let config: RecurrenceConfig = serde_json::from_str(config_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid recurrence config: {}", e)))?;
    Ok(rule::encode(&config))
}

/// Decode an RRULE string into the form config, returned as JSON.
#[wasm_bindgen(js_name = "decodeRule")]
pub fn decode_rule(rrule: &str) -> Result<String, JsValue> {
    let config = rule::decode(rrule).map_err(js_error)?;
    to_json(&config)
}

/// English description of a rule. Never fails.
#[wasm_bindgen(js_name = "describeRule")]
pub fn describe_rule(rrule: &str) -> String {
    rule::describe(rrule)
}

/// Rule string for a repeat-dropdown preset, or `undefined` for "none".
///
/// `day_index` is the picker index (`Monday = 0`) of the event being edited.
#[wasm_bindgen(js_name = "presetRule")]
pub fn preset_rule(preset: &str, day_index: Option<u8>) -> Result<Option<String>, JsValue> {
    let preset: Preset = preset.parse().map_err(js_error)?;
    let day = day_index.and_then(weekday::from_picker_index);
    Ok(rule::preset_rule(preset, day))
}

// ---------------------------------------------------------------------------
// Expansion and conflicts
// ---------------------------------------------------------------------------

/// Expand a rule anchored at `start` into `{start, end}` instances within
/// `[from, to]`.
///
/// # Arguments
/// - `rrule` -- RRULE body (e.g., "FREQ=WEEKLY;BYDAY=TU,TH")
/// - `start` -- anchor instant, also the first occurrence
/// - `duration_minutes` -- length of each instance
/// - `from`, `to` -- inclusive expansion window
/// - `timezone` -- IANA zone whose wall clock the series follows; UTC if absent
/// - `policy` -- `"wallClock"` (default), `"skip"` or `"shiftForward"`
#[wasm_bindgen(js_name = "expandRule")]
pub fn expand_rule(
    rrule: &str,
    start: &str,
    duration_minutes: u32,
    from: &str,
    to: &str,
    timezone: Option<String>,
    policy: Option<String>,
) -> Result<String, JsValue> {
    let anchor = parse_datetime(start)?;
    let window_start = parse_datetime(from)?;
    let window_end = parse_datetime(to)?;
    let tz = parse_timezone(timezone.as_deref().unwrap_or("UTC")).map_err(js_error)?;
    let policy = parse_policy(policy.as_deref())?;

    let events = expand_in(rrule, anchor, duration_minutes, window_start, window_end, tz, policy)
        .map_err(js_error)?;
    to_json(&events)
}

/// Materialize event rows (JSON array of events) into the occurrences visible
/// in `[from, to]`, sorted by start.
#[wasm_bindgen(js_name = "materializeEvents")]
pub fn materialize_events(events_json: &str, from: &str, to: &str) -> Result<String, JsValue> {
    let rows = EventRows::partition(parse_events_json(events_json)?);
    let occurrences = rows.materialize(parse_datetime(from)?, parse_datetime(to)?);
    to_json(&occurrences)
}

/// Conflicts between a candidate range and the calendar's events.
///
/// `events_json` holds raw event rows; series are expanded around the
/// candidate (widened by the buffer) before checking. Returns a JSON array of
/// `{occurrence, isBufferConflict, isFocusConflict}`.
#[wasm_bindgen(js_name = "detectConflicts")]
pub fn detect_conflicts_json(
    events_json: &str,
    start: &str,
    end: &str,
    exclude_event_id: Option<String>,
    buffer_minutes: Option<u32>,
) -> Result<String, JsValue> {
    let candidate_start = parse_datetime(start)?;
    let candidate_end = parse_datetime(end)?;
    let exclude = exclude_event_id
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|e| JsValue::from_str(&format!("Invalid event id: {}", e)))?;

    let pad = chrono::Duration::minutes(i64::from(buffer_minutes.unwrap_or(0)));
    let rows = EventRows::partition(parse_events_json(events_json)?);
    let occurrences = rows.materialize(candidate_start - pad, candidate_end + pad);

    let conflicts = detect_conflicts(candidate_start, candidate_end, &occurrences, exclude, buffer_minutes);
    to_json(&conflicts)
}
