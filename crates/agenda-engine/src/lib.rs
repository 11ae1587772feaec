//! # agenda-engine
//!
//! Recurrence, availability and booking logic for a personal calendar.
//!
//! Recurring events are stored once, as a master row carrying an RRULE, plus
//! optional exception rows that override single occurrences. Everything that
//! turns those rows into concrete time ranges lives here: the rule codec, a
//! self-contained RRULE expander, the materializer that folds in exclusions and
//! exceptions, conflict detection, open-slot computation and the public
//! booking flow.
//!
//! ## Modules
//!
//! - [`rule`]: RRULE parsing/formatting, the picker config codec, presets and
//!   human-readable descriptions
//! - [`expander`]: RRULE + anchor → concrete occurrences within a window
//! - [`dst`]: how wall-clock times that fall in DST transitions resolve
//! - [`materialize`]: series + exDates + exception rows → occurrence list
//! - [`conflict`]: overlap and buffer-zone conflicts for a candidate range
//! - [`busy`]: merged busy intervals
//! - [`availability`]: bookable slots for one day
//! - [`series`]: edit/delete scoped to one, following, or all occurrences
//! - [`reminder`]: reminder fire times
//! - [`booking`]: public scheduling pages over a [`store::Store`]
//! - [`model`]: persisted rows and their column codecs
//! - [`weekday`]: conversions between the weekday index conventions
//! - [`config`]: engine-wide defaults
//! - [`error`]: error types

pub mod availability;
pub mod booking;
pub mod busy;
pub mod config;
pub mod conflict;
pub mod dst;
pub mod error;
pub mod expander;
pub mod materialize;
pub mod model;
pub mod reminder;
pub mod rule;
pub mod series;
pub mod store;
pub mod weekday;

pub use availability::{available_slots, SchedulingConfig, SlotQuery, TimeSlot};
pub use booking::{BookingError, BookingRequest, BookingService, Confirmation, PageInfo};
pub use config::EngineDefaults;
pub use conflict::{conflicting_occurrences, detect_conflicts, Conflict};
pub use dst::DstPolicy;
pub use error::EngineError;
pub use expander::{expand, expand_in, ExpandedEvent};
pub use materialize::{materialize, Occurrence};
pub use model::{Booking, Calendar, Event, SchedulingPage, UserSettings, WorkingHours};
pub use rule::{decode, describe, encode, preset_rule, RecurrenceConfig, RecurrenceRule};
pub use store::{InMemoryStore, Store, StoreError};
