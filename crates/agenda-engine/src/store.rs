//! The persistence collaborator the booking service reads from and commits to,
//! plus an in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Booking, Calendar, Event, EventKind, SchedulingPage, UserSettings};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A booked event already occupies this start on the calendar.
    #[error("calendar {calendar_id} already has a booking starting at {start}")]
    Duplicate {
        calendar_id: Uuid,
        start: DateTime<Utc>,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read access to pages, calendars, settings and events, and the single write
/// the booking flow performs.
pub trait Store {
    fn scheduling_page(&self, slug: &str) -> StoreResult<Option<SchedulingPage>>;

    fn calendars_for_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Calendar>>;

    fn user_settings(&self, user_id: Uuid) -> StoreResult<Option<UserSettings>>;

    /// Every row on `calendar_ids` that can contribute an occurrence to
    /// `[start, end]`: regular events and exception rows overlapping it,
    /// masters whose series may intersect it, and all exception rows of those
    /// series.
    fn events_for_window(
        &self,
        calendar_ids: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>>;

    /// Insert a booked event and its booking atomically.
    ///
    /// Implementations must serialize concurrent commits and reject a second
    /// booked event with the same `(calendar_id, start_time)` with
    /// [`StoreError::Duplicate`]; re-checking availability alone cannot prevent
    /// two guests from taking the same slot.
    fn commit_booking(&self, event: Event, booking: Booking) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct Tables {
    pages: HashMap<String, SchedulingPage>,
    calendars: Vec<Calendar>,
    settings: HashMap<Uuid, UserSettings>,
    events: Vec<Event>,
    bookings: Vec<Booking>,
    booked_starts: HashSet<(Uuid, DateTime<Utc>)>,
}

/// A [`Store`] backed by in-process tables behind one lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_page(&self, page: SchedulingPage) -> StoreResult<()> {
        self.write(|t| {
            t.pages.insert(page.slug.clone(), page);
        })
    }

    pub fn insert_calendar(&self, calendar: Calendar) -> StoreResult<()> {
        self.write(|t| t.calendars.push(calendar))
    }

    pub fn insert_settings(&self, settings: UserSettings) -> StoreResult<()> {
        self.write(|t| {
            t.settings.insert(settings.user_id, settings);
        })
    }

    pub fn insert_event(&self, event: Event) -> StoreResult<()> {
        self.write(|t| t.events.push(event))
    }

    /// Record an existing booking. Its event must already be loaded for the
    /// booking to claim `(calendar_id, start_time)`; a second booking on the
    /// same start is rejected with [`StoreError::Duplicate`].
    pub fn insert_booking(&self, booking: Booking) -> StoreResult<()> {
        self.write(|t| {
            let key = t
                .events
                .iter()
                .find(|e| e.id == booking.event_id)
                .map(|e| (e.calendar_id, e.start_time));
            if let Some(key) = key {
                if !t.booked_starts.insert(key) {
                    return Err(StoreError::Duplicate {
                        calendar_id: key.0,
                        start: key.1,
                    });
                }
            }
            t.bookings.push(booking);
            Ok(())
        })?
    }

    /// Replace the row with the same id, inserting it if absent.
    pub fn upsert_event(&self, event: Event) -> StoreResult<()> {
        self.write(|t| match t.events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event,
            None => t.events.push(event),
        })
    }

    pub fn delete_events(&self, ids: &[Uuid]) -> StoreResult<()> {
        self.write(|t| t.events.retain(|e| !ids.contains(&e.id)))
    }

    pub fn events(&self) -> StoreResult<Vec<Event>> {
        self.read(|t| t.events.clone())
    }

    pub fn bookings(&self) -> StoreResult<Vec<Booking>> {
        self.read(|t| t.bookings.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> StoreResult<T> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(&mut tables))
    }
}

impl Store for InMemoryStore {
    fn scheduling_page(&self, slug: &str) -> StoreResult<Option<SchedulingPage>> {
        self.read(|t| t.pages.get(slug).cloned())
    }

    fn calendars_for_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Calendar>> {
        self.read(|t| {
            t.calendars
                .iter()
                .filter(|c| c.owner_id == owner_id)
                .cloned()
                .collect()
        })
    }

    fn user_settings(&self, user_id: Uuid) -> StoreResult<Option<UserSettings>> {
        self.read(|t| t.settings.get(&user_id).cloned())
    }

    fn events_for_window(
        &self,
        calendar_ids: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>> {
        self.read(|t| {
            let scoped: Vec<&Event> = t
                .events
                .iter()
                .filter(|e| calendar_ids.contains(&e.calendar_id))
                .collect();
            let series: HashSet<Uuid> = scoped
                .iter()
                .filter(|e| e.kind() == EventKind::Master && e.series_may_intersect(start, end))
                .filter_map(|e| e.series_id)
                .collect();
            scoped
                .into_iter()
                .filter(|e| match e.kind() {
                    EventKind::Regular => e.overlaps(start, end),
                    EventKind::Master => e.series_may_intersect(start, end),
                    EventKind::Exception => {
                        e.overlaps(start, end) || e.series_id.is_some_and(|s| series.contains(&s))
                    }
                })
                .cloned()
                .collect()
        })
    }

    fn commit_booking(&self, event: Event, booking: Booking) -> StoreResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let key = (event.calendar_id, event.start_time);
        if !tables.booked_starts.insert(key) {
            return Err(StoreError::Duplicate {
                calendar_id: key.0,
                start: key.1,
            });
        }
        tables.events.push(event);
        tables.bookings.push(booking);
        Ok(())
    }
}
