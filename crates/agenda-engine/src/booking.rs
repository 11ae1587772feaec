//! Public booking pages: page metadata, open slots, and booking creation.
//!
//! Each call recomputes availability from the store; nothing is cached across
//! requests. A booking re-runs the slot computation before committing, and the
//! store's uniqueness constraint catches the race between two guests that pass
//! that check at the same time.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability::{self, SchedulingConfig, SlotQuery, TimeSlot};
use crate::config::EngineDefaults;
use crate::expander::parse_timezone;
use crate::model::{Booking, BookingStatus, Calendar, Event, SchedulingPage};
use crate::store::{Store, StoreError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Unknown slug or deactivated page.
    #[error("Scheduling page not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    /// The slot was taken or fell out of availability; refetch and retry.
    #[error("This time slot is no longer available")]
    SlotUnavailable,

    /// The page has no linked calendar and its owner has none.
    #[error("No calendar found")]
    NoCalendar,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// HTTP status equivalent.
    pub fn status_code(&self) -> u16 {
        match self {
            BookingError::NotFound => 404,
            BookingError::Validation(_) | BookingError::NoCalendar => 400,
            BookingError::SlotUnavailable => 409,
            BookingError::Store(_) => 500,
        }
    }
}

pub type BookingResult<T> = std::result::Result<T, BookingError>;

/// What the booking page shows before a date is picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub durations: Vec<u32>,
    pub buffer_minutes: u32,
    pub days_in_advance: u32,
    pub timezone: String,
    pub calendar_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub guest_name: String,
    pub guest_email: String,
    #[serde(default)]
    pub guest_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub booking: Booking,
    pub event: Event,
}

/// Working hours, buffer and busy-calendar scope resolved for one page.
struct ResolvedPage {
    page: SchedulingPage,
    timezone: Tz,
    calendars: Vec<Calendar>,
    config: SchedulingConfig,
}

impl ResolvedPage {
    fn calendar_ids(&self) -> Vec<Uuid> {
        self.calendars.iter().map(|c| c.id).collect()
    }

    /// Linked calendar, else the owner's default, else any owned calendar.
    fn target_calendar(&self) -> Option<Uuid> {
        self.page.calendar_id.or_else(|| {
            self.calendars
                .iter()
                .find(|c| c.is_default)
                .or_else(|| self.calendars.first())
                .map(|c| c.id)
        })
    }
}

pub struct BookingService<S> {
    store: S,
    defaults: EngineDefaults,
}

impl<S: Store> BookingService<S> {
    pub fn new(store: S, defaults: EngineDefaults) -> Self {
        Self { store, defaults }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Metadata for an active page.
    ///
    /// # Errors
    /// `NotFound` for unknown or inactive pages.
    pub fn page_info(&self, slug: &str) -> BookingResult<PageInfo> {
        let resolved = self.resolve(slug)?;
        let calendar_name = resolved.page.calendar_id.and_then(|id| {
            resolved
                .calendars
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.name.clone())
        });
        let durations = self.durations(&resolved.page);
        let page = resolved.page;
        Ok(PageInfo {
            id: page.id,
            slug: page.slug,
            title: page.title,
            description: page.description,
            durations,
            buffer_minutes: page.buffer_minutes,
            days_in_advance: page.days_in_advance,
            timezone: page.timezone,
            calendar_name,
        })
    }

    /// Open slots on `date` (in the page's timezone) for `duration` minutes.
    /// Dates before today or beyond the page's booking horizon have none.
    ///
    /// # Errors
    /// `NotFound` for unknown or inactive pages, `Validation` for a duration
    /// the page does not offer.
    pub fn slots(&self, slug: &str, date: NaiveDate, duration: u32, now: DateTime<Utc>) -> BookingResult<Vec<TimeSlot>> {
        let resolved = self.resolve(slug)?;
        self.require_duration(&resolved.page, duration)?;
        self.open_slots(&resolved, date, duration, now)
    }

    /// Book `request` on the page at `slug`.
    ///
    /// # Errors
    /// `Validation` for bad guest details or durations, `NotFound` for unknown
    /// or inactive pages, `SlotUnavailable` when the start is no longer open
    /// (including losing a race to another booking), `NoCalendar` when there
    /// is nowhere to put the event.
    pub fn book(&self, slug: &str, request: &BookingRequest, now: DateTime<Utc>) -> BookingResult<Confirmation> {
        validate_guest(request)?;
        let resolved = self.resolve(slug)?;
        self.require_duration(&resolved.page, request.duration)?;

        let date = request.start_time.with_timezone(&resolved.timezone).date_naive();
        let open = self.open_slots(&resolved, date, request.duration, now)?;
        if !open.iter().any(|slot| slot.start_time == request.start_time) {
            warn!(slug, start = %request.start_time, "requested slot is not available");
            return Err(BookingError::SlotUnavailable);
        }

        let calendar_id = resolved.target_calendar().ok_or(BookingError::NoCalendar)?;
        let page = &resolved.page;
        let end_time = request.start_time + Duration::minutes(i64::from(request.duration));
        let message = request
            .guest_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let mut event = Event::new(
            calendar_id,
            format!("Meeting with {}", request.guest_name.trim()),
            request.start_time,
            end_time,
        );
        event.description = Some(
            message
                .clone()
                .unwrap_or_else(|| format!("Booked via {}", page.title)),
        );
        event.timezone = page.timezone.clone();

        let booking = Booking {
            id: Uuid::new_v4(),
            scheduling_page_id: page.id,
            event_id: event.id,
            guest_name: request.guest_name.trim().to_string(),
            guest_email: request.guest_email.trim().to_string(),
            guest_message: message,
            start_time: request.start_time,
            end_time,
            duration: request.duration,
            status: BookingStatus::Confirmed,
            created_at: now,
        };

        match self.store.commit_booking(event.clone(), booking.clone()) {
            Ok(()) => {}
            Err(StoreError::Duplicate { .. }) => {
                warn!(slug, start = %request.start_time, "lost booking race");
                return Err(BookingError::SlotUnavailable);
            }
            Err(err) => return Err(err.into()),
        }

        info!(slug, booking_id = %booking.id, event_id = %event.id, start = %booking.start_time, "booking confirmed");
        Ok(Confirmation { booking, event })
    }

    fn open_slots(
        &self,
        resolved: &ResolvedPage,
        date: NaiveDate,
        duration: u32,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<TimeSlot>> {
        let today = now.with_timezone(&resolved.timezone).date_naive();
        let horizon = today + Duration::days(i64::from(resolved.page.days_in_advance));
        if date < today || date > horizon {
            return Ok(Vec::new());
        }

        let calendar_ids = resolved.calendar_ids();
        let (day_start, day_end) = availability::day_bounds(date, resolved.timezone);
        let events = self.store.events_for_window(&calendar_ids, day_start, day_end)?;
        let query = SlotQuery {
            date,
            duration_minutes: duration,
            extra_buffer_minutes: 0,
            calendar_ids: Some(&calendar_ids),
            timezone: resolved.timezone,
            now,
        };
        Ok(availability::available_slots(&query, &resolved.config, &events))
    }

    fn resolve(&self, slug: &str) -> BookingResult<ResolvedPage> {
        let page = self
            .store
            .scheduling_page(slug)?
            .filter(|p| p.is_active)
            .ok_or(BookingError::NotFound)?;
        let calendars = self.store.calendars_for_owner(page.owner_id)?;
        let settings_buffer = self
            .store
            .user_settings(page.owner_id)?
            .map_or(0, |s| s.buffer_minutes);

        let linked = page
            .calendar_id
            .and_then(|id| calendars.iter().find(|c| c.id == id));
        let fallback = calendars
            .iter()
            .find(|c| c.is_default)
            .or_else(|| calendars.first());
        let working_hours = linked
            .or(fallback)
            .map_or_else(|| self.defaults.working_hours(), |c| c.working_hours.clone());

        let timezone = parse_timezone(&page.timezone).unwrap_or_else(|err| {
            warn!(slug, %err, fallback = %self.defaults.timezone, "page timezone unusable");
            parse_timezone(&self.defaults.timezone).unwrap_or(Tz::UTC)
        });

        Ok(ResolvedPage {
            config: SchedulingConfig {
                working_hours,
                buffer_minutes: settings_buffer.max(page.buffer_minutes),
            },
            page,
            timezone,
            calendars,
        })
    }

    fn durations(&self, page: &SchedulingPage) -> Vec<u32> {
        let offered: Vec<u32> = page.durations.iter().copied().filter(|d| *d > 0).collect();
        if offered.is_empty() {
            self.defaults.durations.clone()
        } else {
            offered
        }
    }

    fn require_duration(&self, page: &SchedulingPage, duration: u32) -> BookingResult<()> {
        if self.durations(page).contains(&duration) {
            Ok(())
        } else {
            Err(BookingError::Validation("Invalid duration".to_string()))
        }
    }
}

fn validate_guest(request: &BookingRequest) -> BookingResult<()> {
    if request.guest_name.trim().is_empty() {
        return Err(BookingError::Validation("Name is required".to_string()));
    }
    let email = request.guest_email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid_email {
        return Err(BookingError::Validation("Invalid email address".to_string()));
    }
    if request.duration == 0 {
        return Err(BookingError::Validation("Duration must be positive".to_string()));
    }
    Ok(())
}
