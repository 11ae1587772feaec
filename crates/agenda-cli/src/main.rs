//! `agenda` CLI: expand recurrence rules, compute open slots and check
//! conflicts against a JSON export of events.
//!
//! ## Usage
//!
//! ```sh
//! # Occurrences of a rule inside a window
//! agenda expand --rule "FREQ=WEEKLY;BYDAY=MO" --start 2024-01-01T09:00:00Z \
//!     --duration 60 --from 2024-01-01T00:00:00Z --to 2024-01-31T23:59:59Z
//!
//! # Same, repeating 09:00 local time in Los Angeles
//! agenda expand --rule "FREQ=DAILY;COUNT=5" --start 2026-03-07T17:00:00Z \
//!     --duration 30 --from 2026-03-01T00:00:00Z --to 2026-03-31T00:00:00Z \
//!     --tz America/Los_Angeles
//!
//! # Human-readable text for a rule
//! agenda describe "FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TH;COUNT=10"
//!
//! # Open 30-minute slots on a day
//! agenda slots --events events.json --date 2030-01-07 --duration 30 --buffer 15
//!
//! # What collides with a proposed meeting
//! agenda conflicts --events events.json --start 2030-01-07T10:00:00Z --end 2030-01-07T11:00:00Z
//!
//! # Book a slot on a scheduling page stored in a state file
//! agenda book --state state.json --slug intro --name Ada --email ada@example.com \
//!     --start 2030-01-07T10:00:00Z --duration 30
//! ```
//!
//! Output is JSON on stdout. Diagnostics go to stderr, filtered by `RUST_LOG`
//! (default `warn`).

use std::path::{Path, PathBuf};

use agenda_engine::availability::{available_slots, SchedulingConfig, SlotQuery};
use agenda_engine::booking::{BookingRequest, BookingService};
use agenda_engine::conflict::detect_conflicts;
use agenda_engine::config::EngineDefaults;
use agenda_engine::dst::DstPolicy;
use agenda_engine::expander::{expand_in, parse_timezone};
use agenda_engine::materialize::EventRows;
use agenda_engine::model::{parse_hhmm, parse_working_days, Booking, Calendar, Event, SchedulingPage, UserSettings};
use agenda_engine::rule::describe;
use agenda_engine::store::InMemoryStore;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "agenda", version, about = "Recurrence, availability and booking tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file overriding the built-in defaults (working hours, durations, timezone)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a recurrence rule into concrete occurrences
    Expand {
        /// Rule string, e.g. "FREQ=WEEKLY;BYDAY=MO"
        #[arg(long)]
        rule: String,
        /// Start of the first occurrence (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
        /// Occurrence length in minutes
        #[arg(long)]
        duration: u32,
        /// Window start (RFC 3339, inclusive)
        #[arg(long)]
        from: DateTime<Utc>,
        /// Window end (RFC 3339, inclusive)
        #[arg(long)]
        to: DateTime<Utc>,
        /// Repeat the start's wall-clock time in this IANA timezone
        #[arg(long, default_value = "UTC")]
        tz: String,
        /// What to do with local times inside a DST gap
        #[arg(long, value_enum, default_value_t = Policy::WallClock)]
        policy: Policy,
    },
    /// Describe a recurrence rule in English
    Describe {
        /// Rule string
        rule: String,
    },
    /// List open booking slots on a day
    Slots {
        /// JSON array of events
        #[arg(long)]
        events: PathBuf,
        /// Day in --tz (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Slot length in minutes
        #[arg(long)]
        duration: u32,
        /// Padding around busy events in minutes
        #[arg(long, default_value_t = 0)]
        buffer: u32,
        /// Timezone working hours are read in (defaults to the configured timezone)
        #[arg(long)]
        tz: Option<String>,
        /// Working hours as HH:MM-HH:MM
        #[arg(long)]
        hours: Option<String>,
        /// Working days as Sunday=0 indices, e.g. 1,2,3,4,5
        #[arg(long)]
        days: Option<String>,
        /// Ignore working hours and days
        #[arg(long)]
        always: bool,
        /// Only count events on these calendars (comma-separated ids)
        #[arg(long)]
        calendars: Option<String>,
        /// Treat this instant as the current time (RFC 3339)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Find events that collide with a proposed time range
    Conflicts {
        /// JSON array of events
        #[arg(long)]
        events: PathBuf,
        /// Proposed start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
        /// Proposed end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,
        /// Event id to ignore (the event being edited)
        #[arg(long)]
        exclude: Option<Uuid>,
        /// Also report events within this many minutes
        #[arg(long)]
        buffer: Option<u32>,
    },
    /// Book a slot on a scheduling page and print the confirmation
    Book {
        /// JSON state file with pages, calendars, settings and events
        #[arg(long)]
        state: PathBuf,
        /// Scheduling page slug
        #[arg(long)]
        slug: String,
        /// Guest name
        #[arg(long)]
        name: String,
        /// Guest email
        #[arg(long)]
        email: String,
        /// Optional note for the host
        #[arg(long)]
        message: Option<String>,
        /// Slot start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
        /// Slot length in minutes
        #[arg(long)]
        duration: u32,
        /// Treat this instant as the current time (RFC 3339)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        /// Write the updated state back to the file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    Skip,
    ShiftForward,
    WallClock,
}

impl From<Policy> for DstPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Skip => DstPolicy::Skip,
            Policy::ShiftForward => DstPolicy::ShiftForward,
            Policy::WallClock => DstPolicy::WallClock,
        }
    }
}

/// Everything the booking flow reads, as one JSON document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct State {
    pages: Vec<SchedulingPage>,
    calendars: Vec<Calendar>,
    settings: Vec<UserSettings>,
    events: Vec<Event>,
    bookings: Vec<Booking>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let defaults = load_defaults(cli.config.as_deref())?;

    match cli.command {
        Commands::Expand {
            rule,
            start,
            duration,
            from,
            to,
            tz,
            policy,
        } => {
            let tz = parse_timezone(&tz)?;
            let events = expand_in(&rule, start, duration, from, to, tz, policy.into())
                .with_context(|| format!("Failed to expand rule: {}", rule))?;
            print_json(&events)?;
        }
        Commands::Describe { rule } => {
            println!("{}", describe(&rule));
        }
        Commands::Slots {
            events,
            date,
            duration,
            buffer,
            tz,
            hours,
            days,
            always,
            calendars,
            now,
        } => {
            let events = read_events(&events)?;
            let timezone = parse_timezone(tz.as_deref().unwrap_or(&defaults.timezone))?;
            let mut working_hours = defaults.working_hours();
            if let Some(hours) = hours {
                let (start, end) = parse_hours(&hours)?;
                working_hours.start = start;
                working_hours.end = end;
            }
            if let Some(days) = days {
                working_hours.days = parse_working_days(&format!("[{}]", days));
            }
            working_hours.is_always_available = always;

            let calendar_ids = calendars.as_deref().map(parse_ids).transpose()?;
            let query = SlotQuery {
                date,
                duration_minutes: duration,
                extra_buffer_minutes: 0,
                calendar_ids: calendar_ids.as_deref(),
                timezone,
                now: now.unwrap_or_else(Utc::now),
            };
            let config = SchedulingConfig {
                working_hours,
                buffer_minutes: buffer,
            };
            let slots = available_slots(&query, &config, &events);
            debug!(%date, slots = slots.len(), "slots computed");
            print_json(&slots)?;
        }
        Commands::Conflicts {
            events,
            start,
            end,
            exclude,
            buffer,
        } => {
            if end <= start {
                bail!("--end must be after --start");
            }
            let events = read_events(&events)?;
            let pad = Duration::minutes(i64::from(buffer.unwrap_or(0)));
            let occurrences = EventRows::partition(events).materialize(start - pad, end + pad);
            let conflicts = detect_conflicts(start, end, &occurrences, exclude, buffer);
            print_json(&conflicts)?;
        }
        Commands::Book {
            state,
            slug,
            name,
            email,
            message,
            start,
            duration,
            now,
            save,
        } => {
            let (store, page_count) = load_state(&state)?;
            debug!(pages = page_count, "state loaded");
            let service = BookingService::new(store, defaults);
            let request = BookingRequest {
                guest_name: name,
                guest_email: email,
                guest_message: message,
                start_time: start,
                duration,
            };
            let confirmation = service
                .book(&slug, &request, now.unwrap_or_else(Utc::now))
                .with_context(|| format!("Booking on '{}' failed", slug))?;
            if save {
                save_state(&state, service.store())?;
            }
            print_json(&confirmation)?;
        }
    }

    Ok(())
}

fn load_defaults(path: Option<&Path>) -> Result<EngineDefaults> {
    let Some(path) = path else {
        return Ok(EngineDefaults::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config: {}", path.display()))
}

fn read_events(path: &Path) -> Result<Vec<Event>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read events: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid events JSON: {}", path.display()))
}

fn load_state(path: &Path) -> Result<(InMemoryStore, usize)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state: {}", path.display()))?;
    let state: State =
        serde_json::from_str(&raw).with_context(|| format!("Invalid state JSON: {}", path.display()))?;

    let store = InMemoryStore::new();
    let page_count = state.pages.len();
    for page in state.pages {
        store.insert_page(page)?;
    }
    for calendar in state.calendars {
        store.insert_calendar(calendar)?;
    }
    for settings in state.settings {
        store.insert_settings(settings)?;
    }
    for event in state.events {
        store.insert_event(event)?;
    }
    for booking in state.bookings {
        store.insert_booking(booking)?;
    }
    Ok((store, page_count))
}

/// Write the store's events and bookings back to the state file.
fn save_state(path: &Path, store: &InMemoryStore) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state: {}", path.display()))?;
    let mut state: State = serde_json::from_str(&raw)?;
    state.events = store.events()?;
    state.bookings = store.bookings()?;
    let json = serde_json::to_string_pretty(&state)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write state: {}", path.display()))
}

/// Parse `HH:MM-HH:MM`.
fn parse_hours(raw: &str) -> Result<(chrono::NaiveTime, chrono::NaiveTime)> {
    let Some((start, end)) = raw.split_once('-') else {
        bail!("Working hours must look like 09:00-17:00, got '{}'", raw);
    };
    Ok((parse_hhmm(start)?, parse_hhmm(end)?))
}

fn parse_ids(raw: &str) -> Result<Vec<Uuid>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s).with_context(|| format!("Invalid calendar id: {}", s)))
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours_parse_both_ends() {
        let (start, end) = parse_hours("08:30-12:00").unwrap();
        assert_eq!(start.to_string(), "08:30:00");
        assert_eq!(end.to_string(), "12:00:00");
        assert!(parse_hours("08:30").is_err());
        assert!(parse_hours("8h-12h").is_err());
    }

    #[test]
    fn ids_skip_blanks() {
        let id = Uuid::new_v4();
        assert_eq!(parse_ids(&format!("{}, ", id)).unwrap(), vec![id]);
        assert!(parse_ids("not-a-uuid").is_err());
    }

    #[test]
    fn missing_config_uses_defaults() {
        assert_eq!(load_defaults(None).unwrap(), EngineDefaults::default());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
