//! Tests for folding series, exclusions and exception rows into occurrences.

use agenda_engine::materialize::{materialize, EventRows};
use agenda_engine::model::{Event, ExDates};
use agenda_engine::series::{edit_occurrence, split_series, EventPatch};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Weekly Monday standup, 09:00-10:00 UTC, starting 2024-01-01.
fn standup(calendar: Uuid) -> Event {
    Event::new(calendar, "Standup", utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 10, 0)).with_rule("FREQ=WEEKLY;BYDAY=MO")
}

fn january() -> (DateTime<Utc>, DateTime<Utc>) {
    (utc(2024, 1, 1, 0, 0), Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap())
}

fn starts(occurrences: &[agenda_engine::Occurrence]) -> Vec<DateTime<Utc>> {
    occurrences.iter().map(|o| o.start()).collect()
}

#[test]
fn virtual_occurrences_copy_the_master() {
    let master = standup(Uuid::new_v4());
    let (from, to) = january();
    let occurrences = materialize(std::slice::from_ref(&master), &[], &[], from, to);

    assert_eq!(occurrences.len(), 5);
    for occurrence in &occurrences {
        assert!(occurrence.is_virtual);
        assert_eq!(occurrence.master_event_id, Some(master.id));
        assert_eq!(occurrence.event.title, "Standup");
        assert_eq!(occurrence.occurrence_date, occurrence.start());
        assert_eq!(occurrence.end() - occurrence.start(), Duration::hours(1));
    }
}

#[test]
fn excluded_dates_are_dropped() {
    let mut master = standup(Uuid::new_v4());
    master.ex_dates.insert(date(2024, 1, 8));
    let (from, to) = january();
    let occurrences = materialize(&[master], &[], &[], from, to);

    assert_eq!(
        starts(&occurrences),
        vec![utc(2024, 1, 1, 9, 0), utc(2024, 1, 15, 9, 0), utc(2024, 1, 22, 9, 0), utc(2024, 1, 29, 9, 0)]
    );
}

#[test]
fn exception_replaces_its_occurrence() {
    let master = standup(Uuid::new_v4());
    let patch = EventPatch {
        title: Some("Standup (moved)".to_string()),
        start_time: Some(utc(2024, 1, 15, 14, 0)),
        end_time: Some(utc(2024, 1, 15, 14, 30)),
        ..EventPatch::default()
    };
    let exception = edit_occurrence(&master, utc(2024, 1, 15, 9, 0), &patch).unwrap();
    let (from, to) = january();
    let occurrences = materialize(std::slice::from_ref(&master), &[], std::slice::from_ref(&exception), from, to);

    assert_eq!(occurrences.len(), 5);
    let moved = occurrences
        .iter()
        .find(|o| o.event.id == exception.id)
        .expect("exception should appear");
    assert!(!moved.is_virtual);
    assert_eq!(moved.event.title, "Standup (moved)");
    assert_eq!(moved.start(), utc(2024, 1, 15, 14, 0));
    assert_eq!(moved.occurrence_date, utc(2024, 1, 15, 9, 0));
    assert_eq!(moved.master_event_id, Some(master.id));
    assert!(!occurrences.iter().any(|o| o.start() == utc(2024, 1, 15, 9, 0)));
}

#[test]
fn exclusion_beats_exception() {
    let mut master = standup(Uuid::new_v4());
    let exception = edit_occurrence(&master, utc(2024, 1, 15, 9, 0), &EventPatch::default()).unwrap();
    master.ex_dates.insert(date(2024, 1, 15));
    let (from, to) = january();
    let occurrences = materialize(&[master], &[], &[exception], from, to);
    assert_eq!(occurrences.len(), 4);
}

#[test]
fn exception_of_another_series_is_ignored() {
    let master = standup(Uuid::new_v4());
    let other = standup(master.calendar_id);
    let foreign = edit_occurrence(&other, utc(2024, 1, 15, 9, 0), &EventPatch {
        title: Some("Other".to_string()),
        ..EventPatch::default()
    })
    .unwrap();
    let (from, to) = january();
    let occurrences = materialize(&[master], &[], &[foreign], from, to);
    assert!(occurrences.iter().all(|o| o.is_virtual && o.event.title == "Standup"));
}

#[test]
fn regular_events_pass_through_sorted() {
    let calendar = Uuid::new_v4();
    let lunch = Event::new(calendar, "Lunch", utc(2024, 1, 8, 12, 0), utc(2024, 1, 8, 13, 0));
    let early = Event::new(calendar, "Early", utc(2024, 1, 8, 7, 0), utc(2024, 1, 8, 8, 0));
    let outside = Event::new(calendar, "February", utc(2024, 2, 8, 7, 0), utc(2024, 2, 8, 8, 0));
    let (from, to) = (utc(2024, 1, 8, 0, 0), utc(2024, 1, 8, 23, 59));

    let occurrences = materialize(&[standup(calendar)], &[lunch, outside, early], &[], from, to);
    let titles: Vec<&str> = occurrences.iter().map(|o| o.event.title.as_str()).collect();
    assert_eq!(titles, vec!["Early", "Standup", "Lunch"]);
    assert!(occurrences.iter().filter(|o| o.master_event_id.is_none()).all(|o| !o.is_virtual));
}

#[test]
fn series_stops_at_recurrence_end() {
    let mut master = standup(Uuid::new_v4());
    master.recurrence_end = Some(utc(2024, 1, 15, 9, 0) - Duration::milliseconds(1));
    let (from, to) = january();
    let occurrences = materialize(&[master], &[], &[], from, to);
    assert_eq!(starts(&occurrences), vec![utc(2024, 1, 1, 9, 0), utc(2024, 1, 8, 9, 0)]);
}

#[test]
fn split_series_covers_every_date_once() {
    let master = standup(Uuid::new_v4());
    let patch = EventPatch {
        title: Some("Planning".to_string()),
        ..EventPatch::default()
    };
    let split = split_series(&master, utc(2024, 1, 15, 9, 0), &patch).unwrap();
    let (from, to) = january();
    let occurrences = materialize(&[split.previous.clone(), split.next.clone()], &[], &[], from, to);

    assert_eq!(
        starts(&occurrences),
        vec![
            utc(2024, 1, 1, 9, 0),
            utc(2024, 1, 8, 9, 0),
            utc(2024, 1, 15, 9, 0),
            utc(2024, 1, 22, 9, 0),
            utc(2024, 1, 29, 9, 0),
        ]
    );
    let titles: Vec<&str> = occurrences.iter().map(|o| o.event.title.as_str()).collect();
    assert_eq!(titles, vec!["Standup", "Standup", "Planning", "Planning", "Planning"]);
    assert!(occurrences[..2].iter().all(|o| o.master_event_id == Some(split.previous.id)));
    assert!(occurrences[2..].iter().all(|o| o.master_event_id == Some(split.next.id)));
}

#[test]
fn date_keys_are_utc_dates() {
    // 23:30 UTC on Jan 2 is already Jan 3 in Tokyo; the key is still Jan 2.
    let calendar = Uuid::new_v4();
    let mut master = Event::new(calendar, "Late call", utc(2024, 1, 1, 23, 30), utc(2024, 1, 2, 0, 0))
        .with_rule("FREQ=DAILY");
    master.timezone = "Asia/Tokyo".to_string();
    master.ex_dates = ExDates::from_column("2024-01-02");

    let occurrences = materialize(&[master], &[], &[], utc(2024, 1, 1, 0, 0), utc(2024, 1, 3, 23, 59));
    assert_eq!(
        starts(&occurrences),
        vec![utc(2024, 1, 1, 23, 30), utc(2024, 1, 3, 23, 30)]
    );
}

#[test]
fn master_with_malformed_rule_is_skipped() {
    let calendar = Uuid::new_v4();
    let broken = Event::new(calendar, "Broken", utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 10, 0)).with_rule("FREQ=SOMETIMES");
    let fine = standup(calendar);
    let (from, to) = january();
    let occurrences = materialize(&[broken, fine], &[], &[], from, to);
    assert_eq!(occurrences.len(), 5);
}

#[test]
fn event_rows_partition_by_kind() {
    let calendar = Uuid::new_v4();
    let master = standup(calendar);
    let exception = edit_occurrence(&master, utc(2024, 1, 8, 9, 0), &EventPatch::default()).unwrap();
    let regular = Event::new(calendar, "Lunch", utc(2024, 1, 8, 12, 0), utc(2024, 1, 8, 13, 0));

    let rows = EventRows::partition(vec![regular, exception, master]);
    assert_eq!((rows.masters.len(), rows.regular.len(), rows.exceptions.len()), (1, 1, 1));

    let (from, to) = january();
    let occurrences = rows.materialize(from, to);
    assert_eq!(occurrences.len(), 6);
    assert_eq!(occurrences.iter().filter(|o| !o.is_virtual).count(), 2);
}
