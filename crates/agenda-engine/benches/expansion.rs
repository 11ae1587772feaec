use std::hint::black_box;

use agenda_engine::availability::{available_slots, SchedulingConfig, SlotQuery};
use agenda_engine::expander::expand;
use agenda_engine::materialize::materialize;
use agenda_engine::model::{Event, WorkingHours};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use criterion::{criterion_group, criterion_main, Criterion};
use uuid::Uuid;

fn bench_expand(c: &mut Criterion) {
    let anchor = Utc.with_ymd_and_hms(2015, 1, 5, 9, 0, 0).unwrap();
    let from = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let to = from + Duration::days(31);

    c.bench_function("expand weekly, ten-year-old series, one month", |b| {
        b.iter(|| expand(black_box("FREQ=WEEKLY;BYDAY=MO,WE,FR"), anchor, 30, from, to))
    });
    c.bench_function("expand daily with count, walked from anchor", |b| {
        b.iter(|| expand(black_box("FREQ=DAILY;COUNT=5000"), anchor, 30, from, to))
    });
}

fn bench_availability(c: &mut Criterion) {
    let calendar = Uuid::new_v4();
    let day = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
    let base = Utc.with_ymd_and_hms(2029, 1, 7, 9, 0, 0).unwrap();
    let events: Vec<Event> = (0..50)
        .map(|i| {
            let start = base + Duration::minutes(37 * i);
            Event::new(calendar, format!("Series {}", i), start, start + Duration::minutes(25)).with_rule("FREQ=DAILY")
        })
        .collect();
    let config = SchedulingConfig {
        working_hours: WorkingHours::default(),
        buffer_minutes: 10,
    };
    let query = SlotQuery {
        date: day,
        duration_minutes: 30,
        extra_buffer_minutes: 0,
        calendar_ids: None,
        timezone: Tz::UTC,
        now: base,
    };

    c.bench_function("materialize 50 daily series over one day", |b| {
        let (from, to) = (base + Duration::days(365), base + Duration::days(366));
        b.iter(|| materialize(black_box(&events), &[], &[], from, to))
    });
    c.bench_function("available slots with 50 daily series", |b| {
        b.iter(|| available_slots(black_box(&query), &config, &events))
    });
}

criterion_group!(benches, bench_expand, bench_availability);
criterion_main!(benches);
