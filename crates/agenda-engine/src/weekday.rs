//! Weekday conversions at every boundary the engine touches.
//!
//! Internally the engine only ever handles [`chrono::Weekday`]. Three integer or
//! string encodings exist outside of it, and each one gets a named pair of
//! conversion functions here:
//!
//! - **picker index** -- the recurrence picker's `Monday = 0 .. Sunday = 6`
//! - **working-day index** -- the calendar working-days column, `Sunday = 0 .. Saturday = 6`
//! - **rule token** -- the two-letter `MO`..`SU` codes used in BYDAY

use chrono::Weekday;

/// All weekdays in rule order (Monday first).
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Picker index (`Monday = 0`) to weekday. Out-of-range indices yield `None`.
pub fn from_picker_index(index: u8) -> Option<Weekday> {
    WEEK.get(usize::from(index)).copied()
}

/// Weekday to picker index (`Monday = 0`).
pub fn to_picker_index(day: Weekday) -> u8 {
    day.num_days_from_monday() as u8
}

/// Working-day index (`Sunday = 0`) to weekday. Out-of-range indices yield `None`.
pub fn from_working_day_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1..=6 => from_picker_index(index - 1),
        _ => None,
    }
}

/// Weekday to working-day index (`Sunday = 0`).
pub fn to_working_day_index(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

/// Two-letter rule token for a weekday.
pub fn to_rule_token(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Parse a two-letter rule token (case-insensitive).
pub fn from_rule_token(token: &str) -> Option<Weekday> {
    match token.trim().to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

/// English name used in human-readable rule descriptions.
pub fn display_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Sort and deduplicate weekdays into rule order.
pub fn normalize(days: &mut Vec<Weekday>) {
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picker_and_working_day_indices_disagree_on_sunday() {
        assert_eq!(from_picker_index(6), Some(Weekday::Sun));
        assert_eq!(from_working_day_index(0), Some(Weekday::Sun));
        assert_eq!(from_picker_index(0), Some(Weekday::Mon));
        assert_eq!(from_working_day_index(1), Some(Weekday::Mon));
    }

    #[test]
    fn indices_roundtrip_for_every_day() {
        for day in WEEK {
            assert_eq!(from_picker_index(to_picker_index(day)), Some(day));
            assert_eq!(from_working_day_index(to_working_day_index(day)), Some(day));
            assert_eq!(from_rule_token(to_rule_token(day)), Some(day));
        }
    }

    #[test]
    fn out_of_range_indices_rejected() {
        assert_eq!(from_picker_index(7), None);
        assert_eq!(from_working_day_index(7), None);
        assert_eq!(from_rule_token("XX"), None);
    }

    #[test]
    fn normalize_orders_monday_first() {
        let mut days = vec![Weekday::Sun, Weekday::Wed, Weekday::Mon, Weekday::Wed];
        normalize(&mut days);
        assert_eq!(days, vec![Weekday::Mon, Weekday::Wed, Weekday::Sun]);
    }
}
