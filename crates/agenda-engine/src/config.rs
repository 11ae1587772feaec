//! Engine-wide defaults for values a calendar or scheduling page may omit.

use chrono::NaiveTime;
use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::model::{hhmm, working_day_indices, WorkingHours};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineDefaults {
    #[serde(with = "hhmm")]
    pub working_hours_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub working_hours_end: NaiveTime,
    #[serde(with = "working_day_indices")]
    pub working_days: Vec<Weekday>,
    /// Booking lengths offered when a page's list is unusable.
    pub durations: Vec<u32>,
    pub timezone: String,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        let hours = WorkingHours::default();
        Self {
            working_hours_start: hours.start,
            working_hours_end: hours.end,
            working_days: hours.days,
            durations: vec![30],
            timezone: "UTC".to_string(),
        }
    }
}

impl EngineDefaults {
    pub fn working_hours(&self) -> WorkingHours {
        WorkingHours {
            start: self.working_hours_start,
            end: self.working_hours_end,
            days: self.working_days.clone(),
            is_always_available: false,
        }
    }
}
