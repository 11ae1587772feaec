//! Recurrence rule codec -- the compact `FREQ=...;INTERVAL=...` strings stored
//! on master events, their structured picker form, and human-readable text.
//!
//! Supported keys are `FREQ`, `INTERVAL`, `BYDAY`, `BYMONTHDAY`, `COUNT`,
//! `UNTIL` and `WKST` (accepted, ignored: weeks always start on Monday). Anything
//! else is rejected so that expansion never silently ignores part of a rule.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::weekday;

/// Label returned by [`describe`] when a rule cannot be parsed.
pub const FALLBACK_DESCRIPTION: &str = "Custom recurrence";

const UNTIL_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Base frequency as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Freq {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Freq {
    pub fn as_str(self) -> &'static str {
        match self {
            Freq::Daily => "DAILY",
            Freq::Weekly => "WEEKLY",
            Freq::Monthly => "MONTHLY",
            Freq::Yearly => "YEARLY",
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Freq::Daily => "day",
            Freq::Weekly => "week",
            Freq::Monthly => "month",
            Freq::Yearly => "year",
        }
    }
}

impl FromStr for Freq {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Freq::Daily),
            "WEEKLY" => Ok(Freq::Weekly),
            "MONTHLY" => Ok(Freq::Monthly),
            "YEARLY" => Ok(Freq::Yearly),
            other => Err(EngineError::InvalidRule(format!(
                "unsupported FREQ '{}'",
                other
            ))),
        }
    }
}

/// A parsed recurrence rule string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub freq: Freq,
    /// Always at least 1.
    pub interval: u32,
    /// Weekdays in rule order, deduplicated.
    pub by_day: Vec<Weekday>,
    /// Days of month, `1..=31` or `-31..=-1` (counted from the month's end).
    pub by_month_day: Vec<i8>,
    pub count: Option<u32>,
    /// Inclusive bound on occurrence starts.
    pub until: Option<DateTime<Utc>>,
}

impl RecurrenceRule {
    pub fn new(freq: Freq) -> Self {
        Self {
            freq,
            interval: 1,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            count: None,
            until: None,
        }
    }
}

impl FromStr for RecurrenceRule {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s.trim();
        let body = body.strip_prefix("RRULE:").unwrap_or(body);
        if body.is_empty() {
            return Err(EngineError::InvalidRule("empty RRULE string".to_string()));
        }

        let mut freq = None;
        let mut interval = None;
        let mut by_day = None;
        let mut by_month_day = None;
        let mut count = None;
        let mut until = None;
        let mut wkst_seen = false;

        for part in body.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                EngineError::InvalidRule(format!("expected KEY=VALUE, got '{}'", part))
            })?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();
            let duplicate = match key.as_str() {
                "FREQ" => freq.replace(value.parse::<Freq>()?).is_some(),
                "INTERVAL" => interval.replace(parse_interval(value)?).is_some(),
                "BYDAY" => by_day.replace(parse_by_day(value)?).is_some(),
                "BYMONTHDAY" => by_month_day.replace(parse_by_month_day(value)?).is_some(),
                "COUNT" => count.replace(parse_number(&key, value)?).is_some(),
                "UNTIL" => until.replace(parse_until(value)?).is_some(),
                "WKST" => {
                    weekday::from_rule_token(value).ok_or_else(|| {
                        EngineError::InvalidRule(format!("invalid WKST '{}'", value))
                    })?;
                    std::mem::replace(&mut wkst_seen, true)
                }
                other => {
                    return Err(EngineError::InvalidRule(format!(
                        "unsupported rule part '{}'",
                        other
                    )))
                }
            };
            if duplicate {
                return Err(EngineError::InvalidRule(format!("duplicate {}", key)));
            }
        }

        let freq = freq.ok_or_else(|| EngineError::InvalidRule("missing FREQ".to_string()))?;
        if count.is_some() && until.is_some() {
            return Err(EngineError::InvalidRule(
                "COUNT and UNTIL are mutually exclusive".to_string(),
            ));
        }

        Ok(Self {
            freq,
            interval: interval.unwrap_or(1),
            by_day: by_day.unwrap_or_default(),
            by_month_day: by_month_day.unwrap_or_default(),
            count,
            until,
        })
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={};INTERVAL={}", self.freq.as_str(), self.interval.max(1))?;
        if !self.by_day.is_empty() {
            let tokens: Vec<&str> = self.by_day.iter().map(|d| weekday::to_rule_token(*d)).collect();
            write!(f, ";BYDAY={}", tokens.join(","))?;
        }
        if !self.by_month_day.is_empty() {
            let days: Vec<String> = self.by_month_day.iter().map(|d| d.to_string()).collect();
            write!(f, ";BYMONTHDAY={}", days.join(","))?;
        }
        if let Some(count) = self.count {
            write!(f, ";COUNT={}", count)?;
        } else if let Some(until) = self.until {
            write!(f, ";UNTIL={}", until.format(UNTIL_FORMAT))?;
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|_| EngineError::InvalidRule(format!("invalid {} '{}'", key, value)))
}

fn parse_interval(value: &str) -> Result<u32> {
    match parse_number("INTERVAL", value)? {
        0 => Err(EngineError::InvalidRule("INTERVAL must be positive".to_string())),
        n => Ok(n),
    }
}

fn parse_by_day(value: &str) -> Result<Vec<Weekday>> {
    let mut days = value
        .split(',')
        .map(|token| {
            weekday::from_rule_token(token)
                .ok_or_else(|| EngineError::InvalidRule(format!("invalid BYDAY token '{}'", token)))
        })
        .collect::<Result<Vec<_>>>()?;
    weekday::normalize(&mut days);
    Ok(days)
}

fn parse_by_month_day(value: &str) -> Result<Vec<i8>> {
    let mut days = value
        .split(',')
        .map(|token| {
            token
                .trim()
                .parse::<i8>()
                .ok()
                .filter(|d| (1..=31).contains(d) || (-31..=-1).contains(d))
                .ok_or_else(|| EngineError::InvalidRule(format!("invalid BYMONTHDAY '{}'", token)))
        })
        .collect::<Result<Vec<_>>>()?;
    days.sort_unstable();
    days.dedup();
    Ok(days)
}

/// Accepts `YYYYMMDDTHHMMSSZ`, floating `YYYYMMDDTHHMMSS` (read as UTC) and a
/// bare `YYYYMMDD`, which bounds the series at the end of that day.
fn parse_until(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim_end_matches('Z');
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .map(end_of_day)
        .map_err(|_| EngineError::InvalidRule(format!("invalid UNTIL '{}'", value)))
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(last_second).and_utc()
}

// ---------------------------------------------------------------------------
// Picker configuration
// ---------------------------------------------------------------------------

/// Frequency choices offered by the recurrence picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Frequency {
    Daily,
    Weekly,
    /// Weekly with an interval of 2.
    Biweekly,
    Monthly,
    Yearly,
    /// Any interval or selector combination the presets above can't express.
    Custom(Freq),
}

impl Frequency {
    fn base(self) -> Freq {
        match self {
            Frequency::Daily => Freq::Daily,
            Frequency::Weekly | Frequency::Biweekly => Freq::Weekly,
            Frequency::Monthly => Freq::Monthly,
            Frequency::Yearly => Freq::Yearly,
            Frequency::Custom(freq) => freq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum EndCondition {
    Never,
    Count(u32),
    /// Last date (UTC) on which an occurrence may start.
    Until(NaiveDate),
}

/// Structured form of a rule, as edited by the recurrence picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceConfig {
    pub frequency: Frequency,
    pub interval: u32,
    /// Serialized as picker indices (`Monday = 0`).
    #[serde(with = "picker_days", default)]
    pub by_weekday: Vec<Weekday>,
    #[serde(default)]
    pub by_month_day: Vec<i8>,
    pub end: EndCondition,
}

impl RecurrenceConfig {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            by_weekday: Vec::new(),
            by_month_day: Vec::new(),
            end: EndCondition::Never,
        }
        .normalized()
    }

    /// Canonical form: interval forced to 2 for biweekly and to at least 1
    /// otherwise, weekdays and month days sorted, and the frequency
    /// reclassified. Preset frequencies drop selectors their base frequency
    /// cannot carry; a `Custom` config that holds such selectors stays custom,
    /// and one that matches a preset becomes that preset. Two configs that
    /// encode to the same rule are equal after normalization.
    pub fn normalized(mut self) -> Self {
        let base = self.frequency.base();
        self.interval = match self.frequency {
            Frequency::Biweekly => 2,
            _ => self.interval.max(1),
        };
        if !matches!(self.frequency, Frequency::Custom(_)) {
            if base != Freq::Weekly {
                self.by_weekday.clear();
            }
            if base != Freq::Monthly {
                self.by_month_day.clear();
            }
        }
        weekday::normalize(&mut self.by_weekday);
        self.by_month_day.sort_unstable();
        self.by_month_day.dedup();
        if self.end == EndCondition::Count(0) {
            self.end = EndCondition::Never;
        }
        self.frequency = classify(base, self.interval, self.has_foreign_selectors());
        self
    }

    /// Selectors no preset of the base frequency can express.
    fn has_foreign_selectors(&self) -> bool {
        let base = self.frequency.base();
        (!self.by_weekday.is_empty() && base != Freq::Weekly)
            || (!self.by_month_day.is_empty() && base != Freq::Monthly)
    }
}

fn classify(freq: Freq, interval: u32, foreign_selectors: bool) -> Frequency {
    if foreign_selectors {
        return Frequency::Custom(freq);
    }
    match (freq, interval) {
        (Freq::Daily, 1) => Frequency::Daily,
        (Freq::Weekly, 1) => Frequency::Weekly,
        (Freq::Weekly, 2) => Frequency::Biweekly,
        (Freq::Monthly, 1) => Frequency::Monthly,
        (Freq::Yearly, 1) => Frequency::Yearly,
        (freq, _) => Frequency::Custom(freq),
    }
}

impl From<&RecurrenceConfig> for RecurrenceRule {
    fn from(config: &RecurrenceConfig) -> Self {
        let config = config.clone().normalized();
        let freq = config.frequency.base();
        let mut rule = RecurrenceRule::new(freq);
        rule.interval = config.interval;
        rule.by_day = config.by_weekday;
        rule.by_month_day = config.by_month_day;
        match config.end {
            EndCondition::Never => {}
            EndCondition::Count(n) => rule.count = Some(n),
            EndCondition::Until(date) => rule.until = Some(end_of_day(date)),
        }
        rule
    }
}

impl From<&RecurrenceRule> for RecurrenceConfig {
    fn from(rule: &RecurrenceRule) -> Self {
        let end = match (rule.count, rule.until) {
            (Some(n), _) => EndCondition::Count(n),
            (None, Some(until)) => EndCondition::Until(until.date_naive()),
            (None, None) => EndCondition::Never,
        };
        RecurrenceConfig {
            frequency: Frequency::Custom(rule.freq),
            interval: rule.interval,
            by_weekday: rule.by_day.clone(),
            by_month_day: rule.by_month_day.clone(),
            end,
        }
        .normalized()
    }
}

/// Build the rule string for a picker configuration.
pub fn encode(config: &RecurrenceConfig) -> String {
    RecurrenceRule::from(config).to_string()
}

/// Parse a stored rule string into its picker configuration.
///
/// # Errors
/// Returns `EngineError::InvalidRule` if the string is empty or malformed.
pub fn decode(rule: &str) -> Result<RecurrenceConfig> {
    let parsed: RecurrenceRule = rule.parse()?;
    Ok(RecurrenceConfig::from(&parsed))
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Quick choices in the event form's repeat dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Preset {
    None,
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Yearly,
}

impl FromStr for Preset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Preset::None),
            "daily" => Ok(Preset::Daily),
            "weekly" => Ok(Preset::Weekly),
            "biweekly" => Ok(Preset::Biweekly),
            "monthly" => Ok(Preset::Monthly),
            "yearly" => Ok(Preset::Yearly),
            other => Err(EngineError::InvalidRule(format!("unknown preset '{}'", other))),
        }
    }
}

/// Rule string for a preset. `weekday` is the weekday of the event being
/// edited; weekly presets pin BYDAY to it when given. `Preset::None` clears
/// recurrence and returns `None`.
pub fn preset_rule(preset: Preset, weekday: Option<Weekday>) -> Option<String> {
    let by_day = weekday
        .map(|d| format!(";BYDAY={}", weekday::to_rule_token(d)))
        .unwrap_or_default();
    match preset {
        Preset::None => None,
        Preset::Daily => Some("FREQ=DAILY".to_string()),
        Preset::Weekly => Some(format!("FREQ=WEEKLY{}", by_day)),
        Preset::Biweekly => Some(format!("FREQ=WEEKLY;INTERVAL=2{}", by_day)),
        Preset::Monthly => Some("FREQ=MONTHLY".to_string()),
        Preset::Yearly => Some("FREQ=YEARLY".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Human-readable text
// ---------------------------------------------------------------------------

/// Describe a rule in English, e.g. "every 2 weeks on Monday and Thursday for
/// 10 times". Never fails: unparseable rules get [`FALLBACK_DESCRIPTION`].
pub fn describe(rule: &str) -> String {
    match rule.parse::<RecurrenceRule>() {
        Ok(parsed) => describe_rule(&parsed),
        Err(_) => FALLBACK_DESCRIPTION.to_string(),
    }
}

/// Describe an already-parsed rule.
pub fn describe_rule(rule: &RecurrenceRule) -> String {
    let is_workweek = rule.by_day == weekday::WEEK[..5];
    let mut text = if rule.freq == Freq::Weekly && rule.interval == 1 && is_workweek {
        "every weekday".to_string()
    } else {
        let mut text = if rule.interval == 1 {
            format!("every {}", rule.freq.unit())
        } else {
            format!("every {} {}s", rule.interval, rule.freq.unit())
        };
        if !rule.by_month_day.is_empty() {
            let days: Vec<String> = rule.by_month_day.iter().map(|d| month_day_label(*d)).collect();
            text.push_str(&format!(" on the {}", join_words(&days)));
        }
        if !rule.by_day.is_empty() {
            let days: Vec<String> = rule
                .by_day
                .iter()
                .map(|d| weekday::display_name(*d).to_string())
                .collect();
            text.push_str(&format!(" on {}", join_words(&days)));
        }
        text
    };

    if let Some(count) = rule.count {
        let noun = if count == 1 { "time" } else { "times" };
        text.push_str(&format!(" for {} {}", count, noun));
    } else if let Some(until) = rule.until {
        text.push_str(&format!(" until {}", until.format("%B %-d, %Y")));
    }
    text
}

fn month_day_label(day: i8) -> String {
    match day {
        -1 => "last day".to_string(),
        d if d < 0 => format!("{} last day", ordinal(u32::from(d.unsigned_abs()))),
        d => ordinal(u32::from(d.unsigned_abs())),
    }
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

fn join_words(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

mod picker_days {
    use chrono::Weekday;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::weekday;

    pub fn serialize<S: Serializer>(days: &[Weekday], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(days.iter().map(|d| weekday::to_picker_index(*d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Weekday>, D::Error> {
        Vec::<u8>::deserialize(deserializer)?
            .into_iter()
            .map(|i| {
                weekday::from_picker_index(i)
                    .ok_or_else(|| D::Error::custom(format!("weekday index {} out of range", i)))
            })
            .collect()
    }
}
