use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wall-clock time of day with minute precision, always rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        use chrono::Timelike;
        self.0.hour() * 60 + self.0.minute()
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let Some((hour_str, minute_str)) = trimmed.split_once(':') else {
            return Err(format!("time must be HH:MM, got {value:?}"));
        };
        let digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
        if hour_str.is_empty()
            || hour_str.len() > 2
            || minute_str.len() != 2
            || !digits(hour_str)
            || !digits(minute_str)
        {
            return Err(format!("time must be HH:MM, got {value:?}"));
        }
        let hour = hour_str
            .parse::<u32>()
            .map_err(|_| format!("time must be HH:MM, got {value:?}"))?;
        let minute = minute_str
            .parse::<u32>()
            .map_err(|_| format!("time must be HH:MM, got {value:?}"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("time out of range: {value:?}"));
        }
        Self::from_hm(hour, minute).ok_or_else(|| format!("time out of range: {value:?}"))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An unset clock field travels as the empty string.
mod optional_time {
    use super::TimeOfDay;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<TimeOfDay>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.collect_str(time),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TimeOfDay>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntervalField {
    In,
    Out,
}

impl FromStr for IntervalField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            other => Err(format!("interval field must be \"in\" or \"out\", got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntervalStatus {
    Empty,
    Partial,
    CompleteInvalid,
    CompleteValid,
}

impl IntervalStatus {
    pub fn is_error(self) -> bool {
        matches!(self, Self::Partial | Self::CompleteInvalid)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interval {
    #[serde(rename = "in", with = "optional_time", default)]
    pub clock_in: Option<TimeOfDay>,
    #[serde(rename = "out", with = "optional_time", default)]
    pub clock_out: Option<TimeOfDay>,
}

impl Interval {
    pub fn new(clock_in: Option<TimeOfDay>, clock_out: Option<TimeOfDay>) -> Self {
        Self {
            clock_in,
            clock_out,
        }
    }

    pub fn status(&self) -> IntervalStatus {
        match (self.clock_in, self.clock_out) {
            (None, None) => IntervalStatus::Empty,
            (Some(_), None) | (None, Some(_)) => IntervalStatus::Partial,
            (Some(clock_in), Some(clock_out)) if clock_in < clock_out => {
                IntervalStatus::CompleteValid
            }
            (Some(_), Some(_)) => IntervalStatus::CompleteInvalid,
        }
    }

    pub fn worked_minutes(&self) -> u32 {
        match (self.clock_in, self.clock_out) {
            (Some(clock_in), Some(clock_out)) if clock_in < clock_out => {
                clock_out.minutes_since_midnight() - clock_in.minutes_since_midnight()
            }
            _ => 0,
        }
    }

    pub fn set(&mut self, field: IntervalField, value: Option<TimeOfDay>) {
        match field {
            IntervalField::In => self.clock_in = value,
            IntervalField::Out => self.clock_out = value,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Empty,
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Day {
    pub date: NaiveDate,
    pub intervals: Vec<Interval>,
}

impl Day {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            intervals: vec![Interval::default()],
        }
    }

    pub fn status(&self) -> DayStatus {
        let mut all_empty = true;
        for interval in &self.intervals {
            let status = interval.status();
            if status.is_error() {
                return DayStatus::Error;
            }
            if status != IntervalStatus::Empty {
                all_empty = false;
            }
        }
        if all_empty {
            DayStatus::Empty
        } else {
            DayStatus::Ok
        }
    }

    pub fn worked_minutes(&self) -> u32 {
        self.intervals.iter().map(Interval::worked_minutes).sum()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.intervals.is_empty() {
            return Err(format!("day {} must have at least one interval", self.date));
        }
        Ok(())
    }
}

/// A `(year, month)` pair travelling as `"YYYY-MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthSelection {
    year: i32,
    month: u32,
}

impl MonthSelection {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("month must be between 1 and 12, got {month}"));
        }
        if !(1..=9999).contains(&year) {
            return Err(format!("year must be between 1 and 9999, got {year}"));
        }
        Ok(Self { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn days_in_month(&self) -> u32 {
        let next_first = NaiveDate::from_ymd_opt(self.next().year, self.next().month, 1)
            .unwrap_or(NaiveDate::MAX);
        (next_first - self.first_day()).num_days() as u32
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl FromStr for MonthSelection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let Some((year_str, month_str)) = trimmed.split_once('-') else {
            return Err(format!("month must be YYYY-MM, got {value:?}"));
        };
        let digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
        if year_str.len() != 4 || month_str.len() != 2 || !digits(year_str) || !digits(month_str) {
            return Err(format!("month must be YYYY-MM, got {value:?}"));
        }
        let year = year_str
            .parse::<i32>()
            .map_err(|_| format!("month must be YYYY-MM, got {value:?}"))?;
        let month = month_str
            .parse::<u32>()
            .map_err(|_| format!("month must be YYYY-MM, got {value:?}"))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for MonthSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthSelection> for String {
    fn from(value: MonthSelection) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MonthSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Credential bundle issued by Google.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Tokens without a known expiry are assumed valid until Google rejects them.
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        if self.access_token.trim().is_empty() {
            return false;
        }
        self.expires_at
            .map(|expires_at| expires_at > now + chrono::Duration::seconds(leeway_seconds))
            .unwrap_or(true)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.access_token, "token.access_token")?;
        validate_non_empty(&self.token_type, "token.token_type")?;
        if let Some(refresh_token) = &self.refresh_token {
            validate_non_empty(refresh_token, "token.refresh_token")?;
        }
        Ok(())
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
