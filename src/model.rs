use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::limits::MINUTES_PER_DAY;

/// Minutes since midnight.
pub type Minutes = u16;

/// A wall-clock time with minute precision, rendered as `HH:MM`.
///
/// The zero-padded rendering sorts lexicographically in chronological order,
/// which the storage sort key relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(Minutes);

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self(hour as Minutes * 60 + minute as Minutes))
    }

    pub fn from_minutes(minutes: Minutes) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn minutes(self) -> Minutes {
        self.0
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        crate::validate::validate_time(&s).map_err(serde::de::Error::custom)
    }
}

/// Half-open interval `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One labeled interval on one user's calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_id: Ulid,
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub label: String,
    #[serde(with = "created_at")]
    pub created_at: DateTime<Utc>,
}

impl Block {
    pub fn span(&self) -> Span {
        Span::new(self.start.minutes(), self.end.minutes())
    }

    /// `HH:MM-HH:MM`, as shown in conflict messages.
    pub fn range_label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// `createdAt` is second precision UTC, e.g. `2024-05-01T08:30:00Z`.
pub mod created_at {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Identity of a Day Bucket: all blocks of one user on one date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub user_id: String,
    pub date: NaiveDate,
}

impl BucketKey {
    pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            date,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.date.format("%Y-%m-%d"))
    }
}

// ── Typed commands (validated field maps) ───────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCommand {
    pub bucket: BucketKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveCommand {
    pub bucket: BucketKey,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// Already trimmed.
    pub label: String,
}

impl SaveCommand {
    pub fn span(&self) -> Span {
        Span::new(self.start.minutes(), self.end.minutes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCommand {
    pub bucket: BucketKey,
    /// Already trimmed; not necessarily a well-formed ULID.
    pub block_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: &str, end: &str) -> Block {
        Block {
            block_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            start: crate::validate::validate_time(start).unwrap(),
            end: crate::validate::validate_time(end).unwrap(),
            label: "Focus".into(),
            created_at: DateTime::parse_from_rfc3339("2024-05-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn time_of_day_bounds() {
        assert_eq!(TimeOfDay::new(0, 0).unwrap().minutes(), 0);
        assert_eq!(TimeOfDay::new(23, 59).unwrap().minutes(), 1439);
        assert!(TimeOfDay::new(24, 0).is_none());
        assert!(TimeOfDay::new(12, 60).is_none());
        assert!(TimeOfDay::from_minutes(1440).is_none());
    }

    #[test]
    fn time_of_day_display_is_zero_padded() {
        assert_eq!(TimeOfDay::new(7, 5).unwrap().to_string(), "07:05");
        assert_eq!(TimeOfDay::from_minutes(1439).unwrap().to_string(), "23:59");
    }

    #[test]
    fn time_of_day_text_order_matches_minutes() {
        let mut times: Vec<TimeOfDay> = [600, 59, 0, 1439, 61]
            .into_iter()
            .map(|m| TimeOfDay::from_minutes(m).unwrap())
            .collect();
        let mut by_text = times.clone();
        times.sort();
        by_text.sort_by_key(|t| t.to_string());
        assert_eq!(times, by_text);
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(540, 600);
        let b = Span::new(570, 630);
        let c = Span::new(600, 660);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn block_json_shape() {
        let b = block("09:00", "10:00");
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["blockId"], b.block_id.to_string());
        assert_eq!(json["date"], "2024-05-01");
        assert_eq!(json["start"], "09:00");
        assert_eq!(json["end"], "10:00");
        assert_eq!(json["label"], "Focus");
        assert_eq!(json["createdAt"], "2024-05-01T08:30:00Z");
    }

    #[test]
    fn block_bincode_roundtrip() {
        let b = block("13:15", "14:45");
        let bytes = bincode::serialize(&b).unwrap();
        let decoded: Block = bincode::deserialize(&bytes).unwrap();
        assert_eq!(b, decoded);
        assert_eq!(decoded.range_label(), "13:15-14:45");
    }

    #[test]
    fn bucket_key_display() {
        let key = BucketKey::new("alice", NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(key.to_string(), "alice/2024-02-29");
    }
}
