use std::fmt;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::limits::*;
use crate::model::*;

/// Untyped request fields as delivered by the transport layer.
pub type FieldMap = Map<String, Value>;

/// A user-correctable input problem. Carries the reason shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    reason: String,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ── Pure validators ──────────────────────────────────────────────

/// Parse a run of ASCII digits. `None` on anything else, including `+`/`-`.
fn ascii_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Accepts exactly `YYYY-MM-DD` naming a real calendar date.
pub fn validate_date(s: &str) -> Result<NaiveDate, ValidationError> {
    let err = || ValidationError::new(format!("invalid date {s:?}: expected YYYY-MM-DD"));
    let bytes = s.as_bytes();
    if !s.is_ascii() || bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(err());
    }
    let year = ascii_number(&s[0..4]).ok_or_else(err)?;
    let month = ascii_number(&s[5..7]).ok_or_else(err)?;
    let day = ascii_number(&s[8..10]).ok_or_else(err)?;
    if year == 0 {
        return Err(err());
    }
    NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(|| {
        ValidationError::new(format!("invalid date {s:?}: no such calendar day"))
    })
}

/// Accepts exactly `HH:MM`, 24-hour clock.
pub fn validate_time(s: &str) -> Result<TimeOfDay, ValidationError> {
    let err = || ValidationError::new(format!("invalid time {s:?}: expected HH:MM (24-hour)"));
    let bytes = s.as_bytes();
    if !s.is_ascii() || bytes.len() != 5 || bytes[2] != b':' {
        return Err(err());
    }
    let hour = ascii_number(&s[0..2]).ok_or_else(err)?;
    let minute = ascii_number(&s[3..5]).ok_or_else(err)?;
    TimeOfDay::new(hour as u8, minute as u8).ok_or_else(err)
}

pub fn to_minutes(time: TimeOfDay) -> Minutes {
    time.minutes()
}

/// Returns the trimmed label if it is non-empty and short enough.
pub fn validate_label(s: &str) -> Result<String, ValidationError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("label is required"));
    }
    if trimmed.chars().count() > MAX_LABEL_CHARS {
        return Err(ValidationError::new(format!(
            "label must be {MAX_LABEL_CHARS} characters or fewer"
        )));
    }
    Ok(trimmed.to_string())
}

// ── Field-map parsing ────────────────────────────────────────────
//
// Fields are checked in a fixed order and the first failure wins:
// userId → date → start → end → ordering → label, or userId → date → blockId.

/// String value of a field. Missing, null and non-string values all read as `None`.
fn str_field<'a>(data: &'a FieldMap, name: &str) -> Option<&'a str> {
    data.get(name).and_then(Value::as_str)
}

fn parse_bucket(data: &FieldMap) -> Result<BucketKey, ValidationError> {
    let user_id = str_field(data, "userId")
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ValidationError::new("userId is required"))?;
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(ValidationError::new(format!(
            "userId must be {MAX_USER_ID_LEN} bytes or fewer"
        )));
    }
    let date = str_field(data, "date")
        .and_then(|d| validate_date(d).ok())
        .ok_or_else(|| ValidationError::new("date must be YYYY-MM-DD"))?;
    Ok(BucketKey::new(user_id, date))
}

pub fn parse_list(data: &FieldMap) -> Result<ListCommand, ValidationError> {
    Ok(ListCommand {
        bucket: parse_bucket(data)?,
    })
}

pub fn parse_save(data: &FieldMap) -> Result<SaveCommand, ValidationError> {
    let bucket = parse_bucket(data)?;
    let start = str_field(data, "start")
        .and_then(|s| validate_time(s).ok())
        .ok_or_else(|| ValidationError::new("start must be HH:MM (24-hour)"))?;
    let end = str_field(data, "end")
        .and_then(|s| validate_time(s).ok())
        .ok_or_else(|| ValidationError::new("end must be HH:MM (24-hour)"))?;
    if to_minutes(end) <= to_minutes(start) {
        return Err(ValidationError::new("end time must be after start time"));
    }
    let label = match str_field(data, "label") {
        Some(raw) => validate_label(raw)?,
        None => return Err(ValidationError::new("label is required")),
    };
    Ok(SaveCommand {
        bucket,
        start,
        end,
        label,
    })
}

pub fn parse_delete(data: &FieldMap) -> Result<DeleteCommand, ValidationError> {
    let bucket = parse_bucket(data)?;
    let block_id = str_field(data, "blockId")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ValidationError::new("blockId is required"))?;
    if block_id.len() > MAX_BLOCK_ID_LEN {
        return Err(ValidationError::new(format!(
            "blockId must be {MAX_BLOCK_ID_LEN} bytes or fewer"
        )));
    }
    Ok(DeleteCommand {
        bucket,
        block_id: block_id.to_string(),
    })
}
