//! Domain DTOs for the timer API.
//!
//! # Design
//! These types mirror the mock-server's schema but are defined independently.
//! Integration tests catch any schema drift between the two crates.
//!
//! The backend emits `LocalDateTime` values without an offset, so timestamps
//! accept both RFC 3339 and naive ISO date-times (read as local time) and are
//! normalized to UTC on the way in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Lifecycle state of a timer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerStatus {
    Running,
    Stopped,
}

/// A single start/stop interval belonging to one work log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: i64,
    pub work_log_id: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub stopped_at: Option<DateTime<Utc>>,
    /// Server-computed duration. Only meaningful once `stopped_at` is set.
    #[serde(default)]
    pub duration_in_seconds: Option<i64>,
    pub status: TimerStatus,
}

impl Timer {
    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }
}

/// A validated, strictly positive work-log identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkLogId(u64);

impl WorkLogId {
    pub fn new(value: u64) -> Result<Self, ApiError> {
        if value == 0 {
            return Err(ApiError::validation("work log id must be positive"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl FromStr for WorkLogId {
    type Err = ApiError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ApiError::validation("missing work log id"));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ApiError::validation(format!("invalid work log id '{trimmed}'")));
        }
        let value = trimmed
            .parse::<u64>()
            .map_err(|_| ApiError::validation(format!("invalid work log id '{trimmed}'")))?;
        Self::new(value)
    }
}

impl fmt::Display for WorkLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields picked out of a non-2xx response body. All optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub code: Option<i64>,
    pub details: Option<Value>,
}

impl ErrorBody {
    /// Lenient parse: an empty, non-JSON or non-object body yields the empty
    /// default, and fields of the wrong type are skipped individually.
    pub fn parse(body: &str) -> Self {
        let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) else {
            return Self::default();
        };
        Self {
            message: fields
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
            code: fields.get("code").and_then(Value::as_i64),
            details: fields.get("details").filter(|v| !v.is_null()).cloned(),
        }
    }
}

/// Request payload for `startTimer` / `stopTimer`; serializes to `{}`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EmptyBody {}

pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Some(with_offset.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'"))),
                None => Ok(None),
            }
        }
    }
}
