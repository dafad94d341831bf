use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub const PARTITION_FORMAT: &str = "%Y-%m-%d-%H-%M";
pub const PARTITION_KEY_NAME: &str = "update_at";
const PARTITION_LEN: usize = "YYYY-MM-DD-HH-MM".len();

/// A minute-granularity UTC time bucket.
///
/// The canonical string form is fixed width, so lexical order of partition
/// strings (and of storage keys built from them) equals time order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Partition(NaiveDateTime);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid partition '{value}': expected {PARTITION_FORMAT}")]
pub struct InvalidPartition {
    value: String,
}

impl InvalidPartition {
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Partition {
    /// Floors `instant` to the start of its minute.
    pub fn floor(instant: DateTime<Utc>) -> Self {
        let naive = instant.naive_utc();
        let floored = naive
            .with_second(0)
            .and_then(|value| value.with_nanosecond(0))
            .unwrap_or(naive);
        Self(floored)
    }

    pub fn parse(value: &str) -> Result<Self, InvalidPartition> {
        let invalid = || InvalidPartition {
            value: value.to_string(),
        };
        if value.len() != PARTITION_LEN {
            return Err(invalid());
        }
        // chrono cannot parse a format without seconds into NaiveDateTime directly.
        NaiveDateTime::parse_from_str(&format!("{value}-00"), "%Y-%m-%d-%H-%M-%S")
            .map(Self)
            .map_err(|_| invalid())
    }

    pub fn plus_minutes(self, minutes: i64) -> Self {
        Self(self.0 + Duration::minutes(minutes))
    }

    pub fn checked_add(self, interval: Duration) -> Option<Self> {
        self.0
            .checked_add_signed(interval)
            .map(|value| Self::floor(value.and_utc()))
    }

    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0.and_utc()
    }

    /// Directory-style key of this partition under `stream_prefix`, e.g.
    /// `cdc/update_at=2023-08-01-00-05/`.
    pub fn key_prefix(self, stream_prefix: &str) -> String {
        let trimmed = stream_prefix.trim_matches('/');
        if trimmed.is_empty() {
            format!("{PARTITION_KEY_NAME}={self}/")
        } else {
            format!("{trimmed}/{PARTITION_KEY_NAME}={self}/")
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(PARTITION_FORMAT))
    }
}

impl FromStr for Partition {
    type Err = InvalidPartition;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Partition {
    type Error = InvalidPartition;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Partition> for String {
    fn from(value: Partition) -> Self {
        value.to_string()
    }
}
