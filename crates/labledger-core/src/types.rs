//! Strong type definitions shared by every record family.
//!
//! Positions and instants are newtypes so a cursor is never confused with a
//! sequence id or a millisecond count.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// A position in the sync event log.
///
/// Cursors are assigned by storage, strictly increasing in insertion order,
/// and never reused. `Cursor::START` precedes every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub i64);

impl Cursor {
    /// The position before the first event.
    pub const START: Self = Self(0);

    /// Get the raw value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Cursor {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A UTC instant with fixed microsecond precision.
///
/// Stored as an integer so no storage engine can round it. The canonical text
/// form always carries exactly six fractional digits; that form is what goes
/// into audit hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The current time, truncated to microseconds.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    /// Create from microseconds since the Unix epoch.
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Microseconds since the Unix epoch.
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// RFC 3339 in UTC with exactly six fractional digits, e.g.
    /// `2024-03-01T09:30:00.000250Z`.
    pub fn to_canonical_string(self) -> String {
        match DateTime::<Utc>::from_timestamp_micros(self.0) {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, true),
            // Outside chrono's range; still deterministic.
            None => format!("@{}us", self.0),
        }
    }

    /// Parse the RFC 3339 form. Sub-microsecond digits are truncated.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| CoreError::DecodingError(format!("timestamp {s:?}: {e}")))?;
        Ok(Self(dt.with_timezone(&Utc).timestamp_micros()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse(&s).map_err(serde::de::Error::custom)
    }
}
