//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to microsecond
//! precision.
//!
//! ## Precision Invariant
//!
//! Postgres stores `timestamptz` with microsecond resolution. Truncating at
//! construction means a `Timestamp` survives a round trip through the
//! database unchanged, so ordering and equality checks made before a write
//! still hold after a read.
//!
//! Arithmetic saturates at the representable range instead of panicking.

use std::ops::{Add, Sub};

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SublifeError;

/// A UTC-only timestamp, truncated to microseconds.
///
/// # Construction
///
/// - [`Timestamp::now()`] — current UTC time, truncated.
/// - [`Timestamp::from_utc()`] — from a `DateTime<Utc>`, truncating.
/// - [`Timestamp::parse()`] — from an RFC 3339 string with `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "DateTime<Utc>", into = "DateTime<Utc>")]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The smallest step between two distinct timestamps.
    pub fn resolution() -> Duration {
        Duration::microseconds(1)
    }

    /// Create a timestamp from the current UTC time.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating below
    /// microseconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_micros(dt))
    }

    /// Parse a timestamp from an RFC 3339 string.
    ///
    /// Only the `Z` suffix is accepted. Inputs with an explicit offset,
    /// even `+00:00`, are rejected so that every textual timestamp in logs
    /// and CLI arguments has one spelling.
    ///
    /// # Errors
    ///
    /// Returns [`SublifeError::InvalidTimestamp`] if the string is not valid
    /// RFC 3339 or does not end with `Z`.
    pub fn parse(s: &str) -> Result<Self, SublifeError> {
        if !s.ends_with('Z') {
            return Err(SublifeError::InvalidTimestamp(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| SublifeError::InvalidTimestamp(format!("{s:?}: {e}")))?;
        Ok(Self::from_utc(dt.with_timezone(&Utc)))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Consume into the inner `DateTime<Utc>`.
    pub fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Calendar date (UTC) of this instant.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// This instant shifted forward by `hours`.
    pub fn plus_hours(self, hours: i64) -> Self {
        self + Duration::hours(hours)
    }

    /// This instant shifted backward by `hours`.
    pub fn minus_hours(self, hours: i64) -> Self {
        self - Duration::hours(hours)
    }

    /// This instant shifted forward by `days`.
    pub fn plus_days(self, days: i64) -> Self {
        self + Duration::days(days)
    }

    /// This instant shifted backward by `days`.
    pub fn minus_days(self, days: i64) -> Self {
        self - Duration::days(days)
    }

    /// The smallest timestamp strictly after `self`.
    pub fn next_tick(self) -> Self {
        self + Self::resolution()
    }

    /// Render as RFC 3339 with microseconds and a `Z` suffix.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        let dt = self
            .0
            .checked_add_signed(rhs)
            .unwrap_or(if rhs < Duration::zero() {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });
        Self::from_utc(dt)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Self::Output {
        let dt = self
            .0
            .checked_sub_signed(rhs)
            .unwrap_or(if rhs < Duration::zero() {
                DateTime::<Utc>::MAX_UTC
            } else {
                DateTime::<Utc>::MIN_UTC
            });
        Self::from_utc(dt)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl std::str::FromStr for Timestamp {
    type Err = SublifeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    let micros = dt.nanosecond() / 1_000 * 1_000;
    dt.with_nanosecond(micros).unwrap_or(dt)
}
