//! Calendar month keys (`YYYY-MM`) used to scope monthly usage counters.

use core::fmt;

use chrono::{DateTime, Datelike, TimeZone};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors that can occur when parsing a [`MonthKey`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MonthKeyError {
    /// The input is not of the form `YYYY-MM`.
    #[error("month key must look like YYYY-MM, got {0:?}")]
    Malformed(String),
    /// The month component is outside 1-12.
    #[error("month must be between 1 and 12, got {0}")]
    MonthOutOfRange(u32),
}

/// A calendar month, rendered as `YYYY-MM`.
///
/// Ordering follows the calendar, so `2025-05 < 2025-06 < 2026-01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Build a month key from its parts.
    ///
    /// # Errors
    ///
    /// Returns `MonthKeyError::MonthOutOfRange` if `month` is not in 1-12.
    pub const fn new(year: i32, month: u32) -> Result<Self, MonthKeyError> {
        if month == 0 || month > 12 {
            return Err(MonthKeyError::MonthOutOfRange(month));
        }
        Ok(Self { year, month })
    }

    /// The month containing the given instant, in the instant's time zone.
    #[must_use]
    pub fn of<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }

    /// Parse a `YYYY-MM` string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is malformed or the month is out of range.
    pub fn parse(s: &str) -> Result<Self, MonthKeyError> {
        let malformed = || MonthKeyError::Malformed(s.to_owned());
        let (year, month) = s.split_once('-').ok_or_else(malformed)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(malformed());
        }
        let year = year.parse::<i32>().map_err(|_| malformed())?;
        let month = month.parse::<u32>().map_err(|_| malformed())?;
        Self::new(year, month)
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month (1-12).
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for MonthKey {
    type Err = MonthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_parse_and_display() {
        let key = MonthKey::parse("2025-05").unwrap();
        assert_eq!(key.year(), 2025);
        assert_eq!(key.month(), 5);
        assert_eq!(key.to_string(), "2025-05");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(MonthKey::parse("2025/05"), Err(MonthKeyError::Malformed(_))));
        assert!(matches!(MonthKey::parse("25-05"), Err(MonthKeyError::Malformed(_))));
        assert!(matches!(MonthKey::parse("2025-5"), Err(MonthKeyError::Malformed(_))));
        assert_eq!(MonthKey::parse("2025-13"), Err(MonthKeyError::MonthOutOfRange(13)));
    }

    #[test]
    fn test_of_instant() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(MonthKey::of(&instant).to_string(), "2025-06");
    }

    #[test]
    fn test_calendar_ordering() {
        assert!(MonthKey::parse("2025-12").unwrap() < MonthKey::parse("2026-01").unwrap());
    }

    #[test]
    fn test_serde_as_string() {
        let key = MonthKey::new(2025, 6).unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"2025-06\"");
        let back: MonthKey = serde_json::from_str("\"2025-06\"").unwrap();
        assert_eq!(back, key);
    }
}
