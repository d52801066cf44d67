use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use super::ConfigError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Closed interval of calendar days, always ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::DateOrder);
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        let start = NaiveDate::parse_from_str(start.trim(), DATE_FORMAT)?;
        let end = NaiveDate::parse_from_str(end.trim(), DATE_FORMAT)?;
        Self::new(start, end)
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    /// `[start, end]` as the back-end expects temporal extents.
    pub fn to_extent(&self) -> [String; 2] {
        [self.start_str(), self.end_str()]
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_str(), self.end_str())
    }
}

impl Serialize for DateRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_extent().serialize(serializer)
    }
}
