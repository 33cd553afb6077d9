//! Report date range

use crate::{Error, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive date range used to filter the portal's report table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range; `start` must not be after `end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Single-day range
    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// The day before `today`, the default daily window
    pub fn yesterday(today: NaiveDate) -> Result<Self> {
        today
            .checked_sub_signed(Duration::days(1))
            .map(Self::single)
            .ok_or_else(|| Error::InvalidInput(format!("no day before {}", today)))
    }

    /// Build a range from optional CLI values
    ///
    /// `date` wins over `start`/`end`; a lone `start` or `end` becomes a
    /// single-day range. Returns `None` when nothing was given.
    pub fn from_parts(
        date: Option<NaiveDate>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Option<Self>> {
        match (date, start, end) {
            (Some(day), _, _) => Ok(Some(Self::single(day))),
            (None, Some(start), Some(end)) => Self::new(start, end).map(Some),
            (None, Some(day), None) | (None, None, Some(day)) => Ok(Some(Self::single(day))),
            (None, None, None) => Ok(None),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Value for `<input type="date">` fields
    pub fn start_input(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// Value for `<input type="date">` fields
    pub fn end_input(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start_input())
        } else {
            write!(f, "{}..{}", self.start_input(), self.end_input())
        }
    }
}
