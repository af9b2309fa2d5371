// src/period.rs
use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::clock::Clock;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Invalid period '{0}', expected '<month>_<year>' or 'YYYY-MM'")]
    Invalid(String),
}

/// The `month_year` partition key shared by every collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::Invalid(format!("{}-{}", year, month)));
        }
        Ok(Self { year, month })
    }

    pub fn parse(raw: &str) -> Result<Self, PeriodError> {
        let trimmed = raw.trim();
        let invalid = || PeriodError::Invalid(raw.to_string());

        if let Some((month_part, year_part)) = trimmed.split_once('_') {
            let month_lower = month_part.to_ascii_lowercase();
            let month = MONTH_NAMES
                .iter()
                .position(|name| *name == month_lower)
                .ok_or_else(invalid)?;
            let year = year_part.parse::<i32>().map_err(|_| invalid())?;
            return Self::new(year, month as u32 + 1).map_err(|_| invalid());
        }

        if let Some((year_part, month_part)) = trimmed.split_once('-') {
            let year = year_part.parse::<i32>().map_err(|_| invalid())?;
            let month = month_part.parse::<u32>().map_err(|_| invalid())?;
            return Self::new(year, month).map_err(|_| invalid());
        }

        Err(invalid())
    }

    pub fn current(clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
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

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    /// "February 2026"
    pub fn label(&self) -> String {
        let name = self.month_name();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        };
        format!("{} {}", capitalized, self.year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.month_name(), self.year)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
