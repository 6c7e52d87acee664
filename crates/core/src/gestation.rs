//! Gestational age and trimester classification.

use crate::dates::days_between;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// First week of the second trimester.
pub const SECOND_TRIMESTER_START_WEEK: u32 = 14;
/// First week of the third trimester.
pub const THIRD_TRIMESTER_START_WEEK: u32 = 28;

/// Time elapsed since the last menstrual period, as completed weeks plus extra days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestationalAge {
    pub weeks: u32,
    pub days: u32,
    pub total_days: u32,
}

impl GestationalAge {
    /// Computes the gestational age on `today` from a reference date (the LMP).
    ///
    /// Returns `None` when there is no reference date or when it lies after `today`.
    pub fn calculate(reference: Option<NaiveDate>, today: NaiveDate) -> Option<Self> {
        let elapsed = days_between(reference?, today);
        if elapsed < 0 {
            return None;
        }
        let total_days = u32::try_from(elapsed).ok()?;
        Some(Self::from_total_days(total_days))
    }

    pub fn from_total_days(total_days: u32) -> Self {
        Self {
            weeks: total_days / 7,
            days: total_days % 7,
            total_days,
        }
    }

    /// `"{weeks} + {days} d"`.
    pub fn formatted(&self) -> String {
        format!("{} + {} d", self.weeks, self.days)
    }

    pub fn trimester(&self) -> Trimester {
        Trimester::from_weeks(self.weeks)
    }
}

impl fmt::Display for GestationalAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {} d", self.weeks, self.days)
    }
}

/// Gestational band used for exam scheduling.
///
/// The labels double as the EXAM categories of the rule table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Trimester {
    #[serde(rename = "1T")]
    First,
    #[serde(rename = "2T")]
    Second,
    #[serde(rename = "3T")]
    Third,
}

impl Trimester {
    /// Weeks below 14 are first, 14 through 27 second, 28 onwards third.
    pub fn from_weeks(weeks: u32) -> Self {
        if weeks < SECOND_TRIMESTER_START_WEEK {
            Trimester::First
        } else if weeks < THIRD_TRIMESTER_START_WEEK {
            Trimester::Second
        } else {
            Trimester::Third
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Trimester::First => "1T",
            Trimester::Second => "2T",
            Trimester::Third => "3T",
        }
    }
}

impl fmt::Display for Trimester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
