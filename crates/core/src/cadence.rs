//! Follow-up cadence policy.
//!
//! Visits are monthly until week 28, fortnightly until week 36 and weekly after
//! that. A clinician may override the interval for an individual patient; an
//! override always wins and is not bounds-checked.

use crate::dates::add_days;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Week from which visits become fortnightly.
pub const BIWEEKLY_FROM_WEEK: u32 = 28;
/// Week from which visits become weekly.
pub const WEEKLY_FROM_WEEK: u32 = 36;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CadenceLabel {
    Monthly,
    Biweekly,
    Weekly,
    Custom,
}

impl CadenceLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            CadenceLabel::Monthly => "MONTHLY",
            CadenceLabel::Biweekly => "BIWEEKLY",
            CadenceLabel::Weekly => "WEEKLY",
            CadenceLabel::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for CadenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended interval until the next visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    pub interval_days: u32,
    pub label: CadenceLabel,
}

impl Cadence {
    /// Derives the cadence for a gestational age in completed weeks.
    pub fn calculate(weeks: u32, override_days: Option<u32>) -> Self {
        if let Some(interval_days) = override_days {
            return Self {
                interval_days,
                label: CadenceLabel::Custom,
            };
        }

        if weeks < BIWEEKLY_FROM_WEEK {
            Self {
                interval_days: 28,
                label: CadenceLabel::Monthly,
            }
        } else if weeks < WEEKLY_FROM_WEEK {
            Self {
                interval_days: 14,
                label: CadenceLabel::Biweekly,
            }
        } else {
            Self {
                interval_days: 7,
                label: CadenceLabel::Weekly,
            }
        }
    }

    /// Date the next visit falls due, counted from the last visit.
    pub fn next_due(&self, last_visit: NaiveDate) -> Option<NaiveDate> {
        add_days(last_visit, self.interval_days)
    }
}

/// Reads a clinician-entered override such as `"10"`.
///
/// Blank input means "no override". Text that is not a whole number of days is
/// ignored with a warning so the default cadence applies.
pub fn parse_cadence_override(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u32>() {
        Ok(days) => Some(days),
        Err(e) => {
            tracing::warn!("ignoring cadence override {:?}: {}", trimmed, e);
            None
        }
    }
}
