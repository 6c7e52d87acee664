//! Patient records and the payloads used to register and edit them.
//!
//! Registration and edit payloads carry dates as `DD/MM/YYYY` text, the way they
//! are typed by clinicians. Unparseable dates degrade to "absent" with a warning
//! instead of rejecting the whole record.

use crate::dates::parse_local_date;
use crate::error::PrenatalResult;
use chrono::{DateTime, NaiveDate, Utc};
use prenatal_types::{NonEmptyText, PatientId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Obstetric risk category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskCategory {
    #[default]
    #[serde(rename = "HABITUAL")]
    Habitual,
    #[serde(rename = "ALTO RISCO")]
    High,
}

impl RiskCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::Habitual => "HABITUAL",
            RiskCategory::High => "ALTO RISCO",
        }
    }

    /// Parses a stored or typed risk value; `HIGH` is accepted as an alias of `ALTO RISCO`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "HABITUAL" => Some(RiskCategory::Habitual),
            "ALTO RISCO" | "ALTO_RISCO" | "HIGH" => Some(RiskCategory::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered pregnant patient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Last menstrual period, the reference date for gestational age.
    #[serde(default)]
    pub lmp: Option<NaiveDate>,
    /// Estimated due date from ultrasound.
    #[serde(default)]
    pub usg_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub risk: RiskCategory,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Case-insensitive substring match on id or name.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        self.id.as_str().to_lowercase().contains(&term)
            || self.name.as_str().to_lowercase().contains(&term)
    }
}

/// Registration payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub lmp: Option<String>,
    #[serde(default)]
    pub usg_due_date: Option<String>,
    #[serde(default)]
    pub risk: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewPatient {
    /// Builds the patient record for a freshly minted id.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::Text` if the name is blank.
    pub fn into_patient(self, id: PatientId, now: DateTime<Utc>) -> PrenatalResult<Patient> {
        let name = NonEmptyText::new(&self.name)?;
        Ok(Patient {
            id,
            name,
            birth_date: lenient_date("birth_date", self.birth_date.as_deref()),
            phone: non_blank(self.phone),
            lmp: lenient_date("lmp", self.lmp.as_deref()),
            usg_due_date: lenient_date("usg_due_date", self.usg_due_date.as_deref()),
            risk: lenient_risk(self.risk.as_deref()),
            notes: non_blank(self.notes),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Edit payload: `None` leaves a field untouched, blank text clears it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub lmp: Option<String>,
    #[serde(default)]
    pub usg_due_date: Option<String>,
    #[serde(default)]
    pub risk: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PatientUpdate {
    pub fn is_empty(&self) -> bool {
        self == &PatientUpdate::default()
    }

    /// Applies the edit in place and bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::Text` if a new name is given but blank; the patient is
    /// left unchanged in that case.
    pub fn apply(self, patient: &mut Patient, now: DateTime<Utc>) -> PrenatalResult<()> {
        let name = self.name.as_deref().map(NonEmptyText::new).transpose()?;

        if let Some(name) = name {
            patient.name = name;
        }
        if let Some(text) = self.birth_date {
            patient.birth_date = lenient_date("birth_date", Some(&text));
        }
        if let Some(text) = self.phone {
            patient.phone = non_blank(Some(text));
        }
        if let Some(text) = self.lmp {
            patient.lmp = lenient_date("lmp", Some(&text));
        }
        if let Some(text) = self.usg_due_date {
            patient.usg_due_date = lenient_date("usg_due_date", Some(&text));
        }
        if let Some(text) = self.risk {
            patient.risk = lenient_risk(Some(&text));
        }
        if let Some(text) = self.notes {
            patient.notes = non_blank(Some(text));
        }
        patient.updated_at = now;
        Ok(())
    }
}

pub(crate) fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

pub(crate) fn lenient_date(field: &str, text: Option<&str>) -> Option<NaiveDate> {
    let text = text.map(str::trim).filter(|s| !s.is_empty())?;
    let parsed = parse_local_date(text);
    if parsed.is_none() {
        tracing::warn!("ignoring unparseable {} {:?}", field, text);
    }
    parsed
}

fn lenient_risk(text: Option<&str>) -> RiskCategory {
    match text.map(str::trim).filter(|s| !s.is_empty()) {
        None => RiskCategory::default(),
        Some(text) => RiskCategory::parse(text).unwrap_or_else(|| {
            tracing::warn!("unknown risk category {:?}, using HABITUAL", text);
            RiskCategory::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrenatalError;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn registration() -> NewPatient {
        NewPatient {
            name: " Ana Souza ".into(),
            birth_date: Some("15/06/1995".into()),
            phone: Some("  ".into()),
            lmp: Some("02/01/2025".into()),
            usg_due_date: Some("not a date".into()),
            risk: None,
            notes: Some("first pregnancy".into()),
        }
    }

    #[test]
    fn registration_parses_dates_and_defaults_risk() {
        let patient = registration()
            .into_patient(PatientId::from_sequence(1), now())
            .unwrap();

        assert_eq!(patient.name.as_str(), "Ana Souza");
        assert_eq!(patient.birth_date, NaiveDate::from_ymd_opt(1995, 6, 15));
        assert_eq!(patient.lmp, NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(patient.usg_due_date, None);
        assert_eq!(patient.phone, None);
        assert_eq!(patient.risk, RiskCategory::Habitual);
        assert_eq!(patient.created_at, patient.updated_at);
    }

    #[test]
    fn registration_requires_a_name() {
        let payload = NewPatient {
            name: "   ".into(),
            ..NewPatient::default()
        };
        let err = payload
            .into_patient(PatientId::from_sequence(1), now())
            .unwrap_err();
        assert!(matches!(err, PrenatalError::Text(_)));
    }

    #[test]
    fn unknown_risk_falls_back_to_habitual() {
        let payload = NewPatient {
            name: "Bia".into(),
            risk: Some("medium".into()),
            ..NewPatient::default()
        };
        let patient = payload
            .into_patient(PatientId::from_sequence(2), now())
            .unwrap();
        assert_eq!(patient.risk, RiskCategory::Habitual);
        assert_eq!(RiskCategory::parse("alto risco"), Some(RiskCategory::High));
    }

    #[test]
    fn update_touches_only_given_fields() {
        let mut patient = registration()
            .into_patient(PatientId::from_sequence(1), now())
            .unwrap();
        let later = now() + chrono::Duration::days(3);

        PatientUpdate {
            lmp: Some("10/01/2025".into()),
            risk: Some("ALTO RISCO".into()),
            notes: Some("".into()),
            ..PatientUpdate::default()
        }
        .apply(&mut patient, later)
        .unwrap();

        assert_eq!(patient.name.as_str(), "Ana Souza");
        assert_eq!(patient.lmp, NaiveDate::from_ymd_opt(2025, 1, 10));
        assert_eq!(patient.risk, RiskCategory::High);
        assert_eq!(patient.notes, None);
        assert_eq!(patient.updated_at, later);
    }

    #[test]
    fn blank_name_update_leaves_patient_untouched() {
        let mut patient = registration()
            .into_patient(PatientId::from_sequence(1), now())
            .unwrap();
        let before = patient.clone();
        let result = PatientUpdate {
            name: Some(" ".into()),
            lmp: Some("10/01/2025".into()),
            ..PatientUpdate::default()
        }
        .apply(&mut patient, now());
        assert!(result.is_err());
        assert_eq!(patient, before);
    }

    #[test]
    fn search_matches_id_or_name_case_insensitively() {
        let patient = registration()
            .into_patient(PatientId::from_sequence(42), now())
            .unwrap();
        assert!(patient.matches_search("souza"));
        assert!(patient.matches_search("pn-0000"));
        assert!(patient.matches_search("42"));
        assert!(!patient.matches_search("maria"));
    }

    #[test]
    fn risk_serialises_with_stored_values() {
        assert_eq!(
            serde_json::to_string(&RiskCategory::High).unwrap(),
            "\"ALTO RISCO\""
        );
    }
}
