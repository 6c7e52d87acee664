//! Visits (prenatal encounters) and the payload a visit is recorded from.
//!
//! Visits are append-only: created once per encounter, never edited afterwards.

use crate::clinical::{SerologyPanel, VaccinePanel};
use crate::patient::lenient_date;
use chrono::{DateTime, NaiveDate, Utc};
use prenatal_types::{PatientId, VisitId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitType {
    /// First prenatal visit, which also captures the obstetric history.
    Opening,
    #[default]
    FollowUp,
}

impl VisitType {
    pub fn as_str(self) -> &'static str {
        match self {
            VisitType::Opening => "OPENING",
            VisitType::FollowUp => "FOLLOW_UP",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "OPENING" => Some(VisitType::Opening),
            "FOLLOW_UP" | "FOLLOWUP" => Some(VisitType::FollowUp),
            _ => None,
        }
    }
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the attending professional.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfessionalRole {
    Physician,
    Nurse,
}

impl ProfessionalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfessionalRole::Physician => "PHYSICIAN",
            ProfessionalRole::Nurse => "NURSE",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "PHYSICIAN" => Some(ProfessionalRole::Physician),
            "NURSE" => Some(ProfessionalRole::Nurse),
            _ => None,
        }
    }
}

impl fmt::Display for ProfessionalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical exam measurements, kept as typed text (`"120/80"`, `"64.5"`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,
    /// Kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    /// Uterine (fundal) height in centimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fundal_height: Option<String>,
    /// Fetal heart rate in beats per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetal_heart_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edema: Option<String>,
}

/// History captured at the opening visit only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pregnancy_planning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primigravida: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obstetric_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folic_acid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta_hcg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_ultrasound: Option<String>,
}

/// Everything typed in for one encounter, before it is stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitPayload {
    #[serde(default)]
    pub visit_type: VisitType,
    /// `DD/MM/YYYY`; missing or unparseable means "today".
    #[serde(default)]
    pub visit_date: Option<String>,
    #[serde(default)]
    pub professional: Option<String>,
    #[serde(default)]
    pub role: Option<ProfessionalRole>,
    #[serde(default)]
    pub vitals: Vitals,
    #[serde(default)]
    pub opening: OpeningHistory,
    #[serde(default)]
    pub complaints: Option<String>,
    #[serde(default)]
    pub warning_signs: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    /// Free-text alerts appended at the end of the note.
    #[serde(default)]
    pub flags: Option<String>,
    /// Clinician-chosen follow-up interval in days.
    #[serde(default)]
    pub cadence_override: Option<u32>,
    #[serde(default)]
    pub serology: SerologyPanel,
    #[serde(default)]
    pub vaccines: VaccinePanel,
}

impl VisitPayload {
    /// Resolves the encounter date, falling back to `today`.
    pub fn resolved_date(&self, today: NaiveDate) -> NaiveDate {
        lenient_date("visit_date", self.visit_date.as_deref()).unwrap_or(today)
    }
}

/// A stored encounter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    pub patient_id: PatientId,
    pub visit_type: VisitType,
    pub visit_date: NaiveDate,
    #[serde(default)]
    pub professional: Option<String>,
    #[serde(default)]
    pub role: Option<ProfessionalRole>,
    #[serde(default)]
    pub vitals: Vitals,
    #[serde(default)]
    pub opening: OpeningHistory,
    #[serde(default)]
    pub complaints: Option<String>,
    #[serde(default)]
    pub warning_signs: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub flags: Option<String>,
    #[serde(default)]
    pub cadence_override: Option<u32>,
    #[serde(default)]
    pub serology: SerologyPanel,
    #[serde(default)]
    pub vaccines: VaccinePanel,
    /// Note as rendered when the visit was saved.
    #[serde(default)]
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

/// A visit waiting for the store to assign its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitDraft {
    pub patient_id: PatientId,
    pub payload: VisitPayload,
    pub visit_date: NaiveDate,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

impl VisitDraft {
    pub fn into_visit(self, id: VisitId) -> Visit {
        let payload = self.payload;
        Visit {
            id,
            patient_id: self.patient_id,
            visit_type: payload.visit_type,
            visit_date: self.visit_date,
            professional: payload
                .professional
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
            role: payload.role,
            vitals: payload.vitals,
            opening: payload.opening,
            complaints: payload.complaints,
            warning_signs: payload.warning_signs,
            plan: payload.plan,
            flags: payload.flags,
            cadence_override: payload.cadence_override,
            serology: payload.serology,
            vaccines: payload.vaccines,
            note: self.note,
            recorded_at: self.recorded_at,
        }
    }
}
