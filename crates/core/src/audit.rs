//! Audit trail entries.

use chrono::{DateTime, Utc};
use prenatal_types::{PatientId, VisitId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreatePatient,
    UpdatePatient,
    DeletePatient,
    SaveVisit,
    CleanupLogs,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::CreatePatient => "CREATE_PATIENT",
            AuditAction::UpdatePatient => "UPDATE_PATIENT",
            AuditAction::DeletePatient => "DELETE_PATIENT",
            AuditAction::SaveVisit => "SAVE_VISIT",
            AuditAction::CleanupLogs => "CLEANUP_LOGS",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_id: Option<VisitId>,
    pub actor: String,
    #[serde(default)]
    pub detail: String,
}

impl AuditEntry {
    pub fn new(timestamp: DateTime<Utc>, action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            timestamp,
            action,
            patient_id: None,
            visit_id: None,
            actor: actor.into(),
            detail: String::new(),
        }
    }

    pub fn patient(mut self, id: &PatientId) -> Self {
        self.patient_id = Some(id.clone());
        self
    }

    pub fn visit(mut self, id: &VisitId) -> Self {
        self.visit_id = Some(id.clone());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}
