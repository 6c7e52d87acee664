//! Store interfaces for patients, visits, rules, monitoring snapshots and the audit log.
//!
//! The core only talks to these traits. Two implementations ship with the crate:
//!
//! - [`memory`]: `RwLock`-guarded collections, used by tests and embedding callers
//! - [`files`]: YAML and JSON-lines files under the configured data directory
//!
//! Every store is `Send + Sync` so one instance can be shared behind an `Arc` by the
//! service, the scheduler and the CLI.

pub mod files;
pub mod memory;

use crate::audit::AuditEntry;
use crate::config::CoreConfig;
use crate::error::PrenatalResult;
use crate::monitoring::MonitoringSnapshot;
use crate::patient::{NewPatient, Patient};
use crate::rules::RuleTable;
use crate::visit::{Visit, VisitDraft};
use chrono::{DateTime, Utc};
use prenatal_types::PatientId;
use std::sync::Arc;

pub trait PatientStore: Send + Sync {
    fn get(&self, id: &PatientId) -> PrenatalResult<Option<Patient>>;

    /// Every patient, ordered by id.
    fn list(&self) -> PrenatalResult<Vec<Patient>>;

    /// Case-insensitive substring search on id or name.
    fn search(&self, term: &str) -> PrenatalResult<Vec<Patient>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|p| p.matches_search(term))
            .collect())
    }

    /// Registers a patient under the next sequential id. Ids of deleted patients are
    /// never handed out again.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::Text` for a blank name, or a storage error if the record
    /// cannot be written.
    fn create(&self, new_patient: NewPatient, now: DateTime<Utc>) -> PrenatalResult<Patient>;

    /// Replaces a stored patient.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::NotFound` if no patient has this id.
    fn update(&self, patient: &Patient) -> PrenatalResult<()>;

    /// Removes a patient record.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::NotFound` if no patient has this id.
    fn delete(&self, id: &PatientId) -> PrenatalResult<()>;
}

/// Append-only visit history.
pub trait VisitStore: Send + Sync {
    /// Stores a visit under the next sequential id and returns it. Ids are never
    /// reused, even after the visits holding them were deleted.
    fn append(&self, draft: VisitDraft) -> PrenatalResult<Visit>;

    /// A patient's visits, ordered by visit date then id.
    fn list_by_patient(&self, patient_id: &PatientId) -> PrenatalResult<Vec<Visit>>;

    /// Removes every visit of a patient and returns how many were removed.
    fn delete_by_patient(&self, patient_id: &PatientId) -> PrenatalResult<usize>;
}

pub trait RuleTableStore: Send + Sync {
    /// Reads the full rule table. Implementations re-read their source on every call.
    fn load_all(&self) -> PrenatalResult<RuleTable>;
}

pub trait MonitoringSnapshotStore: Send + Sync {
    fn upsert(&self, snapshot: &MonitoringSnapshot) -> PrenatalResult<()>;

    fn get(&self, patient_id: &PatientId) -> PrenatalResult<Option<MonitoringSnapshot>>;

    /// Every snapshot, ordered by patient id.
    fn list_all(&self) -> PrenatalResult<Vec<MonitoringSnapshot>>;

    /// Removes a patient's snapshot; `Ok(false)` when there was none.
    fn delete(&self, patient_id: &PatientId) -> PrenatalResult<bool>;
}

pub trait AuditLog: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> PrenatalResult<()>;

    /// Entries in append order.
    fn entries(&self) -> PrenatalResult<Vec<AuditEntry>>;

    /// Drops entries stamped before `cutoff` and returns how many were removed.
    fn remove_before(&self, cutoff: DateTime<Utc>) -> PrenatalResult<usize>;
}

/// The set of stores a [`crate::PrenatalService`] works against.
#[derive(Clone)]
pub struct Stores {
    pub patients: Arc<dyn PatientStore>,
    pub visits: Arc<dyn VisitStore>,
    pub rules: Arc<dyn RuleTableStore>,
    pub monitoring: Arc<dyn MonitoringSnapshotStore>,
    pub audit: Arc<dyn AuditLog>,
}

impl Stores {
    /// Fresh in-memory stores with a fixed rule table.
    pub fn in_memory(rules: RuleTable) -> Self {
        Self {
            patients: Arc::new(memory::InMemoryPatientStore::default()),
            visits: Arc::new(memory::InMemoryVisitStore::default()),
            rules: Arc::new(memory::InMemoryRuleTableStore::new(rules)),
            monitoring: Arc::new(memory::InMemorySnapshotStore::default()),
            audit: Arc::new(memory::InMemoryAuditLog::default()),
        }
    }

    /// File-backed stores rooted at the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::StorageDirCreation` if the data directory layout cannot
    /// be created.
    pub fn file_backed(cfg: &CoreConfig) -> PrenatalResult<Self> {
        let layout = files::DataLayout::create(cfg.data_dir())?;
        Ok(Self {
            patients: Arc::new(files::FilePatientStore::new(layout.clone())),
            visits: Arc::new(files::FileVisitStore::new(layout.clone())),
            rules: Arc::new(files::YamlRuleTableStore::new(cfg.rules_file())),
            monitoring: Arc::new(files::FileSnapshotStore::new(layout.clone())),
            audit: Arc::new(files::JsonlAuditLog::new(layout)),
        })
    }
}
