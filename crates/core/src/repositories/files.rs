//! File-backed stores.
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//!   patients/
//!     PN-000001/
//!       patient.yaml
//!       visits/
//!         C-000001.yaml
//!         C-000004.yaml
//!   monitoring/
//!     PN-000001.yaml
//!   patient-sequence.yaml
//!   visit-sequence.yaml
//!   audit.jsonl
//! ```
//!
//! Identifiers never contain path separators or dots (see `prenatal_types`), so they
//! are used directly as directory and file names. Sequential ids are allocated while
//! holding a per-store mutex, after both the existing names and the last number
//! recorded in the store's sequence file. The sequence file is written before the
//! record, so a deleted id is never minted again.
//!
//! The rule table lives outside the data directory, in the configured rules file.

use super::{AuditLog, MonitoringSnapshotStore, PatientStore, RuleTableStore, VisitStore};
use crate::audit::AuditEntry;
use crate::constants::{
    AUDIT_LOG_FILENAME, MONITORING_DIR_NAME, PATIENTS_DIR_NAME, PATIENT_FILENAME,
    PATIENT_SEQUENCE_FILENAME, VISITS_DIR_NAME, VISIT_SEQUENCE_FILENAME,
};
use crate::error::{PrenatalError, PrenatalResult};
use crate::monitoring::MonitoringSnapshot;
use crate::patient::{NewPatient, Patient};
use crate::rules::RuleTable;
use crate::visit::{Visit, VisitDraft};
use chrono::{DateTime, Utc};
use prenatal_types::{PatientId, VisitId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// LAYOUT AND FILE HELPERS
// ============================================================================

/// Paths inside the data directory.
#[derive(Clone, Debug)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// Creates the directory skeleton if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::StorageDirCreation` if a directory cannot be created.
    pub fn create(root: &Path) -> PrenatalResult<Self> {
        let layout = Self {
            root: root.to_path_buf(),
        };
        fs::create_dir_all(layout.patients_dir()).map_err(PrenatalError::StorageDirCreation)?;
        fs::create_dir_all(layout.monitoring_dir()).map_err(PrenatalError::StorageDirCreation)?;
        Ok(layout)
    }

    fn patients_dir(&self) -> PathBuf {
        self.root.join(PATIENTS_DIR_NAME)
    }

    fn patient_dir(&self, id: &PatientId) -> PathBuf {
        self.patients_dir().join(id.as_str())
    }

    fn patient_file(&self, id: &PatientId) -> PathBuf {
        self.patient_dir(id).join(PATIENT_FILENAME)
    }

    fn visits_dir(&self, id: &PatientId) -> PathBuf {
        self.patient_dir(id).join(VISITS_DIR_NAME)
    }

    fn monitoring_dir(&self) -> PathBuf {
        self.root.join(MONITORING_DIR_NAME)
    }

    fn snapshot_file(&self, id: &PatientId) -> PathBuf {
        self.monitoring_dir().join(format!("{}.yaml", id))
    }

    fn audit_file(&self) -> PathBuf {
        self.root.join(AUDIT_LOG_FILENAME)
    }

    fn patient_sequence_file(&self) -> PathBuf {
        self.root.join(PATIENT_SEQUENCE_FILENAME)
    }

    fn visit_sequence_file(&self) -> PathBuf {
        self.root.join(VISIT_SEQUENCE_FILENAME)
    }
}

fn lock<'a>(mutex: &'a Mutex<()>, name: &'static str) -> PrenatalResult<MutexGuard<'a, ()>> {
    mutex.lock().map_err(|_| PrenatalError::LockPoisoned(name))
}

/// Reads a YAML file; a missing file is `Ok(None)`.
fn read_yaml<T: DeserializeOwned>(path: &Path) -> PrenatalResult<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PrenatalError::FileRead(e)),
    };
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(PrenatalError::YamlDeserialization)
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> PrenatalResult<()> {
    let raw = serde_yaml::to_string(value).map_err(PrenatalError::YamlSerialization)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(PrenatalError::StorageDirCreation)?;
    }
    fs::write(path, raw).map_err(PrenatalError::FileWrite)
}

/// High-water mark of a sequence file.
#[derive(Debug, Serialize, Deserialize)]
struct IssuedSequence {
    last: u32,
}

/// Last sequence number recorded in `path`; 0 before the first allocation.
fn last_issued(path: &Path) -> PrenatalResult<u32> {
    Ok(read_yaml::<IssuedSequence>(path)?.map_or(0, |issued| issued.last))
}

fn record_issued(path: &Path, sequence: Option<u32>) -> PrenatalResult<()> {
    match sequence {
        Some(last) => write_yaml(path, &IssuedSequence { last }),
        None => Ok(()),
    }
}

/// Entries of a directory; a missing directory has none.
fn dir_entries(dir: &Path) -> PrenatalResult<Vec<PathBuf>> {
    let iter = match fs::read_dir(dir) {
        Ok(iter) => iter,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PrenatalError::FileRead(e)),
    };
    let mut paths = Vec::new();
    for entry in iter {
        paths.push(entry.map_err(PrenatalError::FileRead)?.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

fn is_yaml(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "yaml")
}

/// Loads every YAML record in `paths`, skipping unreadable ones with a warning.
fn load_all_yaml<T: DeserializeOwned>(paths: impl IntoIterator<Item = PathBuf>) -> Vec<T> {
    let mut records = Vec::new();
    for path in paths {
        match read_yaml::<T>(&path) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => tracing::warn!("skipping unreadable record {}: {}", path.display(), e),
        }
    }
    records
}

// ============================================================================
// PATIENTS
// ============================================================================

#[derive(Debug)]
pub struct FilePatientStore {
    layout: DataLayout,
    allocation: Mutex<()>,
}

impl FilePatientStore {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            allocation: Mutex::new(()),
        }
    }

    fn existing_ids(&self) -> PrenatalResult<Vec<PatientId>> {
        Ok(dir_entries(&self.layout.patients_dir())?
            .iter()
            .filter(|p| p.is_dir())
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .filter_map(|n| PatientId::parse(n).ok())
            .collect())
    }
}

impl PatientStore for FilePatientStore {
    fn get(&self, id: &PatientId) -> PrenatalResult<Option<Patient>> {
        read_yaml(&self.layout.patient_file(id))
    }

    fn list(&self) -> PrenatalResult<Vec<Patient>> {
        let files = self
            .existing_ids()?
            .iter()
            .map(|id| self.layout.patient_file(id))
            .collect::<Vec<_>>();
        let mut patients: Vec<Patient> = load_all_yaml(files);
        patients.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(patients)
    }

    fn create(&self, new_patient: NewPatient, now: DateTime<Utc>) -> PrenatalResult<Patient> {
        let _guard = lock(&self.allocation, "patient ids")?;
        let counter = self.layout.patient_sequence_file();
        let existing = self.existing_ids()?;
        let id = PatientId::next_after(last_issued(&counter)?, &existing);
        let patient = new_patient.into_patient(id, now)?;
        record_issued(&counter, patient.id.sequence())?;

        fs::create_dir(self.layout.patient_dir(&patient.id))
            .map_err(PrenatalError::StorageDirCreation)?;
        write_yaml(&self.layout.patient_file(&patient.id), &patient)?;

        tracing::info!("registered patient {}", patient.id);
        Ok(patient)
    }

    fn update(&self, patient: &Patient) -> PrenatalResult<()> {
        let path = self.layout.patient_file(&patient.id);
        if !path.is_file() {
            return Err(PrenatalError::patient_not_found(&patient.id));
        }
        write_yaml(&path, patient)?;
        tracing::info!("updated patient {}", patient.id);
        Ok(())
    }

    fn delete(&self, id: &PatientId) -> PrenatalResult<()> {
        match fs::remove_dir_all(self.layout.patient_dir(id)) {
            Ok(()) => {
                tracing::info!("deleted patient record {}", id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PrenatalError::patient_not_found(id)),
            Err(e) => Err(PrenatalError::FileRemove(e)),
        }
    }
}

// ============================================================================
// VISITS
// ============================================================================

#[derive(Debug)]
pub struct FileVisitStore {
    layout: DataLayout,
    allocation: Mutex<()>,
}

impl FileVisitStore {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            allocation: Mutex::new(()),
        }
    }

    fn visit_files(&self, patient_id: &PatientId) -> PrenatalResult<Vec<PathBuf>> {
        Ok(dir_entries(&self.layout.visits_dir(patient_id))?
            .into_iter()
            .filter(|p| is_yaml(p))
            .collect())
    }

    /// Visit ids are unique across all patients.
    fn existing_ids(&self) -> PrenatalResult<Vec<VisitId>> {
        let mut ids = Vec::new();
        for patient_dir in dir_entries(&self.layout.patients_dir())? {
            for path in dir_entries(&patient_dir.join(VISITS_DIR_NAME))? {
                if let Some(id) = file_stem(&path).and_then(|s| VisitId::parse(s).ok()) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}

impl VisitStore for FileVisitStore {
    fn append(&self, draft: VisitDraft) -> PrenatalResult<Visit> {
        let _guard = lock(&self.allocation, "visit ids")?;
        let counter = self.layout.visit_sequence_file();
        let existing = self.existing_ids()?;
        let visit = draft.into_visit(VisitId::next_after(last_issued(&counter)?, &existing));
        record_issued(&counter, visit.id.sequence())?;

        let path = self
            .layout
            .visits_dir(&visit.patient_id)
            .join(format!("{}.yaml", visit.id));
        write_yaml(&path, &visit)?;

        tracing::info!("stored visit {} for {}", visit.id, visit.patient_id);
        Ok(visit)
    }

    fn list_by_patient(&self, patient_id: &PatientId) -> PrenatalResult<Vec<Visit>> {
        let mut visits: Vec<Visit> = load_all_yaml(self.visit_files(patient_id)?);
        visits.retain(|v| &v.patient_id == patient_id);
        visits.sort_by(|a, b| (a.visit_date, &a.id).cmp(&(b.visit_date, &b.id)));
        Ok(visits)
    }

    fn delete_by_patient(&self, patient_id: &PatientId) -> PrenatalResult<usize> {
        let _guard = lock(&self.allocation, "visit ids")?;
        let count = self.visit_files(patient_id)?.len();
        match fs::remove_dir_all(self.layout.visits_dir(patient_id)) {
            Ok(()) => {
                tracing::info!("deleted {} visits of {}", count, patient_id);
                Ok(count)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(PrenatalError::FileRemove(e)),
        }
    }
}

// ============================================================================
// RULE TABLE
// ============================================================================

/// Rule table read from a YAML file on every load, so edits apply without a restart.
#[derive(Clone, Debug)]
pub struct YamlRuleTableStore {
    path: PathBuf,
}

impl YamlRuleTableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RuleTableStore for YamlRuleTableStore {
    fn load_all(&self) -> PrenatalResult<RuleTable> {
        let raw = fs::read_to_string(&self.path).map_err(PrenatalError::FileRead)?;
        RuleTable::parse_yaml(&raw)
    }
}

// ============================================================================
// MONITORING SNAPSHOTS
// ============================================================================

#[derive(Debug)]
pub struct FileSnapshotStore {
    layout: DataLayout,
}

impl FileSnapshotStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }
}

impl MonitoringSnapshotStore for FileSnapshotStore {
    fn upsert(&self, snapshot: &MonitoringSnapshot) -> PrenatalResult<()> {
        write_yaml(&self.layout.snapshot_file(&snapshot.patient_id), snapshot)
    }

    fn get(&self, patient_id: &PatientId) -> PrenatalResult<Option<MonitoringSnapshot>> {
        read_yaml(&self.layout.snapshot_file(patient_id))
    }

    fn list_all(&self) -> PrenatalResult<Vec<MonitoringSnapshot>> {
        let files = dir_entries(&self.layout.monitoring_dir())?
            .into_iter()
            .filter(|p| is_yaml(p));
        let mut snapshots: Vec<MonitoringSnapshot> = load_all_yaml(files);
        snapshots.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        Ok(snapshots)
    }

    fn delete(&self, patient_id: &PatientId) -> PrenatalResult<bool> {
        match fs::remove_file(self.layout.snapshot_file(patient_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PrenatalError::FileRemove(e)),
        }
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

/// Audit log kept as one JSON object per line.
#[derive(Debug)]
pub struct JsonlAuditLog {
    layout: DataLayout,
    file_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            file_lock: Mutex::new(()),
        }
    }

    fn read_entries(&self) -> PrenatalResult<Vec<AuditEntry>> {
        let raw = match fs::read_to_string(self.layout.audit_file()) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PrenatalError::FileRead(e)),
        };
        let mut entries = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("skipping audit line {}: {}", number + 1, e),
            }
        }
        Ok(entries)
    }
}

impl AuditLog for JsonlAuditLog {
    fn append(&self, entry: &AuditEntry) -> PrenatalResult<()> {
        let line = serde_json::to_string(entry).map_err(PrenatalError::Serialization)?;
        let _guard = lock(&self.file_lock, "audit log")?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.layout.audit_file())
            .map_err(PrenatalError::FileWrite)?;
        writeln!(file, "{}", line).map_err(PrenatalError::FileWrite)
    }

    fn entries(&self) -> PrenatalResult<Vec<AuditEntry>> {
        let _guard = lock(&self.file_lock, "audit log")?;
        self.read_entries()
    }

    fn remove_before(&self, cutoff: DateTime<Utc>) -> PrenatalResult<usize> {
        let _guard = lock(&self.file_lock, "audit log")?;
        let entries = self.read_entries()?;
        let before = entries.len();
        let kept: Vec<&AuditEntry> = entries.iter().filter(|e| e.timestamp >= cutoff).collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut raw = String::new();
        for entry in kept {
            raw.push_str(&serde_json::to_string(entry).map_err(PrenatalError::Serialization)?);
            raw.push('\n');
        }
        let path = self.layout.audit_file();
        let tmp = path.with_extension("jsonl.tmp");
        fs::write(&tmp, raw).map_err(PrenatalError::FileWrite)?;
        fs::rename(&tmp, &path).map_err(PrenatalError::FileWrite)?;
        Ok(removed)
    }
}
