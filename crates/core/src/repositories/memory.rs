//! In-memory stores.

use super::{AuditLog, MonitoringSnapshotStore, PatientStore, RuleTableStore, VisitStore};
use crate::audit::AuditEntry;
use crate::error::{PrenatalError, PrenatalResult};
use crate::monitoring::MonitoringSnapshot;
use crate::patient::{NewPatient, Patient};
use crate::rules::RuleTable;
use crate::visit::{Visit, VisitDraft};
use chrono::{DateTime, Utc};
use prenatal_types::{PatientId, VisitId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<'a, T>(lock: &'a RwLock<T>, name: &'static str) -> PrenatalResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| PrenatalError::LockPoisoned(name))
}

fn write<'a, T>(
    lock: &'a RwLock<T>,
    name: &'static str,
) -> PrenatalResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| PrenatalError::LockPoisoned(name))
}

#[derive(Debug, Default)]
pub struct InMemoryPatientStore {
    patients: RwLock<BTreeMap<PatientId, Patient>>,
    /// Only advanced while `patients` is write-locked.
    last_issued: AtomicU32,
}

impl PatientStore for InMemoryPatientStore {
    fn get(&self, id: &PatientId) -> PrenatalResult<Option<Patient>> {
        Ok(read(&self.patients, "patients")?.get(id).cloned())
    }

    fn list(&self) -> PrenatalResult<Vec<Patient>> {
        Ok(read(&self.patients, "patients")?.values().cloned().collect())
    }

    fn create(&self, new_patient: NewPatient, now: DateTime<Utc>) -> PrenatalResult<Patient> {
        let mut patients = write(&self.patients, "patients")?;
        let id = PatientId::next_after(self.last_issued.load(Ordering::Relaxed), patients.keys());
        let patient = new_patient.into_patient(id, now)?;
        if let Some(sequence) = patient.id.sequence() {
            self.last_issued.fetch_max(sequence, Ordering::Relaxed);
        }
        patients.insert(patient.id.clone(), patient.clone());
        Ok(patient)
    }

    fn update(&self, patient: &Patient) -> PrenatalResult<()> {
        let mut patients = write(&self.patients, "patients")?;
        match patients.get_mut(&patient.id) {
            Some(slot) => {
                *slot = patient.clone();
                Ok(())
            }
            None => Err(PrenatalError::patient_not_found(&patient.id)),
        }
    }

    fn delete(&self, id: &PatientId) -> PrenatalResult<()> {
        write(&self.patients, "patients")?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PrenatalError::patient_not_found(id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVisitStore {
    visits: RwLock<Vec<Visit>>,
    /// Only advanced while `visits` is write-locked.
    last_issued: AtomicU32,
}

impl VisitStore for InMemoryVisitStore {
    fn append(&self, draft: VisitDraft) -> PrenatalResult<Visit> {
        let mut visits = write(&self.visits, "visits")?;
        let id = VisitId::next_after(
            self.last_issued.load(Ordering::Relaxed),
            visits.iter().map(|v| &v.id),
        );
        if let Some(sequence) = id.sequence() {
            self.last_issued.fetch_max(sequence, Ordering::Relaxed);
        }
        let visit = draft.into_visit(id);
        visits.push(visit.clone());
        Ok(visit)
    }

    fn list_by_patient(&self, patient_id: &PatientId) -> PrenatalResult<Vec<Visit>> {
        let mut found: Vec<Visit> = read(&self.visits, "visits")?
            .iter()
            .filter(|v| &v.patient_id == patient_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.visit_date, &a.id).cmp(&(b.visit_date, &b.id)));
        Ok(found)
    }

    fn delete_by_patient(&self, patient_id: &PatientId) -> PrenatalResult<usize> {
        let mut visits = write(&self.visits, "visits")?;
        let before = visits.len();
        visits.retain(|v| &v.patient_id != patient_id);
        Ok(before - visits.len())
    }
}

/// Rule table held in memory; [`replace`](Self::replace) swaps it between calls.
#[derive(Debug, Default)]
pub struct InMemoryRuleTableStore {
    table: RwLock<RuleTable>,
}

impl InMemoryRuleTableStore {
    pub fn new(table: RuleTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    pub fn replace(&self, table: RuleTable) -> PrenatalResult<()> {
        *write(&self.table, "rules")? = table;
        Ok(())
    }
}

impl RuleTableStore for InMemoryRuleTableStore {
    fn load_all(&self) -> PrenatalResult<RuleTable> {
        Ok(read(&self.table, "rules")?.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<BTreeMap<PatientId, MonitoringSnapshot>>,
}

impl MonitoringSnapshotStore for InMemorySnapshotStore {
    fn upsert(&self, snapshot: &MonitoringSnapshot) -> PrenatalResult<()> {
        write(&self.snapshots, "monitoring")?.insert(snapshot.patient_id.clone(), snapshot.clone());
        Ok(())
    }

    fn get(&self, patient_id: &PatientId) -> PrenatalResult<Option<MonitoringSnapshot>> {
        Ok(read(&self.snapshots, "monitoring")?.get(patient_id).cloned())
    }

    fn list_all(&self) -> PrenatalResult<Vec<MonitoringSnapshot>> {
        Ok(read(&self.snapshots, "monitoring")?.values().cloned().collect())
    }

    fn delete(&self, patient_id: &PatientId) -> PrenatalResult<bool> {
        Ok(write(&self.snapshots, "monitoring")?.remove(patient_id).is_some())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entry: &AuditEntry) -> PrenatalResult<()> {
        write(&self.entries, "audit")?.push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> PrenatalResult<Vec<AuditEntry>> {
        Ok(read(&self.entries, "audit")?.clone())
    }

    fn remove_before(&self, cutoff: DateTime<Utc>) -> PrenatalResult<usize> {
        let mut entries = write(&self.entries, "audit")?;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        Ok(before - entries.len())
    }
}
