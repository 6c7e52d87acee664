//! Orchestration over the stores.
//!
//! [`PrenatalService`] is the entry point used by the CLI and the scheduler. It reads
//! source-of-truth data from the stores on every call (no caching across calls),
//! runs the pure derivations and writes the results back.
//!
//! ## Transactions
//!
//! Recording a visit appends the visit, re-reads the patient's visits, derives the
//! pendencies and upserts the monitoring snapshot while holding a per-patient lock.
//! The nightly refresh takes the same lock row by row, so a refresh never overwrites
//! a snapshot rebuilt by a concurrent visit with stale data. Editing a patient
//! refreshes the snapshot under the lock, and deleting one removes the record, its
//! visits and its snapshot under the lock before the lock itself is dropped.
//!
//! ## Audit
//!
//! Audit entries are fire-and-forget: a failed append is logged and never fails the
//! operation that produced it.

use crate::audit::{AuditAction, AuditEntry};
use crate::config::CoreConfig;
use crate::error::{PrenatalError, PrenatalResult};
use crate::gestation::GestationalAge;
use crate::monitoring::{build_snapshot, refresh_derived, LastContact, MonitoringSnapshot, RefreshSummary};
use crate::note::compose_note;
use crate::patient::{NewPatient, Patient, PatientUpdate};
use crate::pendency::{derive_pendencies, Pendency};
use crate::repositories::Stores;
use crate::rules::Guidance;
use crate::visit::{ProfessionalRole, Visit, VisitDraft, VisitPayload, VisitType};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use prenatal_types::PatientId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Result of [`PrenatalService::record_visit`].
#[derive(Clone, Debug)]
pub struct RecordedVisit {
    pub visit: Visit,
    /// Snapshot rebuilt in the same transaction.
    pub snapshot: MonitoringSnapshot,
}

pub struct PrenatalService {
    cfg: Arc<CoreConfig>,
    stores: Stores,
    patient_locks: Mutex<HashMap<PatientId, Arc<Mutex<()>>>>,
}

impl PrenatalService {
    /// Creates a service over the given stores.
    ///
    /// # Arguments
    ///
    /// * `cfg` - Core configuration (audit actor and retention)
    /// * `stores` - Store implementations the service reads and writes
    pub fn new(cfg: Arc<CoreConfig>, stores: Stores) -> Self {
        Self {
            cfg,
            stores,
            patient_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a service over the file stores rooted at the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::StorageDirCreation` if the data directory cannot be created.
    pub fn with_file_stores(cfg: Arc<CoreConfig>) -> PrenatalResult<Self> {
        let stores = Stores::file_backed(&cfg)?;
        Ok(Self::new(cfg, stores))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    fn patient_lock(&self, id: &PatientId) -> PrenatalResult<Arc<Mutex<()>>> {
        let mut locks = self
            .patient_locks
            .lock()
            .map_err(|_| PrenatalError::LockPoisoned("patient locks"))?;
        Ok(locks.entry(id.clone()).or_default().clone())
    }

    fn forget_patient_lock(&self, id: &PatientId) -> PrenatalResult<()> {
        self.patient_locks
            .lock()
            .map_err(|_| PrenatalError::LockPoisoned("patient locks"))?
            .remove(id);
        Ok(())
    }

    fn audit(&self, entry: AuditEntry) {
        if let Err(e) = self.stores.audit.append(&entry) {
            tracing::warn!("failed to append {} audit entry: {}", entry.action, e);
        }
    }

    fn audit_entry(&self, action: AuditAction) -> AuditEntry {
        AuditEntry::new(Utc::now(), action, self.cfg.actor())
    }

    fn require_patient(&self, id: &PatientId) -> PrenatalResult<Patient> {
        self.stores
            .patients
            .get(id)?
            .ok_or_else(|| PrenatalError::patient_not_found(id))
    }

    // ========================================================================
    // PATIENTS
    // ========================================================================

    /// Registers a new patient.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::Text` if the name is blank, or a storage error.
    pub fn register_patient(&self, new_patient: NewPatient) -> PrenatalResult<Patient> {
        let patient = self.stores.patients.create(new_patient, Utc::now())?;
        self.audit(
            self.audit_entry(AuditAction::CreatePatient)
                .patient(&patient.id)
                .detail(format!("name: {}", patient.name)),
        );
        Ok(patient)
    }

    /// Applies an edit to a patient record and refreshes the patient's monitoring
    /// snapshot, when there is one, against `today`.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::NotFound` for an unknown patient and
    /// `PrenatalError::InvalidInput` for an edit that changes nothing.
    pub fn update_patient(
        &self,
        id: &PatientId,
        update: PatientUpdate,
        today: NaiveDate,
    ) -> PrenatalResult<Patient> {
        if update.is_empty() {
            return Err(PrenatalError::InvalidInput("no fields to update".into()));
        }
        let lock = self.patient_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|_| PrenatalError::LockPoisoned("patient"))?;

        let mut patient = self.require_patient(id)?;
        update.apply(&mut patient, Utc::now())?;
        self.stores.patients.update(&patient)?;
        self.audit(self.audit_entry(AuditAction::UpdatePatient).patient(id));

        if let Some(mut snapshot) = self.stores.monitoring.get(id)? {
            refresh_derived(&mut snapshot, &patient, today, Utc::now());
            self.stores.monitoring.upsert(&snapshot)?;
        }
        Ok(patient)
    }

    /// Deletes a patient together with their visits and monitoring snapshot.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::NotFound` for an unknown patient.
    pub fn delete_patient(&self, id: &PatientId) -> PrenatalResult<()> {
        let deleted = self.delete_patient_locked(id);
        // Pruned on failure too, so an unknown id leaves no entry.
        self.forget_patient_lock(id)?;
        deleted
    }

    fn delete_patient_locked(&self, id: &PatientId) -> PrenatalResult<()> {
        let lock = self.patient_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|_| PrenatalError::LockPoisoned("patient"))?;

        self.require_patient(id)?;
        let visits = self.stores.visits.delete_by_patient(id)?;
        self.stores.monitoring.delete(id)?;
        self.stores.patients.delete(id)?;
        self.audit(
            self.audit_entry(AuditAction::DeletePatient)
                .patient(id)
                .detail(format!("visits removed: {}", visits)),
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `PrenatalError::NotFound` for an unknown patient.
    pub fn get_patient(&self, id: &PatientId) -> PrenatalResult<Patient> {
        self.require_patient(id)
    }

    pub fn search_patients(&self, term: &str) -> PrenatalResult<Vec<Patient>> {
        self.stores.patients.search(term)
    }

    pub fn visits(&self, id: &PatientId) -> PrenatalResult<Vec<Visit>> {
        self.stores.visits.list_by_patient(id)
    }

    // ========================================================================
    // DERIVATIONS
    // ========================================================================

    /// Outstanding actions for a patient; an unknown patient has none.
    pub fn derive_pendencies(&self, id: &PatientId, today: NaiveDate) -> PrenatalResult<Vec<Pendency>> {
        let Some(patient) = self.stores.patients.get(id)? else {
            return Ok(Vec::new());
        };
        let visits = self.stores.visits.list_by_patient(id)?;
        let rules = self.stores.rules.load_all()?;
        Ok(derive_pendencies(Some(&patient), &visits, &rules, today))
    }

    /// Renders a note without storing anything.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::NotFound` for an unknown patient.
    pub fn compose_note(
        &self,
        id: &PatientId,
        payload: &VisitPayload,
        visit_type: VisitType,
        today: NaiveDate,
    ) -> PrenatalResult<String> {
        let patient = self.require_patient(id)?;
        Ok(compose_note(&patient, payload, visit_type, today))
    }

    /// Checklist and guidance rows for the patient's current gestational week.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::NotFound` for an unknown patient.
    pub fn guidance(
        &self,
        id: &PatientId,
        role: Option<ProfessionalRole>,
        today: NaiveDate,
    ) -> PrenatalResult<Guidance> {
        let patient = self.require_patient(id)?;
        let weeks = GestationalAge::calculate(patient.lmp, today).map_or(0, |ga| ga.weeks);
        Ok(self.stores.rules.load_all()?.guidance_for_week(weeks, role))
    }

    // ========================================================================
    // VISITS AND MONITORING
    // ========================================================================

    /// Stores a visit with its rendered note and rebuilds the patient's snapshot.
    ///
    /// The visit date falls back to `today` when the payload has none (or an
    /// unparseable one).
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::NotFound` for an unknown patient, or a storage error
    /// from the visit or snapshot store.
    pub fn record_visit(
        &self,
        id: &PatientId,
        payload: VisitPayload,
        today: NaiveDate,
    ) -> PrenatalResult<RecordedVisit> {
        let lock = self.patient_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|_| PrenatalError::LockPoisoned("patient"))?;

        let patient = self.require_patient(id)?;
        let visit_date = payload.resolved_date(today);
        let note = compose_note(&patient, &payload, payload.visit_type, today);
        let visit = self.stores.visits.append(VisitDraft {
            patient_id: id.clone(),
            payload,
            visit_date,
            note,
            recorded_at: Utc::now(),
        })?;

        self.audit(
            self.audit_entry(AuditAction::SaveVisit)
                .patient(id)
                .visit(&visit.id)
                .detail(format!(
                    "type: {}, professional: {}",
                    visit.visit_type,
                    visit.professional.as_deref().unwrap_or("-")
                )),
        );

        let snapshot = self.rebuild_snapshot(&patient, LastContact::from_visit(&visit), today)?;
        Ok(RecordedVisit { visit, snapshot })
    }

    /// Rebuilds a patient's snapshot for a visit recorded elsewhere.
    ///
    /// Returns `Ok(None)` without writing anything when the patient does not exist.
    pub fn on_visit_recorded(
        &self,
        id: &PatientId,
        contact: LastContact,
        today: NaiveDate,
    ) -> PrenatalResult<Option<MonitoringSnapshot>> {
        let lock = self.patient_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|_| PrenatalError::LockPoisoned("patient"))?;

        match self.stores.patients.get(id)? {
            Some(patient) => self.rebuild_snapshot(&patient, contact, today).map(Some),
            None => Ok(None),
        }
    }

    /// Caller holds the patient lock.
    fn rebuild_snapshot(
        &self,
        patient: &Patient,
        contact: LastContact,
        today: NaiveDate,
    ) -> PrenatalResult<MonitoringSnapshot> {
        let visits = self.stores.visits.list_by_patient(&patient.id)?;
        let rules = self.stores.rules.load_all()?;
        let snapshot = build_snapshot(patient, &visits, &rules, contact, today, Utc::now());
        self.stores.monitoring.upsert(&snapshot)?;
        tracing::debug!(
            patient_id = %patient.id,
            visits = visits.len(),
            "monitoring snapshot rebuilt"
        );
        Ok(snapshot)
    }

    pub fn monitoring(&self) -> PrenatalResult<Vec<MonitoringSnapshot>> {
        self.stores.monitoring.list_all()
    }

    pub fn monitoring_for(&self, id: &PatientId) -> PrenatalResult<Option<MonitoringSnapshot>> {
        self.stores.monitoring.get(id)
    }

    /// Nightly job: moves every snapshot's gestational fields forward to `today`.
    ///
    /// Rows whose patient was deleted are skipped; a failing row is logged and the
    /// run continues, so a partial run heals on the next one.
    ///
    /// # Errors
    ///
    /// Only fails when the snapshot list itself cannot be read.
    pub fn refresh_monitoring(&self, today: NaiveDate) -> PrenatalResult<RefreshSummary> {
        let mut summary = RefreshSummary::default();

        for snapshot in self.stores.monitoring.list_all()? {
            let id = snapshot.patient_id.clone();
            match self.refresh_row(&id, snapshot, today) {
                Ok(true) => summary.updated += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!("failed to refresh monitoring for {}: {}", id, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "monitoring refresh finished"
        );
        Ok(summary)
    }

    /// Returns `Ok(false)` when the patient no longer exists.
    fn refresh_row(
        &self,
        id: &PatientId,
        listed: MonitoringSnapshot,
        today: NaiveDate,
    ) -> PrenatalResult<bool> {
        let lock = self.patient_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|_| PrenatalError::LockPoisoned("patient"))?;

        let Some(patient) = self.stores.patients.get(id)? else {
            tracing::debug!("skipping monitoring row for missing patient {}", id);
            return Ok(false);
        };
        // Re-read under the lock; a visit may have rebuilt the row meanwhile.
        let mut snapshot = self.stores.monitoring.get(id)?.unwrap_or(listed);
        refresh_derived(&mut snapshot, &patient, today, Utc::now());
        self.stores.monitoring.upsert(&snapshot)?;
        Ok(true)
    }

    // ========================================================================
    // AUDIT LOG
    // ========================================================================

    /// Weekly job: drops audit entries older than the configured retention.
    ///
    /// Records a `CLEANUP_LOGS` entry when something was removed.
    pub fn cleanup_audit_log(&self, now: DateTime<Utc>) -> PrenatalResult<usize> {
        let retention = self.cfg.audit_retention_days();
        let cutoff = now - Duration::days(i64::from(retention));
        let removed = self.stores.audit.remove_before(cutoff)?;

        if removed > 0 {
            self.audit(
                AuditEntry::new(now, AuditAction::CleanupLogs, self.cfg.actor())
                    .detail(format!("removed {} entries older than {} days", removed, retention)),
            );
        }
        tracing::info!("audit cleanup removed {} entries", removed);
        Ok(removed)
    }
}
