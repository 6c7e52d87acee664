//! Per-patient monitoring snapshots.
//!
//! A snapshot is a cache of derivations over the patient record and its visits, kept
//! for list views and follow-up planning. It is rebuilt whole after every visit and
//! its date-dependent fields are refreshed nightly. Nothing in it is a source of
//! truth: deleting every snapshot and rebuilding from the stores yields the same rows.

use crate::cadence::Cadence;
use crate::dates::compute_age;
use crate::gestation::{GestationalAge, Trimester};
use crate::patient::{Patient, RiskCategory};
use crate::pendency::{derive_pendencies, is_complete, summarise, PendencyCategory};
use crate::rules::RuleTable;
use crate::visit::{ProfessionalRole, Visit};
use chrono::{DateTime, NaiveDate, Utc};
use prenatal_types::PatientId;
use serde::{Deserialize, Serialize};

/// The encounter that triggered a snapshot rebuild.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastContact {
    pub date: NaiveDate,
    pub professional: Option<String>,
    pub role: Option<ProfessionalRole>,
    pub cadence_override: Option<u32>,
}

impl LastContact {
    pub fn from_visit(visit: &Visit) -> Self {
        Self {
            date: visit.visit_date,
            professional: visit.professional.clone(),
            role: visit.role,
            cadence_override: visit.cadence_override,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    pub patient_id: PatientId,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub risk: RiskCategory,
    #[serde(default)]
    pub lmp: Option<NaiveDate>,
    #[serde(default)]
    pub usg_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_visit_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_attended_by: Option<String>,
    #[serde(default)]
    pub last_attended_role: Option<ProfessionalRole>,
    #[serde(default)]
    pub cadence_override: Option<u32>,
    /// `"{weeks} + {days} d"`.
    #[serde(default)]
    pub gestational_age: Option<String>,
    #[serde(default)]
    pub gestational_days: Option<u32>,
    #[serde(default)]
    pub trimester: Option<Trimester>,
    #[serde(default)]
    pub cadence: Option<Cadence>,
    #[serde(default)]
    pub next_due: Option<NaiveDate>,
    pub serology_complete: bool,
    pub vaccines_complete: bool,
    pub total_visits: usize,
    pub physician_visits: usize,
    pub nurse_visits: usize,
    /// Outstanding items joined with `", "`.
    #[serde(default)]
    pub pendencies: String,
    pub monitored_at: DateTime<Utc>,
}

impl MonitoringSnapshot {
    /// True when the next visit is due on or before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.next_due.is_some_and(|due| due <= today)
    }

    /// Copies the fields owned by the patient record.
    fn apply_patient(&mut self, patient: &Patient, today: NaiveDate) {
        self.name = patient.name.to_string();
        self.birth_date = patient.birth_date;
        self.age = patient.birth_date.map(|birth| compute_age(birth, today));
        self.notes = patient.notes.clone();
        self.risk = patient.risk;
        self.lmp = patient.lmp;
        self.usg_due_date = patient.usg_due_date;
    }

    fn apply_gestation(&mut self, today: NaiveDate) {
        let age = GestationalAge::calculate(self.lmp, today);
        self.gestational_age = age.map(|ga| ga.formatted());
        self.gestational_days = age.map(|ga| ga.total_days);
        self.trimester = age.map(|ga| ga.trimester());

        // An override applies even without a usable LMP.
        self.cadence = match (age, self.cadence_override) {
            (Some(ga), override_days) => Some(Cadence::calculate(ga.weeks, override_days)),
            (None, Some(days)) => Some(Cadence::calculate(0, Some(days))),
            (None, None) => None,
        };
        self.next_due = self
            .cadence
            .zip(self.last_visit_date)
            .and_then(|(cadence, last)| cadence.next_due(last));
    }
}

/// Rebuilds a patient's snapshot after a visit.
pub fn build_snapshot(
    patient: &Patient,
    visits: &[Visit],
    rules: &RuleTable,
    contact: LastContact,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> MonitoringSnapshot {
    let pendencies = derive_pendencies(Some(patient), visits, rules, today);
    let count_role = |role: ProfessionalRole| visits.iter().filter(|v| v.role == Some(role)).count();

    let mut snapshot = MonitoringSnapshot {
        patient_id: patient.id.clone(),
        name: String::new(),
        birth_date: None,
        age: None,
        notes: None,
        risk: RiskCategory::default(),
        lmp: None,
        usg_due_date: None,
        last_visit_date: Some(contact.date),
        last_attended_by: contact.professional,
        last_attended_role: contact.role,
        cadence_override: contact.cadence_override,
        gestational_age: None,
        gestational_days: None,
        trimester: None,
        cadence: None,
        next_due: None,
        serology_complete: is_complete(&pendencies, PendencyCategory::Serology),
        vaccines_complete: is_complete(&pendencies, PendencyCategory::Vaccine),
        total_visits: visits.len(),
        physician_visits: count_role(ProfessionalRole::Physician),
        nurse_visits: count_role(ProfessionalRole::Nurse),
        pendencies: summarise(&pendencies),
        monitored_at: now,
    };
    snapshot.apply_patient(patient, today);
    snapshot.apply_gestation(today);
    snapshot
}

/// Brings an existing snapshot up to date with the patient record and `today`.
///
/// Identity fields (name, birth date, risk, notes, LMP, ultrasound due date) are
/// copied from the current record and the gestational fields recomputed; everything
/// tied to visits is left as it was written at the last rebuild.
pub fn refresh_derived(
    snapshot: &mut MonitoringSnapshot,
    patient: &Patient,
    today: NaiveDate,
    now: DateTime<Utc>,
) {
    snapshot.apply_patient(patient, today);
    snapshot.apply_gestation(today);
    snapshot.monitored_at = now;
}

/// Outcome of one nightly refresh run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub updated: usize,
    /// Snapshots whose patient no longer exists.
    pub skipped: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CadenceLabel;
    use crate::clinical::{PanelKey, SerologyPanel, SerologyTest, Vaccine, VaccinePanel};
    use crate::visit::VisitType;
    use prenatal_types::{NonEmptyText, VisitId};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-30T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn patient(lmp: Option<NaiveDate>) -> Patient {
        Patient {
            id: PatientId::from_sequence(3),
            name: NonEmptyText::new("Clara Dias").unwrap(),
            birth_date: Some(day(1990, 1, 15)),
            phone: None,
            lmp,
            usg_due_date: None,
            risk: RiskCategory::High,
            notes: Some("twins".into()),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn visit(seq: u32, role: Option<ProfessionalRole>, serology: SerologyPanel) -> Visit {
        Visit {
            id: VisitId::from_sequence(seq),
            patient_id: PatientId::from_sequence(3),
            visit_type: VisitType::FollowUp,
            visit_date: day(2025, 6, 30),
            professional: Some("Dr. Reis".into()),
            role,
            vitals: Default::default(),
            opening: Default::default(),
            complaints: None,
            warning_signs: None,
            plan: None,
            flags: None,
            cadence_override: None,
            serology,
            vaccines: VaccinePanel::new(),
            note: String::new(),
            recorded_at: now(),
        }
    }

    fn contact(date: NaiveDate, cadence_override: Option<u32>) -> LastContact {
        LastContact {
            date,
            professional: Some("Enf. Rosa".into()),
            role: Some(ProfessionalRole::Nurse),
            cadence_override,
        }
    }

    #[test]
    fn snapshot_counts_visits_and_derives_schedule() {
        let today = day(2025, 6, 30);
        let full_serology = SerologyPanel::new()
            .with(SerologyTest::Hiv, "NR")
            .with(SerologyTest::HbsAg, "NR")
            .with(SerologyTest::Hcv, "NR")
            .with(SerologyTest::Vdrl, "NR");
        let visits = [
            visit(1, Some(ProfessionalRole::Physician), full_serology),
            visit(2, Some(ProfessionalRole::Nurse), SerologyPanel::new()),
            visit(3, None, SerologyPanel::new()),
        ];
        let lmp = today - chrono::Days::new(30 * 7);

        let snapshot = build_snapshot(
            &patient(Some(lmp)),
            &visits,
            &RuleTable::default(),
            contact(today, None),
            today,
            now(),
        );

        assert_eq!(snapshot.name, "Clara Dias");
        assert_eq!(snapshot.age, Some(35));
        assert_eq!(snapshot.total_visits, 3);
        assert_eq!(snapshot.physician_visits, 1);
        assert_eq!(snapshot.nurse_visits, 1);
        assert_eq!(snapshot.gestational_age.as_deref(), Some("30 + 0 d"));
        assert_eq!(snapshot.trimester, Some(Trimester::Third));
        assert_eq!(snapshot.cadence.map(|c| c.label), Some(CadenceLabel::Biweekly));
        assert_eq!(snapshot.next_due, Some(day(2025, 7, 14)));
        assert_eq!(snapshot.last_attended_by.as_deref(), Some("Enf. Rosa"));
        assert!(snapshot.serology_complete);
        assert!(!snapshot.vaccines_complete);
        assert_eq!(snapshot.pendencies, "Tdap, Hepatitis B, Influenza");
    }

    #[test]
    fn without_lmp_only_an_override_sets_a_cadence() {
        let today = day(2025, 6, 30);
        let plain = build_snapshot(
            &patient(None),
            &[],
            &RuleTable::default(),
            contact(today, None),
            today,
            now(),
        );
        assert_eq!(plain.gestational_age, None);
        assert_eq!(plain.cadence, None);
        assert_eq!(plain.next_due, None);

        let custom = build_snapshot(
            &patient(None),
            &[],
            &RuleTable::default(),
            contact(today, Some(10)),
            today,
            now(),
        );
        assert_eq!(custom.cadence.map(|c| c.label), Some(CadenceLabel::Custom));
        assert_eq!(custom.next_due, Some(day(2025, 7, 10)));
    }

    #[test]
    fn nightly_refresh_moves_gestation_forward() {
        let visit_day = day(2025, 6, 2);
        let lmp = visit_day - chrono::Days::new(27 * 7 + 6);
        let mut snapshot = build_snapshot(
            &patient(Some(lmp)),
            &[],
            &RuleTable::default(),
            contact(visit_day, None),
            visit_day,
            now(),
        );
        assert_eq!(snapshot.cadence.map(|c| c.interval_days), Some(28));
        assert_eq!(snapshot.next_due, Some(day(2025, 6, 30)));
        let pendencies_before = snapshot.pendencies.clone();

        let later = now() + chrono::Duration::days(1);
        refresh_derived(&mut snapshot, &patient(Some(lmp)), day(2025, 6, 3), later);

        assert_eq!(snapshot.gestational_age.as_deref(), Some("28 + 0 d"));
        assert_eq!(snapshot.trimester, Some(Trimester::Third));
        assert_eq!(snapshot.cadence.map(|c| c.interval_days), Some(14));
        assert_eq!(snapshot.next_due, Some(day(2025, 6, 16)));
        assert_eq!(snapshot.pendencies, pendencies_before);
        assert_eq!(snapshot.monitored_at, later);
        assert!(snapshot.is_overdue(day(2025, 6, 16)));
        assert!(!snapshot.is_overdue(day(2025, 6, 15)));
    }

    #[test]
    fn nightly_refresh_picks_up_edited_patient_fields() {
        let today = day(2025, 6, 30);
        let mut snapshot = build_snapshot(
            &patient(Some(day(2025, 1, 1))),
            &[],
            &RuleTable::default(),
            contact(today, None),
            today,
            now(),
        );

        let mut edited = patient(Some(day(2025, 1, 6)));
        edited.name = NonEmptyText::new("Ana Lima").unwrap();
        edited.risk = RiskCategory::Habitual;
        edited.notes = None;
        edited.birth_date = Some(day(2000, 7, 1));
        edited.usg_due_date = Some(day(2025, 10, 8));
        refresh_derived(&mut snapshot, &edited, today, now());

        assert_eq!(snapshot.name, "Ana Lima");
        assert_eq!(snapshot.risk, RiskCategory::Habitual);
        assert_eq!(snapshot.notes, None);
        assert_eq!(snapshot.birth_date, Some(day(2000, 7, 1)));
        assert_eq!(snapshot.age, Some(24));
        assert_eq!(snapshot.lmp, Some(day(2025, 1, 6)));
        assert_eq!(snapshot.usg_due_date, Some(day(2025, 10, 8)));
        assert_eq!(snapshot.gestational_age.as_deref(), Some("25 + 0 d"));
    }

    #[test]
    fn rebuild_is_reproducible() {
        let today = day(2025, 6, 30);
        let p = patient(Some(day(2025, 1, 1)));
        let visits = [visit(
            1,
            Some(ProfessionalRole::Physician),
            SerologyPanel::new(),
        )];
        let build = || {
            build_snapshot(
                &p,
                &visits,
                &RuleTable::default(),
                LastContact::from_visit(&visits[0]),
                today,
                now(),
            )
        };
        assert_eq!(build(), build());
        assert!(build().pendencies.contains(Vaccine::Tdap.label()));
    }
}
