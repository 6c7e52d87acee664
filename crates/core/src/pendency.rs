//! Outstanding clinical actions derived from a patient's visit history.
//!
//! Pendencies are never stored. They are recomputed from the patient record, every
//! visit of that patient and the rule table, in a fixed order: serology tests,
//! then vaccines, then trimester exams.
//!
//! A serology test or vaccine counts as done as soon as **any** visit recorded a
//! result for it, even if a later visit left it pending.

use crate::clinical::{recorded_in_any, PanelKey, SerologyTest, Vaccine};
use crate::gestation::GestationalAge;
use crate::gestation::Trimester;
use crate::patient::Patient;
use crate::rules::{RuleKind, RuleTable};
use crate::visit::Visit;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tdap is offered from this gestational week.
pub const TDAP_FROM_WEEK: u32 = 20;
/// Influenza vaccination is flagged from this gestational week.
pub const INFLUENZA_FROM_WEEK: u32 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendencyCategory {
    Serology,
    Vaccine,
    Exam,
}

impl PendencyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            PendencyCategory::Serology => "SEROLOGY",
            PendencyCategory::Vaccine => "VACCINE",
            PendencyCategory::Exam => "EXAM",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pendency {
    pub category: PendencyCategory,
    pub item: String,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trimester: Option<Trimester>,
}

impl fmt::Display for Pendency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({})",
            self.category.as_str(),
            self.item,
            self.priority.as_str()
        )?;
        if let Some(trimester) = self.trimester {
            write!(f, " {}", trimester)?;
        }
        Ok(())
    }
}

fn serology_priority(test: SerologyTest) -> Priority {
    match test {
        SerologyTest::Hcv => Priority::Medium,
        SerologyTest::Hiv | SerologyTest::HbsAg | SerologyTest::Vdrl => Priority::High,
    }
}

fn vaccine_priority(vaccine: Vaccine) -> Priority {
    match vaccine {
        Vaccine::Influenza => Priority::Medium,
        Vaccine::Tdap | Vaccine::HepatitisB => Priority::High,
    }
}

fn vaccine_due(vaccine: Vaccine, weeks: u32) -> bool {
    match vaccine {
        Vaccine::Tdap => weeks >= TDAP_FROM_WEEK,
        Vaccine::HepatitisB => true,
        Vaccine::Influenza => weeks >= INFLUENZA_FROM_WEEK,
    }
}

/// Derives the outstanding actions for a patient on `today`.
///
/// An unknown patient yields an empty list. Without a usable LMP the gestational
/// age counts as week 0: week-gated vaccines stay quiet and no exam rows are
/// looked up, since a zero-week age has no trimester to query.
pub fn derive_pendencies(
    patient: Option<&Patient>,
    visits: &[Visit],
    rules: &RuleTable,
    today: NaiveDate,
) -> Vec<Pendency> {
    let Some(patient) = patient else {
        return Vec::new();
    };

    let age = GestationalAge::calculate(patient.lmp, today);
    let weeks = age.map_or(0, |ga| ga.weeks);

    let mut pendencies = Vec::new();

    let serology_done = recorded_in_any(visits.iter().map(|v| &v.serology));
    for test in SerologyTest::ALL.iter().copied() {
        if !serology_done.contains(&test) {
            pendencies.push(Pendency {
                category: PendencyCategory::Serology,
                item: test.label().to_owned(),
                priority: serology_priority(test),
                trimester: None,
            });
        }
    }

    let vaccines_done = recorded_in_any(visits.iter().map(|v| &v.vaccines));
    for vaccine in Vaccine::ALL.iter().copied() {
        if !vaccines_done.contains(&vaccine) && vaccine_due(vaccine, weeks) {
            pendencies.push(Pendency {
                category: PendencyCategory::Vaccine,
                item: vaccine.label().to_owned(),
                priority: vaccine_priority(vaccine),
                trimester: None,
            });
        }
    }

    if weeks > 0 {
        let trimester = Trimester::from_weeks(weeks);
        for rule in rules.query_category(RuleKind::Exam, trimester.label(), weeks) {
            pendencies.push(Pendency {
                category: PendencyCategory::Exam,
                item: rule.content.clone(),
                priority: Priority::Medium,
                trimester: Some(trimester),
            });
        }
    }

    tracing::debug!(
        patient_id = %patient.id,
        weeks,
        visits = visits.len(),
        count = pendencies.len(),
        "derived pendencies"
    );

    pendencies
}

/// Items joined with `", "`, as shown in list views.
pub fn summarise(pendencies: &[Pendency]) -> String {
    pendencies
        .iter()
        .map(|p| p.item.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// True when no pendency of `category` remains.
pub fn is_complete(pendencies: &[Pendency], category: PendencyCategory) -> bool {
    pendencies.iter().all(|p| p.category != category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical::{SerologyPanel, VaccinePanel};
    use crate::patient::RiskCategory;
    use crate::rules::{RuleEntry, TargetRole};
    use crate::visit::VisitType;
    use chrono::{DateTime, Utc};
    use prenatal_types::{NonEmptyText, PatientId, VisitId};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-30T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn patient(lmp_days_ago: Option<u64>) -> Patient {
        Patient {
            id: PatientId::from_sequence(1),
            name: NonEmptyText::new("Ana").unwrap(),
            birth_date: None,
            phone: None,
            lmp: lmp_days_ago.map(|d| today() - chrono::Days::new(d)),
            usg_due_date: None,
            risk: RiskCategory::Habitual,
            notes: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn visit(seq: u32, serology: SerologyPanel, vaccines: VaccinePanel) -> Visit {
        Visit {
            id: VisitId::from_sequence(seq),
            patient_id: PatientId::from_sequence(1),
            visit_type: VisitType::FollowUp,
            visit_date: today(),
            professional: None,
            role: None,
            vitals: Default::default(),
            opening: Default::default(),
            complaints: None,
            warning_signs: None,
            plan: None,
            flags: None,
            cadence_override: None,
            serology,
            vaccines,
            note: String::new(),
            recorded_at: now(),
        }
    }

    fn exam(category: &str, min: u32, max: u32, content: &str) -> RuleEntry {
        RuleEntry {
            kind: RuleKind::Exam,
            category: category.into(),
            min_week: min,
            max_week: max,
            content: content.into(),
            target_role: TargetRole::Both,
        }
    }

    fn rules() -> RuleTable {
        RuleTable::from_entries([
            exam("1T", 0, 13, "Complete blood count"),
            exam("1T", 0, 13, "First trimester ultrasound"),
            exam("2T", 14, 27, "Morphology ultrasound"),
            exam("3T", 28, 40, "Third trimester ultrasound"),
            exam("3T", 32, 40, "Group B strep swab"),
            exam("3T", 28, 40, "Repeat blood count"),
        ])
    }

    fn summary(pendencies: &[Pendency]) -> Vec<(PendencyCategory, &str, Priority)> {
        pendencies
            .iter()
            .map(|p| (p.category, p.item.as_str(), p.priority))
            .collect()
    }

    #[test]
    fn unknown_patient_has_no_pendencies() {
        assert!(derive_pendencies(None, &[], &rules(), today()).is_empty());
    }

    #[test]
    fn no_lmp_and_no_visits() {
        let pendencies = derive_pendencies(Some(&patient(None)), &[], &rules(), today());
        assert_eq!(
            summary(&pendencies),
            vec![
                (PendencyCategory::Serology, "HIV", Priority::High),
                (PendencyCategory::Serology, "HBsAg", Priority::High),
                (PendencyCategory::Serology, "HCV", Priority::Medium),
                (PendencyCategory::Serology, "VDRL", Priority::High),
                (PendencyCategory::Vaccine, "Hepatitis B", Priority::High),
            ]
        );
    }

    #[test]
    fn future_lmp_behaves_like_missing_lmp() {
        let mut p = patient(None);
        p.lmp = Some(today() + chrono::Days::new(10));
        let pendencies = derive_pendencies(Some(&p), &[], &rules(), today());
        assert_eq!(pendencies.len(), 5);
        assert!(pendencies.iter().all(|p| p.category != PendencyCategory::Exam));
    }

    #[test]
    fn week_thirty_with_one_negative_hiv() {
        let visits = [visit(
            1,
            SerologyPanel::new().with(SerologyTest::Hiv, "NEGATIVE"),
            VaccinePanel::new(),
        )];
        let pendencies =
            derive_pendencies(Some(&patient(Some(30 * 7 + 2))), &visits, &rules(), today());

        assert_eq!(
            summary(&pendencies),
            vec![
                (PendencyCategory::Serology, "HBsAg", Priority::High),
                (PendencyCategory::Serology, "HCV", Priority::Medium),
                (PendencyCategory::Serology, "VDRL", Priority::High),
                (PendencyCategory::Vaccine, "Tdap", Priority::High),
                (PendencyCategory::Vaccine, "Hepatitis B", Priority::High),
                (PendencyCategory::Vaccine, "Influenza", Priority::Medium),
                (PendencyCategory::Exam, "Third trimester ultrasound", Priority::Medium),
                (PendencyCategory::Exam, "Repeat blood count", Priority::Medium),
            ]
        );
        assert!(pendencies
            .iter()
            .filter(|p| p.category == PendencyCategory::Exam)
            .all(|p| p.trimester == Some(Trimester::Third)));
    }

    #[test]
    fn vaccine_gates_open_at_exact_weeks() {
        let at = |weeks: u64| {
            derive_pendencies(Some(&patient(Some(weeks * 7))), &[], &RuleTable::default(), today())
                .into_iter()
                .filter(|p| p.category == PendencyCategory::Vaccine)
                .map(|p| p.item)
                .collect::<Vec<_>>()
        };
        assert_eq!(at(11), vec!["Hepatitis B"]);
        assert_eq!(at(12), vec!["Hepatitis B", "Influenza"]);
        assert_eq!(at(19), vec!["Hepatitis B", "Influenza"]);
        assert_eq!(at(20), vec!["Tdap", "Hepatitis B", "Influenza"]);
    }

    #[test]
    fn any_visit_satisfies_even_if_a_later_one_is_pending() {
        let visits = [
            visit(
                1,
                SerologyPanel::new()
                    .with(SerologyTest::Hiv, "NEGATIVE")
                    .with(SerologyTest::HbsAg, "NEGATIVE")
                    .with(SerologyTest::Hcv, "NEGATIVE")
                    .with(SerologyTest::Vdrl, "NR"),
                VaccinePanel::new().with(Vaccine::HepatitisB, "DOSE 3"),
            ),
            visit(
                2,
                SerologyPanel::new().with(SerologyTest::Hiv, "PENDING"),
                VaccinePanel::new().with(Vaccine::Tdap, "PENDING"),
            ),
        ];
        let pendencies = derive_pendencies(Some(&patient(Some(22 * 7))), &visits, &RuleTable::default(), today());
        assert_eq!(
            summary(&pendencies),
            vec![
                (PendencyCategory::Vaccine, "Tdap", Priority::High),
                (PendencyCategory::Vaccine, "Influenza", Priority::Medium),
            ]
        );
        assert!(is_complete(&pendencies, PendencyCategory::Serology));
        assert!(!is_complete(&pendencies, PendencyCategory::Vaccine));
    }

    #[test]
    fn exam_rows_follow_band_within_trimester() {
        let at_31 = derive_pendencies(Some(&patient(Some(31 * 7))), &[], &rules(), today());
        let at_33 = derive_pendencies(Some(&patient(Some(33 * 7))), &[], &rules(), today());
        let exams = |p: &[Pendency]| {
            p.iter()
                .filter(|p| p.category == PendencyCategory::Exam)
                .map(|p| p.item.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(exams(&at_31), vec!["Third trimester ultrasound", "Repeat blood count"]);
        assert_eq!(
            exams(&at_33),
            vec!["Third trimester ultrasound", "Group B strep swab", "Repeat blood count"]
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let visits = [visit(1, SerologyPanel::new(), VaccinePanel::new())];
        let p = patient(Some(100));
        let first = derive_pendencies(Some(&p), &visits, &rules(), today());
        for _ in 0..10 {
            assert_eq!(derive_pendencies(Some(&p), &visits, &rules(), today()), first);
        }
    }

    #[test]
    fn summary_joins_items() {
        let pendencies = derive_pendencies(Some(&patient(None)), &[], &rules(), today());
        assert_eq!(summarise(&pendencies), "HIV, HBsAg, HCV, VDRL, Hepatitis B");
        assert_eq!(summarise(&[]), "");
        assert_eq!(pendencies[2].to_string(), "[SEROLOGY] HCV (MEDIUM)");
    }
}
