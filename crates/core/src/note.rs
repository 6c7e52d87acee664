//! Plain-text visit note, laid out for copy-paste into an external medical record.
//!
//! Block order is fixed:
//!
//! 1. header with the visit type
//! 2. patient identification and gestational age
//! 3. opening history (`OPENING` visits only)
//! 4. physical exam
//! 5. complaints, warning signs and plan
//! 6. serology and vaccine panels, each only when the panel holds a value
//! 7. alerts
//!
//! A field with no value drops its whole line; there are no placeholders.

use crate::clinical::{PanelKey, StatusPanel};
use crate::dates::{compute_age, format_local_date};
use crate::gestation::GestationalAge;
use crate::patient::Patient;
use crate::visit::{VisitPayload, VisitType};
use chrono::NaiveDate;

#[derive(Default)]
struct NoteBuilder {
    lines: Vec<String>,
}

impl NoteBuilder {
    fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    /// `label: value[suffix]`, skipped when the value is blank.
    fn field(&mut self, label: &str, value: Option<&str>, suffix: &str) -> bool {
        match present(value) {
            Some(value) => {
                self.lines.push(format!("{label}: {value}{suffix}"));
                true
            }
            None => false,
        }
    }

    /// Title line followed by the free text, then a separator.
    fn section(&mut self, title: &str, body: Option<&str>) {
        if let Some(body) = present(body) {
            self.line(format!("{title}:"));
            self.line(body);
            self.blank();
        }
    }

    fn panel<K: PanelKey>(&mut self, title: &str, panel: &StatusPanel<K>) {
        if !panel.has_any_value() {
            return;
        }
        self.line(format!("{title}:"));
        for (key, status) in panel.iter() {
            self.field(key.label(), Some(status), "");
        }
        self.blank();
    }

    fn finish(mut self) -> String {
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn header(visit_type: VisitType) -> &'static str {
    match visit_type {
        VisitType::Opening => "PRENATAL - OPENING",
        VisitType::FollowUp => "PRENATAL - FOLLOW-UP",
    }
}

/// Renders the note for one encounter.
///
/// `today` drives the patient's age and gestational age, so the same inputs always
/// render the same text.
pub fn compose_note(
    patient: &Patient,
    payload: &VisitPayload,
    visit_type: VisitType,
    today: NaiveDate,
) -> String {
    let mut note = NoteBuilder::default();

    note.line(header(visit_type));
    note.blank();

    note.field("Patient", Some(patient.name.as_str()), "");
    if let Some(birth_date) = patient.birth_date {
        note.line(format!(
            "DOB: {} ({} years)",
            format_local_date(birth_date),
            compute_age(birth_date, today)
        ));
    }
    if let Some(lmp) = patient.lmp {
        note.line(format!("LMP: {}", format_local_date(lmp)));
    }
    if let Some(due) = patient.usg_due_date {
        note.line(format!("EDD (USG): {}", format_local_date(due)));
    }
    if let Some(ga) = GestationalAge::calculate(patient.lmp, today) {
        note.line(format!("GA: {} ({})", ga.formatted(), ga.trimester()));
    }
    note.blank();

    if visit_type == VisitType::Opening {
        let history = &payload.opening;
        note.field("Pregnancy planning", history.pregnancy_planning.as_deref(), "");
        note.field("Primigravida", history.primigravida.as_deref(), "");
        note.field("Obstetric history", history.obstetric_history.as_deref(), "");
        note.field("Folic acid", history.folic_acid.as_deref(), "");
        note.field("Beta-hCG", history.beta_hcg.as_deref(), "");
        note.field("First ultrasound", history.first_ultrasound.as_deref(), "");
        note.blank();
    }

    let vitals = &payload.vitals;
    note.line("PHYSICAL EXAM:");
    note.field("BP", vitals.blood_pressure.as_deref(), "");
    note.field("Weight", vitals.weight.as_deref(), " kg");
    note.field("Fundal height", vitals.fundal_height.as_deref(), " cm");
    note.field("FHR", vitals.fetal_heart_rate.as_deref(), " bpm");
    note.field("Edema", vitals.edema.as_deref(), "");
    note.blank();

    note.section("COMPLAINTS", payload.complaints.as_deref());
    note.section("WARNING SIGNS", payload.warning_signs.as_deref());
    note.section("PLAN", payload.plan.as_deref());

    note.panel("SEROLOGY", &payload.serology);
    note.panel("VACCINES", &payload.vaccines);

    if note.field("ALERTS", payload.flags.as_deref(), "") {
        note.blank();
    }

    note.finish()
}
