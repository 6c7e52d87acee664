//! Prenatal rule table.
//!
//! The rule table is reference data maintained by clinical-content authors. Each
//! row says "between weeks `min_week` and `max_week`, professionals of
//! `target_role` should see `content`" and belongs to a kind (checklist item,
//! guidance text or required exam) and a free-form category. EXAM rows use the
//! trimester labels `1T`, `2T`, `3T` as their category.
//!
//! ## YAML layout
//!
//! ```text
//! - kind: EXAM
//!   category: 1T
//!   min_week: 0        # optional, defaults to 0
//!   max_week: 13       # optional, defaults to 999
//!   content: Complete blood count
//!   target_role: BOTH  # optional, defaults to BOTH
//! ```
//!
//! Row order is meaningful: query results follow it within each category.

use crate::error::{PrenatalError, PrenatalResult};
use crate::visit::ProfessionalRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lower bound applied when a row leaves `min_week` empty.
pub const DEFAULT_MIN_WEEK: u32 = 0;
/// Upper bound applied when a row leaves `max_week` empty (open-ended).
pub const DEFAULT_MAX_WEEK: u32 = 999;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    Checklist,
    Guidance,
    Exam,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Checklist => "CHECKLIST",
            RuleKind::Guidance => "GUIDANCE",
            RuleKind::Exam => "EXAM",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audience of a rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetRole {
    Physician,
    Nurse,
    #[default]
    Both,
}

impl TargetRole {
    /// `BOTH` admits everyone; a specific role admits only that role. An unknown
    /// professional (`None`) only sees `BOTH` rows.
    pub fn admits(self, role: Option<ProfessionalRole>) -> bool {
        match self {
            TargetRole::Both => true,
            TargetRole::Physician => role == Some(ProfessionalRole::Physician),
            TargetRole::Nurse => role == Some(ProfessionalRole::Nurse),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub kind: RuleKind,
    pub category: String,
    #[serde(default = "default_min_week")]
    pub min_week: u32,
    #[serde(default = "default_max_week")]
    pub max_week: u32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub target_role: TargetRole,
}

fn default_min_week() -> u32 {
    DEFAULT_MIN_WEEK
}

fn default_max_week() -> u32 {
    DEFAULT_MAX_WEEK
}

impl RuleEntry {
    /// True when `weeks` falls inside `[min_week, max_week]`.
    pub fn covers_week(&self, weeks: u32) -> bool {
        (self.min_week..=self.max_week).contains(&weeks)
    }
}

/// One category of a rule kind with its rows in table order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleCategory<'a> {
    pub name: &'a str,
    pub entries: Vec<&'a RuleEntry>,
}

/// A read-only snapshot of the rule table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleTable {
    entries: Vec<RuleEntry>,
}

impl RuleTable {
    /// Builds a table, dropping rows whose week band is inverted.
    pub fn from_entries(entries: impl IntoIterator<Item = RuleEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|entry| {
                let ok = entry.min_week <= entry.max_week;
                if !ok {
                    tracing::warn!(
                        "skipping {} rule {:?} with min_week {} > max_week {}",
                        entry.kind,
                        entry.content,
                        entry.min_week,
                        entry.max_week
                    );
                }
                ok
            })
            .collect();
        Self { entries }
    }

    /// Parses the YAML layout described in the module docs.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::YamlDeserialization` if the text is not a list of rule rows.
    pub fn parse_yaml(text: &str) -> PrenatalResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let rows: Vec<RuleEntry> =
            serde_yaml::from_str(text).map_err(PrenatalError::YamlDeserialization)?;
        Ok(Self::from_entries(rows))
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Categories of a kind in first-appearance order, rows in table order.
    pub fn categories(&self, kind: RuleKind) -> Vec<RuleCategory<'_>> {
        let mut categories: Vec<RuleCategory<'_>> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.kind == kind) {
            match categories.iter_mut().find(|c| c.name == entry.category) {
                Some(category) => category.entries.push(entry),
                None => categories.push(RuleCategory {
                    name: &entry.category,
                    entries: vec![entry],
                }),
            }
        }
        categories
    }

    /// The whole table as kind → categories.
    pub fn grouped(&self) -> BTreeMap<RuleKind, Vec<RuleCategory<'_>>> {
        [RuleKind::Checklist, RuleKind::Guidance, RuleKind::Exam]
            .into_iter()
            .map(|kind| (kind, self.categories(kind)))
            .filter(|(_, categories)| !categories.is_empty())
            .collect()
    }

    /// Rows of `kind` whose band covers `weeks` and whose audience admits `role`.
    pub fn query_by_week(
        &self,
        kind: RuleKind,
        weeks: u32,
        role: Option<ProfessionalRole>,
    ) -> Vec<&RuleEntry> {
        self.categories(kind)
            .into_iter()
            .flat_map(|category| category.entries)
            .filter(|entry| entry.covers_week(weeks) && entry.target_role.admits(role))
            .collect()
    }

    /// Rows of one category of `kind` whose band covers `weeks`, regardless of audience.
    pub fn query_category(&self, kind: RuleKind, category: &str, weeks: u32) -> Vec<&RuleEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind && e.category == category && e.covers_week(weeks))
            .collect()
    }

    /// Checklist items and guidance texts for a visit at `weeks`.
    pub fn guidance_for_week(&self, weeks: u32, role: Option<ProfessionalRole>) -> Guidance {
        let items = |kind: RuleKind| -> Vec<GuidanceItem> {
            self.query_by_week(kind, weeks, role)
                .into_iter()
                .map(|entry| GuidanceItem {
                    category: entry.category.clone(),
                    text: entry.content.clone(),
                })
                .collect()
        };
        Guidance {
            checklist: items(RuleKind::Checklist),
            guidance: items(RuleKind::Guidance),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidanceItem {
    pub category: String,
    pub text: String,
}

/// What the attending professional should check and tell the patient at this visit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidance {
    pub checklist: Vec<GuidanceItem>,
    pub guidance: Vec<GuidanceItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
- kind: CHECKLIST
  category: History
  min_week: 0
  max_week: 13
  content: Check folic acid use
- kind: CHECKLIST
  category: Physical exam
  min_week: 0
  max_week: 13
  content: Measure blood pressure
- kind: CHECKLIST
  category: History
  min_week: 0
  max_week: 13
  content: Full obstetric history
  target_role: PHYSICIAN
- kind: GUIDANCE
  category: Warning signs
  content: Explain warning signs
- kind: GUIDANCE
  category: Folic acid
  max_week: 13
  content: Explain why folic acid matters
  target_role: NURSE
- kind: EXAM
  category: 3T
  min_week: 28
  max_week: 40
  content: Third trimester ultrasound
- kind: EXAM
  category: 3T
  min_week: 28
  max_week: 40
  content: Complete blood count
  target_role: PHYSICIAN
- kind: EXAM
  category: 2T
  min_week: 20
  max_week: 10
  content: Inverted band
"#;

    fn table() -> RuleTable {
        RuleTable::parse_yaml(TABLE).unwrap()
    }

    #[test]
    fn missing_bounds_and_role_take_defaults() {
        let table = table();
        let warning = &table.entries()[3];
        assert_eq!(warning.min_week, DEFAULT_MIN_WEEK);
        assert_eq!(warning.max_week, DEFAULT_MAX_WEEK);
        assert_eq!(warning.target_role, TargetRole::Both);
        assert!(warning.covers_week(0));
        assert!(warning.covers_week(999));
        assert!(!warning.covers_week(1000));
    }

    #[test]
    fn inverted_bands_are_dropped_on_load() {
        let table = table();
        assert_eq!(table.entries().len(), 7);
        assert!(table.entries().iter().all(|e| e.min_week <= e.max_week));
    }

    #[test]
    fn categories_keep_first_appearance_and_row_order() {
        let table = table();
        let categories = table.categories(RuleKind::Checklist);
        let names: Vec<_> = categories.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["History", "Physical exam"]);
        let history: Vec<_> = categories[0].entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(history, vec!["Check folic acid use", "Full obstetric history"]);
    }

    #[test]
    fn query_filters_by_band_and_audience() {
        let table = table();

        let nurse: Vec<_> = table
            .query_by_week(RuleKind::Checklist, 10, Some(ProfessionalRole::Nurse))
            .into_iter()
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(nurse, vec!["Check folic acid use", "Measure blood pressure"]);

        let physician = table.query_by_week(RuleKind::Checklist, 10, Some(ProfessionalRole::Physician));
        assert_eq!(physician.len(), 3);
        assert_eq!(physician[1].content, "Full obstetric history");

        let unknown = table.query_by_week(RuleKind::Checklist, 10, None);
        assert_eq!(unknown.len(), 2);

        assert!(table.query_by_week(RuleKind::Checklist, 14, Some(ProfessionalRole::Physician)).is_empty());
    }

    #[test]
    fn band_edges_are_inclusive() {
        let table = table();
        assert_eq!(table.query_category(RuleKind::Exam, "3T", 27).len(), 0);
        assert_eq!(table.query_category(RuleKind::Exam, "3T", 28).len(), 2);
        assert_eq!(table.query_category(RuleKind::Exam, "3T", 40).len(), 2);
        assert_eq!(table.query_category(RuleKind::Exam, "3T", 41).len(), 0);
    }

    #[test]
    fn guidance_splits_checklist_and_texts() {
        let guidance = table().guidance_for_week(8, Some(ProfessionalRole::Nurse));
        assert_eq!(guidance.checklist.len(), 2);
        let texts: Vec<_> = guidance.guidance.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(texts, vec!["Explain warning signs", "Explain why folic acid matters"]);
        assert_eq!(guidance.guidance[1].category, "Folic acid");
    }

    #[test]
    fn grouped_view_lists_only_present_kinds() {
        let table = RuleTable::from_entries(table().entries()[..3].to_vec());
        let grouped = table.grouped();
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![RuleKind::Checklist]);
    }

    #[test]
    fn empty_or_invalid_yaml() {
        assert!(RuleTable::parse_yaml("   ").unwrap().is_empty());
        let err = RuleTable::parse_yaml("kind: EXAM").unwrap_err();
        assert!(matches!(err, PrenatalError::YamlDeserialization(_)));
    }
}
