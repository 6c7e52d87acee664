//! Serology and vaccination status panels recorded at each visit.
//!
//! A panel is a sparse map from a known test (or vaccine) to free status text such
//! as `NEGATIVE`, `REACTIVE` or `DONE`. An absent key, blank text or a pending
//! marker all mean "not yet recorded".

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status text meaning "requested but no result yet". `PENDENTE` is accepted from older records.
pub const PENDING_MARKERS: [&str; 2] = ["PENDING", "PENDENTE"];

/// Returns true when the status text carries an actual result.
pub fn is_recorded_status(status: &str) -> bool {
    let status = status.trim();
    !status.is_empty()
        && !PENDING_MARKERS
            .iter()
            .any(|marker| status.eq_ignore_ascii_case(marker))
}

/// Keys of a status panel.
pub trait PanelKey: Copy + Ord + fmt::Debug + 'static {
    /// Every key, in clinical display order.
    const ALL: &'static [Self];

    /// Storage key.
    fn key(self) -> &'static str;

    /// Human-readable name.
    fn label(self) -> &'static str;

    fn from_key(key: &str) -> Option<Self>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SerologyTest {
    Hiv,
    HbsAg,
    Hcv,
    Vdrl,
}

impl PanelKey for SerologyTest {
    const ALL: &'static [Self] = &[
        SerologyTest::Hiv,
        SerologyTest::HbsAg,
        SerologyTest::Hcv,
        SerologyTest::Vdrl,
    ];

    fn key(self) -> &'static str {
        match self {
            SerologyTest::Hiv => "hiv",
            SerologyTest::HbsAg => "hbsag",
            SerologyTest::Hcv => "hcv",
            SerologyTest::Vdrl => "vdrl",
        }
    }

    fn label(self) -> &'static str {
        match self {
            SerologyTest::Hiv => "HIV",
            SerologyTest::HbsAg => "HBsAg",
            SerologyTest::Hcv => "HCV",
            SerologyTest::Vdrl => "VDRL",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "hiv" => Some(SerologyTest::Hiv),
            "hbsag" => Some(SerologyTest::HbsAg),
            "hcv" => Some(SerologyTest::Hcv),
            "vdrl" => Some(SerologyTest::Vdrl),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vaccine {
    Tdap,
    HepatitisB,
    Influenza,
}

impl PanelKey for Vaccine {
    const ALL: &'static [Self] = &[Vaccine::Tdap, Vaccine::HepatitisB, Vaccine::Influenza];

    fn key(self) -> &'static str {
        match self {
            Vaccine::Tdap => "tdap",
            Vaccine::HepatitisB => "hepatitis_b",
            Vaccine::Influenza => "influenza",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Vaccine::Tdap => "Tdap",
            Vaccine::HepatitisB => "Hepatitis B",
            Vaccine::Influenza => "Influenza",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "tdap" | "dtpa" => Some(Vaccine::Tdap),
            "hepatitis_b" | "hepatiteb" | "hepb" => Some(Vaccine::HepatitisB),
            "influenza" => Some(Vaccine::Influenza),
            _ => None,
        }
    }
}

/// Sparse, ordered map of panel key to status text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusPanel<K: PanelKey> {
    entries: BTreeMap<K, String>,
}

pub type SerologyPanel = StatusPanel<SerologyTest>;
pub type VaccinePanel = StatusPanel<Vaccine>;

impl<K: PanelKey> Default for StatusPanel<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: PanelKey> StatusPanel<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a status, dropping the key when the text is blank.
    pub fn set(&mut self, key: K, status: impl Into<String>) {
        let status = status.into();
        let status = status.trim();
        if status.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, status.to_owned());
        }
    }

    pub fn with(mut self, key: K, status: impl Into<String>) -> Self {
        self.set(key, status);
        self
    }

    pub fn get(&self, key: K) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    /// True when the key holds a non-blank, non-pending result.
    pub fn is_recorded(&self, key: K) -> bool {
        self.get(key).is_some_and(is_recorded_status)
    }

    /// True when at least one key has any (non-blank) status, pending included.
    pub fn has_any_value(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Entries in clinical display order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Parses panel JSON text such as `{"hiv": "NEGATIVE"}`.
    ///
    /// Malformed JSON or a non-object value yields an empty panel and a warning;
    /// unknown keys are skipped and scalar values are stringified.
    pub fn parse_lenient(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(map)) => {
                let mut panel = Self::default();
                for (key, value) in map {
                    panel.insert_raw(&key, &value);
                }
                panel
            }
            Ok(other) => {
                tracing::warn!("ignoring status panel that is not a JSON object: {}", other);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("ignoring malformed status panel JSON: {}", e);
                Self::default()
            }
        }
    }

    fn insert_raw(&mut self, key: &str, value: &serde_json::Value) {
        let Some(panel_key) = K::from_key(key) else {
            tracing::debug!("skipping unknown status panel key {:?}", key);
            return;
        };
        let status = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                tracing::debug!("skipping non-scalar status for {:?}: {}", key, other);
                return;
            }
        };
        self.set(panel_key, status);
    }
}

impl<K: PanelKey> Serialize for StatusPanel<K> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, status) in &self.entries {
            map.serialize_entry(key.key(), status)?;
        }
        map.end()
    }
}

impl<'de, K: PanelKey> Deserialize<'de> for StatusPanel<K> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<BTreeMap<String, Option<String>>>::deserialize(deserializer)?;
        let mut panel = Self::default();
        for (key, status) in raw.unwrap_or_default() {
            match K::from_key(&key) {
                Some(k) => panel.set(k, status.unwrap_or_default()),
                None => tracing::debug!("skipping unknown status panel key {:?}", key),
            }
        }
        Ok(panel)
    }
}

/// Returns the keys of `K` recorded in at least one of the panels.
///
/// A result in any visit counts, even if a later visit marks the key pending again.
pub fn recorded_in_any<'a, K: PanelKey>(
    panels: impl IntoIterator<Item = &'a StatusPanel<K>>,
) -> Vec<K> {
    let panels: Vec<&StatusPanel<K>> = panels.into_iter().collect();
    K::ALL
        .iter()
        .copied()
        .filter(|key| panels.iter().any(|panel| panel.is_recorded(*key)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_blank_are_not_results() {
        assert!(!is_recorded_status(""));
        assert!(!is_recorded_status("   "));
        assert!(!is_recorded_status("PENDING"));
        assert!(!is_recorded_status("pending"));
        assert!(!is_recorded_status("PENDENTE"));
        assert!(is_recorded_status("NEGATIVE"));
        assert!(is_recorded_status("REACTIVE"));
    }

    #[test]
    fn lenient_parse_reads_known_keys() {
        let panel = SerologyPanel::parse_lenient(r#"{"hiv": "NEGATIVE", "vdrl": "PENDING", "xyz": "?"}"#);
        assert_eq!(panel.get(SerologyTest::Hiv), Some("NEGATIVE"));
        assert!(panel.is_recorded(SerologyTest::Hiv));
        assert!(!panel.is_recorded(SerologyTest::Vdrl));
        assert_eq!(panel.get(SerologyTest::Hcv), None);
        assert_eq!(panel.iter().count(), 2);
    }

    #[test]
    fn lenient_parse_absorbs_malformed_json() {
        assert_eq!(SerologyPanel::parse_lenient("{hiv: NEG"), SerologyPanel::default());
        assert_eq!(VaccinePanel::parse_lenient("[1, 2]"), VaccinePanel::default());
        assert_eq!(VaccinePanel::parse_lenient(""), VaccinePanel::default());
    }

    #[test]
    fn legacy_vaccine_keys_are_accepted() {
        let panel = VaccinePanel::parse_lenient(r#"{"dtpa": "DONE", "hepatiteB": "DOSE 2", "influenza": 1}"#);
        assert_eq!(panel.get(Vaccine::Tdap), Some("DONE"));
        assert_eq!(panel.get(Vaccine::HepatitisB), Some("DOSE 2"));
        assert_eq!(panel.get(Vaccine::Influenza), Some("1"));
    }

    #[test]
    fn iteration_follows_clinical_order() {
        let panel = SerologyPanel::new()
            .with(SerologyTest::Vdrl, "NR")
            .with(SerologyTest::Hiv, "NR")
            .with(SerologyTest::Hcv, "NR");
        let keys: Vec<_> = panel.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![SerologyTest::Hiv, SerologyTest::Hcv, SerologyTest::Vdrl]);
    }

    #[test]
    fn blank_values_are_dropped() {
        let mut panel = VaccinePanel::new().with(Vaccine::Tdap, "DONE");
        panel.set(Vaccine::Tdap, "  ");
        assert!(!panel.has_any_value());
    }

    #[test]
    fn yaml_round_trip_uses_storage_keys() {
        let panel = VaccinePanel::new().with(Vaccine::HepatitisB, "DONE");
        let yaml = serde_yaml::to_string(&panel).unwrap();
        assert!(yaml.contains("hepatitis_b: DONE"));
        let back: VaccinePanel = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, panel);
    }

    #[test]
    fn any_visit_satisfies_a_key() {
        let first = SerologyPanel::new().with(SerologyTest::Hiv, "NEGATIVE");
        let second = SerologyPanel::new()
            .with(SerologyTest::Hiv, "PENDING")
            .with(SerologyTest::Vdrl, "NR");
        let recorded = recorded_in_any([&first, &second]);
        assert_eq!(recorded, vec![SerologyTest::Hiv, SerologyTest::Vdrl]);
    }
}
