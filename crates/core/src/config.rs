//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The library never reads process-wide environment variables while
//! handling a request; binaries read them once and build a [`CoreConfig`].

use crate::constants::{
    DEFAULT_ACTOR, DEFAULT_AUDIT_RETENTION_DAYS, DEFAULT_DATA_DIR, DEFAULT_RULES_FILE,
};
use crate::{PrenatalError, PrenatalResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    rules_file: PathBuf,
    audit_retention_days: u32,
    actor: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::InvalidInput` if `actor` is blank.
    pub fn new(
        data_dir: PathBuf,
        rules_file: PathBuf,
        audit_retention_days: u32,
        actor: String,
    ) -> PrenatalResult<Self> {
        let actor = actor.trim().to_owned();
        if actor.is_empty() {
            return Err(PrenatalError::InvalidInput("actor cannot be empty".into()));
        }

        Ok(Self {
            data_dir,
            rules_file,
            audit_retention_days,
            actor,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn rules_file(&self) -> &Path {
        &self.rules_file
    }

    pub fn audit_retention_days(&self) -> u32 {
        self.audit_retention_days
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}

/// Resolve the rule table file without reading environment variables.
///
/// If `override_file` is provided, it must be an existing file. Otherwise this searches for
/// `rules/prenatal-rules.yaml` relative to the current working directory and then walks up from
/// `CARGO_MANIFEST_DIR`.
pub fn resolve_rules_file(override_file: Option<PathBuf>) -> PrenatalResult<PathBuf> {
    if let Some(rules_file) = override_file {
        if rules_file.is_file() {
            return Ok(rules_file);
        }
        return Err(PrenatalError::InvalidInput(format!(
            "PRENATAL_RULES_FILE override {} is not a file",
            rules_file.display()
        )));
    }

    let cwd_relative = PathBuf::from(DEFAULT_RULES_FILE);
    if cwd_relative.is_file() {
        return Ok(cwd_relative);
    }

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for ancestor in manifest_dir.ancestors() {
        let candidate = ancestor.join(DEFAULT_RULES_FILE);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(PrenatalError::InvalidInput(format!(
        "could not locate {}",
        DEFAULT_RULES_FILE
    )))
}

/// Raw startup values, typically read from `PRENATAL_*` environment variables by a binary.
#[derive(Clone, Debug, Default)]
pub struct ConfigValues {
    pub data_dir: Option<String>,
    pub rules_file: Option<String>,
    pub audit_retention_days: Option<String>,
    pub actor: Option<String>,
}

impl ConfigValues {
    /// Resolve the values into a [`CoreConfig`], applying defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `PrenatalError::InvalidInput` if the rule table cannot be located or the
    /// retention period is not a whole number of days.
    pub fn resolve(self) -> PrenatalResult<CoreConfig> {
        let data_dir = non_blank(self.data_dir).unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let rules_file = resolve_rules_file(non_blank(self.rules_file).map(PathBuf::from))?;
        let retention = retention_days_from_env_value(self.audit_retention_days)?;
        let actor = non_blank(self.actor).unwrap_or_else(|| DEFAULT_ACTOR.into());
        CoreConfig::new(PathBuf::from(data_dir), rules_file, retention, actor)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the audit retention period from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default of 90 days.
pub fn retention_days_from_env_value(value: Option<String>) -> PrenatalResult<u32> {
    match non_blank(value) {
        None => Ok(DEFAULT_AUDIT_RETENTION_DAYS),
        Some(v) => v.parse::<u32>().map_err(|e| {
            PrenatalError::InvalidInput(format!("invalid audit retention days {:?}: {}", v, e))
        }),
    }
}

/// Parse an hour of day (0-23) from an optional string value, falling back to `default`.
pub fn hour_from_env_value(value: Option<String>, default: u32) -> PrenatalResult<u32> {
    let Some(v) = non_blank(value) else {
        return Ok(default);
    };
    match v.parse::<u32>() {
        Ok(hour) if hour < 24 => Ok(hour),
        _ => Err(PrenatalError::InvalidInput(format!(
            "invalid hour of day {:?}, expected 0-23",
            v
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn blank_actor_is_rejected() {
        let err = CoreConfig::new("data".into(), "rules.yaml".into(), 90, "  ".into()).unwrap_err();
        assert!(matches!(err, PrenatalError::InvalidInput(_)));
    }

    #[test]
    fn retention_defaults_and_parses() {
        assert_eq!(retention_days_from_env_value(None).unwrap(), 90);
        assert_eq!(retention_days_from_env_value(Some("  ".into())).unwrap(), 90);
        assert_eq!(retention_days_from_env_value(Some("30".into())).unwrap(), 30);
        assert!(retention_days_from_env_value(Some("ninety".into())).is_err());
    }

    #[test]
    fn hours_must_fall_within_a_day() {
        assert_eq!(hour_from_env_value(None, 3).unwrap(), 3);
        assert_eq!(hour_from_env_value(Some("0".into()), 3).unwrap(), 0);
        assert_eq!(hour_from_env_value(Some(" 23 ".into()), 3).unwrap(), 23);
        assert!(hour_from_env_value(Some("24".into()), 3).is_err());
        assert!(hour_from_env_value(Some("-1".into()), 3).is_err());
    }

    #[test]
    fn rules_file_override_must_exist() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("rules.yaml");
        assert!(resolve_rules_file(Some(path.clone())).is_err());

        std::fs::write(&path, "[]").unwrap();
        assert_eq!(resolve_rules_file(Some(path.clone())).unwrap(), path);
    }

    #[test]
    fn unset_values_fall_back_to_defaults() {
        let cfg = ConfigValues {
            actor: Some("  ".into()),
            ..ConfigValues::default()
        }
        .resolve()
        .expect("defaults resolve");
        assert_eq!(cfg.data_dir(), Path::new(DEFAULT_DATA_DIR));
        assert_eq!(cfg.actor(), DEFAULT_ACTOR);
        assert_eq!(cfg.audit_retention_days(), DEFAULT_AUDIT_RETENTION_DAYS);
    }

    #[test]
    fn bundled_rules_file_is_found() {
        let resolved = resolve_rules_file(None).expect("bundled rule table");
        assert!(resolved.ends_with(DEFAULT_RULES_FILE));
    }
}
