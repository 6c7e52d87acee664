//! Constants used throughout the prenatal core crate.
//!
//! Path and filename constants live here so the file stores and configuration agree
//! on the on-disk layout.

/// Default directory for prenatal data when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "prenatal_data";

/// Rule table location searched relative to the working directory and manifest ancestors.
pub const DEFAULT_RULES_FILE: &str = "rules/prenatal-rules.yaml";

/// Directory name for patient records (one subdirectory per patient).
pub const PATIENTS_DIR_NAME: &str = "patients";

/// Directory name for a patient's visits, inside the patient directory.
pub const VISITS_DIR_NAME: &str = "visits";

/// Directory name for monitoring snapshots.
pub const MONITORING_DIR_NAME: &str = "monitoring";

/// Filename for the patient record.
pub const PATIENT_FILENAME: &str = "patient.yaml";

/// Last patient sequence number handed out, in the data directory.
pub const PATIENT_SEQUENCE_FILENAME: &str = "patient-sequence.yaml";

/// Last visit sequence number handed out, in the data directory.
pub const VISIT_SEQUENCE_FILENAME: &str = "visit-sequence.yaml";

/// Filename for the JSON-lines audit log.
pub const AUDIT_LOG_FILENAME: &str = "audit.jsonl";

/// Audit entries older than this many days are removed by the weekly cleanup.
pub const DEFAULT_AUDIT_RETENTION_DAYS: u32 = 90;

/// Actor written into audit entries when none is configured.
pub const DEFAULT_ACTOR: &str = "system";

/// Hour of day (local time) for the nightly monitoring refresh.
pub const DEFAULT_REFRESH_HOUR: u32 = 3;

/// Hour of day (local time) for the Sunday audit-log cleanup.
pub const DEFAULT_CLEANUP_HOUR: u32 = 2;
