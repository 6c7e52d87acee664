//! # Prenatal Core
//!
//! Core logic for the prenatal-care tracking system.
//!
//! The heart of the crate is a set of pure date and rule computations:
//! - gestational age and trimester from the last menstrual period ([`gestation`])
//! - follow-up cadence and next-due date ([`cadence`])
//! - outstanding serology, vaccine and exam actions ([`pendency`]) against a rule table ([`rules`])
//! - the plain-text visit note ([`note`])
//! - per-patient monitoring snapshots ([`monitoring`])
//!
//! Around them sit the store interfaces ([`repositories`]) with in-memory and file-backed
//! implementations, and [`PrenatalService`], which orchestrates visit recording, the nightly
//! monitoring refresh and audit-log housekeeping.
//!
//! **No process concerns**: environment variables, scheduling and command-line parsing belong in
//! the `prenatal` CLI and the `prenatal-run` scheduler.

pub mod audit;
pub mod cadence;
pub mod clinical;
pub mod config;
pub mod constants;
pub mod dates;
pub mod error;
pub mod gestation;
pub mod monitoring;
pub mod note;
pub mod patient;
pub mod pendency;
pub mod repositories;
pub mod rules;
pub mod service;
pub mod visit;

pub use config::CoreConfig;
pub use error::{PrenatalError, PrenatalResult};
pub use prenatal_types::{IdError, NonEmptyText, PatientId, TextError, VisitId};
pub use service::{PrenatalService, RecordedVisit};
