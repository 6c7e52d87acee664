use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use prenatal_core::cadence::{parse_cadence_override, Cadence};
use prenatal_core::config::ConfigValues;
use prenatal_core::dates::{format_optional_date, parse_local_date};
use prenatal_core::gestation::GestationalAge;
use prenatal_core::patient::{NewPatient, PatientUpdate};
use prenatal_core::visit::{ProfessionalRole, VisitPayload};
use prenatal_core::{PatientId, PrenatalError, PrenatalService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "prenatal")]
#[command(about = "Prenatal care tracking CLI")]
struct Cli {
    /// Treat this date (DD/MM/YYYY) as today
    #[arg(long, global = true)]
    today: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new patient
    Register {
        /// Full name
        name: String,
        #[command(flatten)]
        fields: PatientFields,
    },
    /// Edit a patient; blank values clear a field
    Edit {
        /// Patient id (PN-000001)
        id: String,
        /// New full name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: PatientFields,
    },
    /// Delete a patient with their visits and monitoring snapshot; the id is not reused
    Delete {
        /// Patient id
        id: String,
    },
    /// Search patients by id or name
    Search {
        /// Case-insensitive search term; empty lists everyone
        #[arg(default_value = "")]
        term: String,
    },
    /// Show a patient with visits and monitoring snapshot
    Show {
        /// Patient id
        id: String,
    },
    /// Record a visit from a JSON payload
    Visit {
        /// Patient id
        id: String,
        #[command(flatten)]
        payload: PayloadSource,
    },
    /// Preview the note for a JSON payload without storing it
    Note {
        /// Patient id
        id: String,
        #[command(flatten)]
        payload: PayloadSource,
    },
    /// List outstanding serology, vaccine and exam actions
    Pendencies {
        /// Patient id
        id: String,
    },
    /// Checklist and guidance for the patient's current week
    Guidance {
        /// Patient id
        id: String,
        /// Attending role (PHYSICIAN or NURSE)
        #[arg(long)]
        role: Option<String>,
    },
    /// Gestational age for a last menstrual period
    Ga {
        /// Last menstrual period (DD/MM/YYYY)
        lmp: String,
    },
    /// Recommended follow-up interval for a gestational week
    Cadence {
        /// Completed gestational weeks
        weeks: u32,
        /// Clinician-chosen interval in days
        #[arg(long = "override")]
        override_days: Option<String>,
    },
    /// List monitoring snapshots
    Monitoring {
        /// Only patients whose next visit is due
        #[arg(long)]
        overdue: bool,
    },
    /// Run the monitoring refresh now
    Refresh,
    /// Remove audit entries past the retention period
    CleanupLogs,
}

#[derive(Args)]
struct PatientFields {
    /// Date of birth (DD/MM/YYYY)
    #[arg(long)]
    birth_date: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    /// Last menstrual period (DD/MM/YYYY)
    #[arg(long)]
    lmp: Option<String>,
    /// Ultrasound due date (DD/MM/YYYY)
    #[arg(long)]
    usg_due_date: Option<String>,
    /// HABITUAL or HIGH
    #[arg(long)]
    risk: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PayloadSource {
    /// Visit payload as inline JSON
    #[arg(long)]
    payload: Option<String>,
    /// Path to a JSON file holding the visit payload
    #[arg(long)]
    payload_file: Option<PathBuf>,
}

impl PayloadSource {
    fn load(&self) -> anyhow::Result<VisitPayload> {
        let text = match (&self.payload, &self.payload_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => bail!("either --payload or --payload-file is required"),
        };
        serde_json::from_str(&text).context("invalid visit payload JSON")
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prenatal_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let today = resolve_today(cli.today.as_deref())?;

    // Pure calculations need no storage.
    match &cli.command {
        Commands::Ga { lmp } => {
            let lmp = required_date("lmp", lmp)?;
            match GestationalAge::calculate(Some(lmp), today) {
                Some(ga) => println!("{} ({})", ga.formatted(), ga.trimester().label()),
                None => println!("No gestational age: LMP is after today."),
            }
            return Ok(());
        }
        Commands::Cadence {
            weeks,
            override_days,
        } => {
            let override_days = override_days.as_deref().and_then(parse_cadence_override);
            let cadence = Cadence::calculate(*weeks, override_days);
            println!("{} days ({})", cadence.interval_days, cadence.label.as_str());
            return Ok(());
        }
        _ => {}
    }

    let cfg = Arc::new(
        ConfigValues {
            data_dir: std::env::var("PRENATAL_DATA_DIR").ok(),
            rules_file: std::env::var("PRENATAL_RULES_FILE").ok(),
            audit_retention_days: std::env::var("PRENATAL_AUDIT_RETENTION_DAYS").ok(),
            actor: std::env::var("PRENATAL_ACTOR").ok(),
        }
        .resolve()?,
    );
    let service = PrenatalService::with_file_stores(cfg)?;

    match cli.command {
        Commands::Register { name, fields } => {
            let patient = service.register_patient(NewPatient {
                name,
                birth_date: fields.birth_date,
                phone: fields.phone,
                lmp: fields.lmp,
                usg_due_date: fields.usg_due_date,
                risk: fields.risk,
                notes: fields.notes,
            })?;
            println!("Registered {} ({})", patient.id, patient.name);
        }
        Commands::Edit { id, name, fields } => {
            let id = PatientId::parse(&id)?;
            let patient = service.update_patient(
                &id,
                PatientUpdate {
                    name,
                    birth_date: fields.birth_date,
                    phone: fields.phone,
                    lmp: fields.lmp,
                    usg_due_date: fields.usg_due_date,
                    risk: fields.risk,
                    notes: fields.notes,
                },
                today,
            )?;
            println!("Updated {} ({})", patient.id, patient.name);
        }
        Commands::Delete { id } => {
            let id = PatientId::parse(&id)?;
            service.delete_patient(&id)?;
            println!("Deleted {}", id);
        }
        Commands::Search { term } => {
            let patients = service.search_patients(&term)?;
            if patients.is_empty() {
                println!("No patients found.");
            }
            for patient in patients {
                println!(
                    "{}  {}  LMP: {}  Risk: {}",
                    patient.id,
                    patient.name,
                    format_optional_date(patient.lmp),
                    patient.risk.as_str()
                );
            }
        }
        Commands::Show { id } => {
            let id = PatientId::parse(&id)?;
            let patient = service.get_patient(&id)?;
            let visits = service.visits(&id)?;
            let snapshot = service.monitoring_for(&id)?;
            let view = serde_json::json!({
                "patient": patient,
                "visits": visits,
                "monitoring": snapshot,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Visit { id, payload } => {
            let id = PatientId::parse(&id)?;
            let recorded = service.record_visit(&id, payload.load()?, today)?;
            println!("Saved visit {}", recorded.visit.id);
            println!();
            print!("{}", recorded.visit.note);
            if !recorded.snapshot.pendencies.is_empty() {
                println!();
                println!("Pending: {}", recorded.snapshot.pendencies);
            }
        }
        Commands::Note { id, payload } => {
            let id = PatientId::parse(&id)?;
            let payload = payload.load()?;
            let visit_type = payload.visit_type;
            print!("{}", service.compose_note(&id, &payload, visit_type, today)?);
        }
        Commands::Pendencies { id } => {
            let id = PatientId::parse(&id)?;
            // Unknown ids would otherwise look like a patient with nothing outstanding.
            service.get_patient(&id)?;
            let pendencies = service.derive_pendencies(&id, today)?;
            if pendencies.is_empty() {
                println!("Nothing outstanding.");
            }
            for pendency in pendencies {
                println!("{}", pendency);
            }
        }
        Commands::Guidance { id, role } => {
            let id = PatientId::parse(&id)?;
            let role = match role {
                Some(text) => Some(ProfessionalRole::parse(&text).ok_or_else(|| {
                    PrenatalError::InvalidInput(format!("unknown role {:?}", text))
                })?),
                None => None,
            };
            let guidance = service.guidance(&id, role, today)?;
            println!("CHECKLIST:");
            for item in &guidance.checklist {
                println!("- [{}] {}", item.category, item.text);
            }
            println!();
            println!("GUIDANCE:");
            for item in &guidance.guidance {
                println!("- [{}] {}", item.category, item.text);
            }
        }
        Commands::Monitoring { overdue } => {
            let snapshots = service.monitoring()?;
            let mut shown = 0;
            for snapshot in snapshots
                .iter()
                .filter(|s| !overdue || s.is_overdue(today))
            {
                shown += 1;
                println!(
                    "{}  {}  GA: {}  Next: {}  Pending: {}",
                    snapshot.patient_id,
                    snapshot.name,
                    snapshot.gestational_age.as_deref().unwrap_or("-"),
                    format_optional_date(snapshot.next_due),
                    snapshot.pendencies
                );
            }
            if shown == 0 {
                println!("No monitoring rows.");
            }
        }
        Commands::Refresh => {
            let summary = service.refresh_monitoring(today)?;
            println!(
                "Refreshed {} snapshots ({} skipped, {} failed)",
                summary.updated, summary.skipped, summary.failed
            );
        }
        Commands::CleanupLogs => {
            let removed = service.cleanup_audit_log(chrono::Utc::now())?;
            println!("Removed {} audit entries", removed);
        }
        Commands::Ga { .. } | Commands::Cadence { .. } => {}
    }

    Ok(())
}

fn resolve_today(text: Option<&str>) -> anyhow::Result<NaiveDate> {
    match text {
        Some(text) => required_date("today", text),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn required_date(field: &str, text: &str) -> anyhow::Result<NaiveDate> {
    parse_local_date(text).ok_or_else(|| {
        PrenatalError::InvalidDate(format!("{} must be DD/MM/YYYY, got {:?}", field, text)).into()
    })
}
