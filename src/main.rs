use anyhow::Context;
use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime, Weekday};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prenatal_core::PrenatalService;
use prenatal_core::config::{ConfigValues, hour_from_env_value};
use prenatal_core::constants::{DEFAULT_CLEANUP_HOUR, DEFAULT_REFRESH_HOUR};

/// Scheduled maintenance jobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Job {
    /// Moves every monitoring snapshot's gestational fields forward to today.
    Refresh,
    /// Removes audit entries older than the retention period.
    Cleanup,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Refresh => f.write_str("monitoring refresh"),
            Job::Cleanup => f.write_str("audit cleanup"),
        }
    }
}

/// Main entry point for the prenatal scheduler
///
/// Runs the monitoring refresh every day and the audit-log cleanup every Sunday,
/// in local time, until interrupted with Ctrl-C.
///
/// # Environment Variables
/// - `PRENATAL_DATA_DIR`: Directory for patient data storage (default: "prenatal_data")
/// - `PRENATAL_RULES_FILE`: Rule table override (default: bundled `rules/prenatal-rules.yaml`)
/// - `PRENATAL_AUDIT_RETENTION_DAYS`: Audit retention in days (default: 90)
/// - `PRENATAL_ACTOR`: Name written into audit entries (default: "system")
/// - `PRENATAL_REFRESH_HOUR`: Hour of the daily refresh (default: 3)
/// - `PRENATAL_CLEANUP_HOUR`: Hour of the Sunday cleanup (default: 2)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prenatal_run=info".parse()?)
                .add_directive("prenatal_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(
        ConfigValues {
            data_dir: std::env::var("PRENATAL_DATA_DIR").ok(),
            rules_file: std::env::var("PRENATAL_RULES_FILE").ok(),
            audit_retention_days: std::env::var("PRENATAL_AUDIT_RETENTION_DAYS").ok(),
            actor: std::env::var("PRENATAL_ACTOR").ok(),
        }
        .resolve()?,
    );
    let refresh_at = time_of_day(hour_from_env_value(
        std::env::var("PRENATAL_REFRESH_HOUR").ok(),
        DEFAULT_REFRESH_HOUR,
    )?)?;
    let cleanup_at = time_of_day(hour_from_env_value(
        std::env::var("PRENATAL_CLEANUP_HOUR").ok(),
        DEFAULT_CLEANUP_HOUR,
    )?)?;

    tracing::info!("++ Prenatal data in {}", cfg.data_dir().display());
    tracing::info!("++ Rule table {}", cfg.rules_file().display());

    let service = Arc::new(PrenatalService::with_file_stores(cfg)?);

    loop {
        let now = Local::now().naive_local();
        let (at, jobs) = next_jobs(now, refresh_at, cleanup_at);
        let wait = (at - now).to_std().unwrap_or_default();
        tracing::info!("next run at {}: {:?}", at, jobs);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                for job in jobs {
                    run_job(Arc::clone(&service), job).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("-- Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn time_of_day(hour: u32) -> anyhow::Result<NaiveTime> {
    NaiveTime::from_hms_opt(hour, 0, 0).with_context(|| format!("invalid hour {}", hour))
}

/// First moment strictly after `now` at `at`, optionally restricted to one weekday.
fn next_run(now: NaiveDateTime, at: NaiveTime, weekday: Option<Weekday>) -> NaiveDateTime {
    let mut candidate = now.date().and_time(at);
    while candidate <= now || weekday.is_some_and(|day| candidate.weekday() != day) {
        candidate += Duration::days(1);
    }
    candidate
}

/// The jobs due soonest, in run order. Both run when they share a slot, cleanup first.
fn next_jobs(
    now: NaiveDateTime,
    refresh_at: NaiveTime,
    cleanup_at: NaiveTime,
) -> (NaiveDateTime, Vec<Job>) {
    let refresh = next_run(now, refresh_at, None);
    let cleanup = next_run(now, cleanup_at, Some(Weekday::Sun));
    match cleanup.cmp(&refresh) {
        Ordering::Less => (cleanup, vec![Job::Cleanup]),
        Ordering::Equal => (cleanup, vec![Job::Cleanup, Job::Refresh]),
        Ordering::Greater => (refresh, vec![Job::Refresh]),
    }
}

/// Runs a job on the blocking pool; failures are logged and the schedule continues.
async fn run_job(service: Arc<PrenatalService>, job: Job) {
    let result = tokio::task::spawn_blocking(move || match job {
        Job::Refresh => service
            .refresh_monitoring(Local::now().date_naive())
            .map(|summary| {
                format!(
                    "{} updated, {} skipped, {} failed",
                    summary.updated, summary.skipped, summary.failed
                )
            }),
        Job::Cleanup => service
            .cleanup_audit_log(chrono::Utc::now())
            .map(|removed| format!("{} entries removed", removed)),
    })
    .await;

    match result {
        Ok(Ok(outcome)) => tracing::info!("{} finished: {}", job, outcome),
        Ok(Err(e)) => tracing::error!("{} failed: {}", job, e),
        Err(e) => tracing::error!("{} task panicked: {}", job, e),
    }
}
