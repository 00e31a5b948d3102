//! One report run, end to end: fetch, format, dispatch.

use crate::config::Config;
use crate::db::{PostingsSource, StoreError};
use crate::graph::{GraphClient, MailError};
use crate::notify;
use crate::report::{self, FormattingError};
use chrono::Utc;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// What a run produced, for the caller to log or serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub count: usize,
    pub skipped: usize,
    /// False when the batch was empty and no email went out.
    pub email_sent: bool,
}

#[derive(Debug)]
pub enum RunError {
    Store(StoreError),
    Formatting(FormattingError),
    Mail(MailError),
}

impl From<StoreError> for RunError {
    fn from(e: StoreError) -> RunError {
        RunError::Store(e)
    }
}

impl From<FormattingError> for RunError {
    fn from(e: FormattingError) -> RunError {
        RunError::Formatting(e)
    }
}

impl From<MailError> for RunError {
    fn from(e: MailError) -> RunError {
        RunError::Mail(e)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Store(e) => Some(e),
            RunError::Formatting(e) => Some(e),
            RunError::Mail(e) => Some(e),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunError::Store(e) => write!(f, "{}", e),
            RunError::Formatting(e) => write!(f, "{}", e),
            RunError::Mail(e) => write!(f, "{}", e),
        }
    }
}

/// Runs the whole pipeline once. An empty batch is a success that sends
/// nothing; every failure is returned, never swallowed.
pub async fn run(
    store: &dyn PostingsSource,
    graph: &GraphClient,
    config: &Config,
    artifact_dir: Option<&Path>,
) -> Result<RunSummary, RunError> {
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, "starting report run");

    let records = store.fetch_all().await?;
    tracing::info!(%run_id, fetched = records.len(), "fetched postings");

    let report = report::build_report(&records, config.on_malformed, Utc::now())?;
    if report.skipped > 0 {
        tracing::warn!(%run_id, skipped = report.skipped, "dropped malformed postings");
    }

    if let Some(dir) = artifact_dir {
        let path = dir.join(notify::attachment_name(report.generated_at.date_naive()));
        match std::fs::write(&path, &report.workbook) {
            Ok(()) => tracing::info!(%run_id, path = %path.display(), "wrote workbook"),
            Err(e) => {
                // Keeping a local copy is best effort; the email still goes out.
                tracing::warn!(%run_id, path = %path.display(), "could not write workbook: {e}");
            }
        }
    }

    if report.count == 0 {
        tracing::info!(%run_id, "no postings to report, skipping email");
        return Ok(RunSummary {
            count: 0,
            skipped: report.skipped,
            email_sent: false,
        });
    }

    notify::send_report(graph, &report, config).await?;
    tracing::info!(
        %run_id,
        count = report.count,
        recipient = %config.recipient_email,
        "report email sent"
    );

    Ok(RunSummary {
        count: report.count,
        skipped: report.skipped,
        email_sent: true,
    })
}
