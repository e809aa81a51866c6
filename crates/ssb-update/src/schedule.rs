//! Throttled remote release checks and what to do with a newer release.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ssb_core::{
    compare_versions, AppInstance, Dialog, DialogPresenter, DialogResponse, ProcessLauncher,
};
use ssb_store::{
    read_update_check_record, write_atomic, write_update_check_record, UpdateCheckRecord,
    FATAL_ERROR_PREFIX,
};
use tracing::{info, warn};

use crate::remote::{RemoteCheckError, RemoteChecker, RemoteRelease};

pub const CHECK_INTERVAL_SECS: u64 = 2 * 24 * 60 * 60;
pub const RETRY_INTERVAL_SECS: u64 = 24 * 60 * 60;

const OPEN_COMMAND: &str = "/usr/bin/open";

/// How a newer release is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMode {
    /// Write `update-result.json` for the caller to present.
    Handoff,
    /// Ask the user directly.
    Dialog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCheckOutcome {
    /// An earlier fatal error turned checking off.
    Disabled { reason: String },
    NotDue { due_at_unix: u64 },
    UpToDate,
    Found {
        release: RemoteRelease,
        response: Option<RemoteResponse>,
    },
    /// `report` is false when the same error was already shown.
    Failed { message: String, fatal: bool, report: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteResponse {
    Download,
    Later,
    Ignore,
}

pub struct RemoteUpdateCheck<'a> {
    pub record_path: PathBuf,
    pub result_path: PathBuf,
    pub mode: RemoteMode,
    pub checker: &'a dyn RemoteChecker,
    pub presenter: &'a dyn DialogPresenter,
    pub launcher: &'a dyn ProcessLauncher,
}

impl RemoteUpdateCheck<'_> {
    /// Checks the feed if due and records when to check next.
    ///
    /// A missing or unreadable record always forces a check.
    #[tracing::instrument(skip_all, fields(app = %app.id))]
    pub fn run(&self, app: &AppInstance, now_unix: u64) -> Result<RemoteCheckOutcome> {
        let previous = read_update_check_record(&self.record_path);
        if let Some(previous) = &previous {
            if let Some(reason) = previous.fatal_error() {
                warn!("remote update checks are disabled: {reason}");
                return Ok(RemoteCheckOutcome::Disabled {
                    reason: reason.to_string(),
                });
            }
            if !previous.is_due(now_unix) {
                return Ok(RemoteCheckOutcome::NotDue {
                    due_at_unix: previous.due_at_unix,
                });
            }
        }
        let previous = previous.unwrap_or_default();
        let mut record = UpdateCheckRecord {
            due_at_unix: now_unix + CHECK_INTERVAL_SECS,
            downloaded_version: previous.downloaded_version.clone(),
            last_error: None,
        };

        let outcome = match self.checker.latest_release() {
            Ok(Some(release)) if self.is_news(app, &previous, &release) => {
                let response = self.surface(&release)?;
                if matches!(
                    response,
                    Some(RemoteResponse::Download | RemoteResponse::Ignore)
                ) {
                    record.downloaded_version = Some(release.version.clone());
                }
                info!(version = %release.version, ?response, "newer release available");
                RemoteCheckOutcome::Found { release, response }
            }
            Ok(_) => RemoteCheckOutcome::UpToDate,
            Err(RemoteCheckError::Transient(message)) => {
                record.due_at_unix = now_unix + RETRY_INTERVAL_SECS;
                let report = previous.last_error.as_deref() != Some(message.as_str());
                warn!(report, "remote update check failed: {message}");
                record.last_error = Some(message.clone());
                RemoteCheckOutcome::Failed {
                    message,
                    fatal: false,
                    report,
                }
            }
            Err(RemoteCheckError::Fatal(message)) => {
                record.due_at_unix = now_unix + RETRY_INTERVAL_SECS;
                warn!("remote update check failed permanently: {message}");
                record.last_error = Some(format!("{FATAL_ERROR_PREFIX} {message}"));
                RemoteCheckOutcome::Failed {
                    message,
                    fatal: true,
                    report: true,
                }
            }
        };

        write_update_check_record(&self.record_path, &record)?;
        Ok(outcome)
    }

    fn is_news(&self, app: &AppInstance, previous: &UpdateCheckRecord, release: &RemoteRelease) -> bool {
        let newer_than_app = compare_versions(&release.version, app.version.as_str()).is_gt();
        let newer_than_seen = previous
            .downloaded_version
            .as_deref()
            .map_or(true, |seen| compare_versions(&release.version, seen).is_gt());
        newer_than_app && newer_than_seen && !app.is_ignoring(&release.version)
    }

    fn surface(&self, release: &RemoteRelease) -> Result<Option<RemoteResponse>> {
        match self.mode {
            RemoteMode::Handoff => {
                let rendered = serde_json::to_vec_pretty(release)
                    .context("failed to render update result")?;
                write_atomic(&self.result_path, &rendered)?;
                Ok(None)
            }
            RemoteMode::Dialog => {
                let dialog = Dialog::new(
                    "New version available",
                    format!(
                        "Version {} is available for download.\n\n{}",
                        release.version,
                        release.notes.trim()
                    ),
                    &["Download", "Later", "Ignore This Version"],
                );
                let response = match self.presenter.present(&dialog)? {
                    DialogResponse::Button(0) => RemoteResponse::Download,
                    DialogResponse::Button(2) => RemoteResponse::Ignore,
                    DialogResponse::Button(_) | DialogResponse::Cancelled => RemoteResponse::Later,
                };
                if response == RemoteResponse::Download && !release.url.is_empty() {
                    self.launcher
                        .launch(Path::new(OPEN_COMMAND), &[release.url.clone()])
                        .context("failed to open the download page")?;
                }
                Ok(Some(response))
            }
        }
    }
}
