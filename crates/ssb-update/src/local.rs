//! Switching an app to a newer runtime install found on disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Result};
use ssb_core::{
    AppInstance, Dialog, DialogPresenter, DialogResponse, LaunchedProcess, LifecycleError,
    ProcessLauncher,
};
use ssb_runtime::RuntimeInstance;
use ssb_store::is_executable;
use tracing::info;

pub const UPDATER_EXECUTABLE: &str = "ssb-update";

/// The user's standing choice for local runtime updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateAction {
    Never,
    Auto,
    #[default]
    Ask,
}

impl UpdateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Auto => "auto",
            Self::Ask => "ask",
        }
    }
}

impl FromStr for UpdateAction {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "never" => Ok(Self::Never),
            "auto" => Ok(Self::Auto),
            "ask" | "" => Ok(Self::Ask),
            other => Err(anyhow!("invalid update action: {other}")),
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDecision {
    Skip,
    Apply,
    Later,
    Ignore,
}

const BUTTON_UPDATE: usize = 0;
const BUTTON_IGNORE: usize = 2;

/// Applies the policy to `candidate`. Choosing "ignore" adds its version to the app's ignore list.
pub fn decide_local_update(
    app: &mut AppInstance,
    candidate: &RuntimeInstance,
    action: UpdateAction,
    presenter: &dyn DialogPresenter,
) -> Result<LocalDecision> {
    match action {
        UpdateAction::Never => return Ok(LocalDecision::Skip),
        UpdateAction::Auto if candidate.version.major() == app.version.major() => {
            info!(version = %candidate.version, "applying same-major update automatically");
            return Ok(LocalDecision::Apply);
        }
        UpdateAction::Auto | UpdateAction::Ask => {}
    }

    let dialog = update_dialog(app, candidate);
    let decision = match presenter.present(&dialog)? {
        DialogResponse::Button(BUTTON_UPDATE) => LocalDecision::Apply,
        DialogResponse::Button(BUTTON_IGNORE) => {
            app.ignore_update(candidate.version.as_str());
            LocalDecision::Ignore
        }
        DialogResponse::Button(_) | DialogResponse::Cancelled => LocalDecision::Later,
    };
    info!(version = %candidate.version, ?decision, "local update decision");
    Ok(decision)
}

fn update_dialog(app: &AppInstance, candidate: &RuntimeInstance) -> Dialog {
    let mut message = format!(
        "{} can be updated from version {} to {}.",
        app.name, app.version, candidate.version
    );
    for (heading, items) in [("Changes", &candidate.changes), ("Fixes", &candidate.fixes)] {
        if items.is_empty() {
            continue;
        }
        message.push_str(&format!("\n\n{heading}:"));
        for item in items {
            message.push_str(&format!("\n  - {item}"));
        }
    }
    Dialog::new(
        "Update available",
        message,
        &["Update", "Later", "Ignore This Version"],
    )
}

pub fn updater_path(runtime: &Path) -> PathBuf {
    runtime
        .join("Contents")
        .join("MacOS")
        .join(UPDATER_EXECUTABLE)
}

/// Hands the app over to the candidate runtime's updater.
pub fn apply_local_update(
    candidate: &RuntimeInstance,
    app_bundle: &Path,
    launcher: &dyn ProcessLauncher,
) -> Result<LaunchedProcess> {
    if !candidate.path.is_dir() {
        return Err(LifecycleError::fatal(format!(
            "runtime {} disappeared before the update could run",
            candidate.path.display()
        ))
        .into());
    }
    let updater = updater_path(&candidate.path);
    if !is_executable(&updater) {
        return Err(LifecycleError::fatal(format!(
            "runtime {} has no runnable updater at {}",
            candidate.version,
            updater.display()
        ))
        .into());
    }
    let args = vec!["--app".to_string(), app_bundle.display().to_string()];
    let process = launcher.launch(&updater, &args)?;
    info!(pid = process.pid, version = %candidate.version, "handed off to runtime updater");
    Ok(process)
}
