//! Profile cleanup when an app switches engines.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use ssb_core::{EngineType, ResetReason, RunStatus, WelcomeExtension};
use ssb_store::{ensure_within_roots, remove_path};
use tracing::{debug, info, warn};

pub const DEFAULT_PROFILE: &str = "Default";

/// What survives a switch between engine families.
pub const CROSS_FAMILY_KEEP: &[&str] = &[
    "Bookmarks",
    "Favicons",
    "History",
    "Local Extension Settings",
    "databases",
];

pub const LOGIN_DATA_FILES: &[&str] = &[
    "Login Data",
    "Login Data-journal",
    "Login Data For Account",
    "Login Data For Account-journal",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPolicy {
    CrossFamily,
    SameFamily,
}

impl MigrationPolicy {
    pub fn between(from: &EngineType, to: &EngineType) -> Self {
        if from.is_compatible_with(to) {
            Self::SameFamily
        } else {
            Self::CrossFamily
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub policy: MigrationPolicy,
    pub removed: Vec<PathBuf>,
    pub extensions: Vec<WelcomeExtension>,
    pub reset: Option<ResetReason>,
    pub extensions_lost: bool,
    /// Combined message for failures that did not stop the migration.
    pub problems: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileMigrator<'a> {
    profile_dir: &'a Path,
    data_root: &'a Path,
    home: &'a Path,
}

impl<'a> ProfileMigrator<'a> {
    pub fn new(profile_dir: &'a Path, data_root: &'a Path, home: &'a Path) -> Self {
        Self {
            profile_dir,
            data_root,
            home,
        }
    }

    /// Cleans the profile for a move from `from` to `to`.
    ///
    /// Refuses to touch anything unless the profile sits inside both the data
    /// root and the home directory.
    #[tracing::instrument(skip_all, fields(from = %from, to = %to))]
    pub fn migrate(&self, from: &EngineType, to: &EngineType) -> Result<MigrationReport> {
        ensure_within_roots(self.profile_dir, &[self.data_root, self.home])
            .context("profile migration aborted")?;

        let policy = MigrationPolicy::between(from, to);
        let mut report = MigrationReport {
            policy,
            removed: Vec::new(),
            extensions: Vec::new(),
            reset: None,
            extensions_lost: false,
            problems: None,
        };
        if !self.profile_dir.is_dir() {
            debug!(profile = %self.profile_dir.display(), "no profile to migrate");
            return Ok(report);
        }

        let mut status = RunStatus::new();
        self.remove_entries(self.profile_dir, &[DEFAULT_PROFILE], &mut status, &mut report);

        let default = self.profile_dir.join(DEFAULT_PROFILE);
        if default.is_dir() {
            match policy {
                MigrationPolicy::CrossFamily => {
                    match harvest_extensions(&default) {
                        Ok(extensions) => report.extensions = extensions,
                        Err(err) => {
                            status.record("harvest extensions", &err);
                            report.extensions_lost = true;
                        }
                    }
                    self.remove_entries(&default, CROSS_FAMILY_KEEP, &mut status, &mut report);
                }
                MigrationPolicy::SameFamily => {
                    for name in LOGIN_DATA_FILES {
                        let path = default.join(name);
                        if path.exists() {
                            self.remove_one(&path, &mut status, &mut report);
                        }
                    }
                }
            }
        }
        if policy == MigrationPolicy::CrossFamily {
            report.reset = Some(ResetReason::EngineFamilyChange);
        }

        report.problems = status.message();
        info!(
            policy = ?report.policy,
            removed = report.removed.len(),
            extensions = report.extensions.len(),
            failures = status.failure_count(),
            "profile migrated"
        );
        Ok(report)
    }

    fn remove_entries(
        &self,
        dir: &Path,
        keep: &[&str],
        status: &mut RunStatus,
        report: &mut MigrationReport,
    ) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                let err = anyhow::Error::new(err).context(format!("failed reading {}", dir.display()));
                status.record("list profile", &err);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if keep.iter().any(|kept| name.to_str() == Some(kept)) {
                continue;
            }
            self.remove_one(&entry.path(), status, report);
        }
    }

    fn remove_one(&self, path: &Path, status: &mut RunStatus, report: &mut MigrationReport) {
        let removed = status.always("clean profile", || {
            remove_path(path).with_context(|| format!("failed to remove {}", path.display()))
        });
        if removed.is_some() {
            report.removed.push(path.to_path_buf());
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExtensionManifest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    default_locale: Option<String>,
}

/// Installed extensions under `Default/Extensions/<id>/<version>/manifest.json`.
pub fn harvest_extensions(default_profile: &Path) -> Result<Vec<WelcomeExtension>> {
    let extensions_dir = default_profile.join("Extensions");
    if !extensions_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(&extensions_dir)
        .with_context(|| format!("failed reading {}", extensions_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let id = entry.file_name().to_string_lossy().into_owned();
        let name = match newest_version_dir(&entry.path())
            .and_then(|version_dir| version_dir.map(|dir| read_extension_name(&dir)).transpose())
        {
            Ok(Some(name)) => name,
            Ok(None) => continue,
            Err(err) => {
                warn!(extension = %id, "skipping unreadable extension: {err:#}");
                continue;
            }
        };
        // Store-internal components have no user-facing name.
        if name.is_empty() || id.starts_with('.') {
            continue;
        }
        found.push(WelcomeExtension { icon: id, name });
    }
    found.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(found)
}

fn newest_version_dir(extension: &Path) -> Result<Option<PathBuf>> {
    let mut versions = fs::read_dir(extension)
        .with_context(|| format!("failed reading {}", extension.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join("manifest.json").is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    versions.sort_by(|a, b| ssb_core::compare_versions(a, b));
    Ok(versions.pop().map(|version| extension.join(version)))
}

fn read_extension_name(version_dir: &Path) -> Result<String> {
    let path = version_dir.join("manifest.json");
    let raw = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: ExtensionManifest = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let Some(key) = manifest
        .name
        .strip_prefix("__MSG_")
        .and_then(|rest| rest.strip_suffix("__"))
    else {
        return Ok(manifest.name);
    };
    let locale = manifest.default_locale.unwrap_or_else(|| "en".to_string());
    Ok(localized_message(version_dir, &locale, key).unwrap_or(manifest.name))
}

fn localized_message(version_dir: &Path, locale: &str, key: &str) -> Option<String> {
    let path = version_dir
        .join("_locales")
        .join(locale)
        .join("messages.json");
    let raw = fs::read_to_string(path).ok()?;
    let messages: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let messages = messages.as_object()?;
    // Message keys are case-insensitive.
    messages
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .and_then(|(_, entry)| entry.get("message"))
        .and_then(|message| message.as_str())
        .map(str::to_string)
}
