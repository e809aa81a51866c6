use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ssb_runtime::DEFAULT_RUNTIME_BUNDLE_ID;
use ssb_store::WaitPolicy;
use ssb_update::UpdateAction;

pub const DEFAULT_LOG_FILTER: &str = "ssb=info";

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_DELETE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 15_000;

/// Tool-wide settings. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub data_root: Option<PathBuf>,
    pub runtime_bundle_id: Option<String>,
    pub update_action: Option<String>,
    pub remote_update_url: Option<String>,
    pub remote_checks: Option<bool>,
    pub delete_timeout_ms: Option<u64>,
    pub launch_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub log_filter: Option<String>,
}

pub fn default_settings_path(home: &Path) -> PathBuf {
    home.join("Library")
        .join("Application Support")
        .join("SSB")
        .join("settings.toml")
}

impl Settings {
    /// Missing files load as defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read settings {}", path.display()))
            }
        };
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse settings {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        if let Some(action) = &settings.update_action {
            action.parse::<UpdateAction>()?;
        }
        Ok(settings)
    }

    pub fn runtime_bundle_id(&self) -> &str {
        self.runtime_bundle_id
            .as_deref()
            .unwrap_or(DEFAULT_RUNTIME_BUNDLE_ID)
    }

    /// The app's own choice wins over the tool-wide default.
    pub fn update_action(&self, app_choice: Option<&str>) -> UpdateAction {
        app_choice
            .or(self.update_action.as_deref())
            .and_then(|action| action.parse().ok())
            .unwrap_or_default()
    }

    pub fn remote_checks_enabled(&self) -> bool {
        self.remote_checks.unwrap_or(true) && self.remote_update_url.is_some()
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn delete_wait(&self) -> WaitPolicy {
        WaitPolicy::new(
            self.poll_interval(),
            Duration::from_millis(self.delete_timeout_ms.unwrap_or(DEFAULT_DELETE_TIMEOUT_MS)),
        )
    }

    pub fn launch_wait(&self) -> WaitPolicy {
        WaitPolicy::new(
            self.poll_interval(),
            Duration::from_millis(self.launch_timeout_ms.unwrap_or(DEFAULT_LAUNCH_TIMEOUT_MS)),
        )
    }
}
