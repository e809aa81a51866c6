//! Per-app persisted configuration and the write-only-when-changed reconciler.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ssb_core::EngineKind;
use tracing::{debug, info};

use crate::current_unix_timestamp;
use crate::shell_codec::{parse_assignments, render_assignment, ConfigValue};
use crate::txn::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Common,
    Internal,
    External,
}

impl ConfigScope {
    pub fn applies_to(&self, kind: EngineKind) -> bool {
        match self {
            Self::Common => true,
            Self::Internal => kind == EngineKind::Internal,
            Self::External => kind == EngineKind::External,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigKey {
    AppPath,
    LastRunVersion,
    LastRunEngineType,
    LastRunBuildStamp,
    UpdateAction,
    UpdateIgnoreVersions,
    PayloadPath,
    EngineRuntimeVersion,
    EngineSourceInfo,
}

/// Every persisted field, in file order.
pub const CONFIG_KEYS: &[ConfigKey] = &[
    ConfigKey::AppPath,
    ConfigKey::LastRunVersion,
    ConfigKey::LastRunEngineType,
    ConfigKey::LastRunBuildStamp,
    ConfigKey::UpdateAction,
    ConfigKey::UpdateIgnoreVersions,
    ConfigKey::PayloadPath,
    ConfigKey::EngineRuntimeVersion,
    ConfigKey::EngineSourceInfo,
];

impl ConfigKey {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AppPath => "SSBAppPath",
            Self::LastRunVersion => "SSBLastRunVersion",
            Self::LastRunEngineType => "SSBLastRunEngineType",
            Self::LastRunBuildStamp => "SSBLastRunBuildStamp",
            Self::UpdateAction => "SSBUpdateAction",
            Self::UpdateIgnoreVersions => "SSBUpdateIgnoreVersions",
            Self::PayloadPath => "SSBPayloadPath",
            Self::EngineRuntimeVersion => "SSBEngineRuntimeVersion",
            Self::EngineSourceInfo => "SSBEngineSourceInfo",
        }
    }

    pub fn scope(&self) -> ConfigScope {
        match self {
            Self::EngineRuntimeVersion => ConfigScope::Internal,
            Self::EngineSourceInfo => ConfigScope::External,
            _ => ConfigScope::Common,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::UpdateIgnoreVersions | Self::EngineSourceInfo)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CONFIG_KEYS.iter().copied().find(|key| key.name() == name)
    }

    /// Keys persisted for an app running on `kind`.
    pub fn active(kind: EngineKind) -> impl Iterator<Item = ConfigKey> {
        CONFIG_KEYS
            .iter()
            .copied()
            .filter(move |key| key.scope().applies_to(kind))
    }
}

/// Typed view of `config.sh`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub app_path: Option<String>,
    pub last_run_version: Option<String>,
    pub last_run_engine_type: Option<String>,
    pub last_run_build_stamp: Option<String>,
    pub update_action: Option<String>,
    pub update_ignore_versions: Vec<String>,
    pub payload_path: Option<String>,
    pub engine_runtime_version: Option<String>,
    pub engine_source_info: Vec<String>,
}

impl AppConfig {
    pub fn value(&self, key: ConfigKey) -> ConfigValue {
        let scalar = |value: &Option<String>| ConfigValue::Scalar(value.clone().unwrap_or_default());
        match key {
            ConfigKey::AppPath => scalar(&self.app_path),
            ConfigKey::LastRunVersion => scalar(&self.last_run_version),
            ConfigKey::LastRunEngineType => scalar(&self.last_run_engine_type),
            ConfigKey::LastRunBuildStamp => scalar(&self.last_run_build_stamp),
            ConfigKey::UpdateAction => scalar(&self.update_action),
            ConfigKey::UpdateIgnoreVersions => {
                ConfigValue::Array(self.update_ignore_versions.clone())
            }
            ConfigKey::PayloadPath => scalar(&self.payload_path),
            ConfigKey::EngineRuntimeVersion => scalar(&self.engine_runtime_version),
            ConfigKey::EngineSourceInfo => ConfigValue::Array(self.engine_source_info.clone()),
        }
    }

    /// Stores `value`, coercing between scalar and array to the field's shape.
    /// Empty scalars read back as `None`.
    pub fn set_value(&mut self, key: ConfigKey, value: ConfigValue) {
        let items = match &value {
            ConfigValue::Array(items) => items.clone(),
            ConfigValue::Scalar(value) if value.is_empty() => Vec::new(),
            ConfigValue::Scalar(value) => vec![value.clone()],
        };
        let scalar = match value {
            ConfigValue::Scalar(value) => value,
            ConfigValue::Array(items) => items.into_iter().next().unwrap_or_default(),
        };
        let scalar = (!scalar.is_empty()).then_some(scalar);

        match key {
            ConfigKey::AppPath => self.app_path = scalar,
            ConfigKey::LastRunVersion => self.last_run_version = scalar,
            ConfigKey::LastRunEngineType => self.last_run_engine_type = scalar,
            ConfigKey::LastRunBuildStamp => self.last_run_build_stamp = scalar,
            ConfigKey::UpdateAction => self.update_action = scalar,
            ConfigKey::UpdateIgnoreVersions => self.update_ignore_versions = items,
            ConfigKey::PayloadPath => self.payload_path = scalar,
            ConfigKey::EngineRuntimeVersion => self.engine_runtime_version = scalar,
            ConfigKey::EngineSourceInfo => self.engine_source_info = items,
        }
    }

    pub fn render(&self, kind: EngineKind, generated_at_unix: u64) -> String {
        let mut output = format!("# generated by ssb at {generated_at_unix}\n");
        for key in ConfigKey::active(kind) {
            output.push_str(&render_assignment(key.name(), &self.value(key)));
            output.push('\n');
        }
        output
    }
}

/// Loads and saves `config.sh`, remembering what is on disk so unchanged
/// values are never rewritten.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    shadow: BTreeMap<ConfigKey, ConfigValue>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            shadow: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file and snapshots every known value. A missing file is `Ok(None)`.
    pub fn read(&mut self) -> Result<Option<AppConfig>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.shadow.clear();
                return Ok(None);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        let assignments = parse_assignments(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        let mut config = AppConfig::default();
        self.shadow.clear();
        for (name, value) in assignments {
            let Some(key) = ConfigKey::from_name(&name) else {
                debug!(name = %name, "ignoring unknown config variable");
                continue;
            };
            config.set_value(key, value.clone());
            self.shadow.insert(key, value);
        }
        Ok(Some(config))
    }

    /// True when `live` differs from what was last read or written.
    pub fn needs_write(&self, live: &AppConfig, kind: EngineKind, force: bool) -> bool {
        if force {
            return true;
        }
        let stale_key = self
            .shadow
            .keys()
            .any(|key| !key.scope().applies_to(kind));
        if stale_key {
            return true;
        }
        ConfigKey::active(kind).any(|key| {
            let Some(saved) = self.shadow.get(&key) else {
                return true;
            };
            match (saved, live.value(key)) {
                (ConfigValue::Array(saved), ConfigValue::Array(current)) => {
                    saved.len() != current.len()
                        || saved.iter().zip(current.iter()).any(|(a, b)| a != b)
                }
                (ConfigValue::Scalar(saved), ConfigValue::Scalar(current)) => *saved != current,
                _ => true,
            }
        })
    }

    /// Writes `live` if anything changed. Returns whether a write happened.
    pub fn write(&mut self, live: &AppConfig, kind: EngineKind, force: bool) -> Result<bool> {
        if !self.needs_write(live, kind, force) {
            debug!(path = %self.path.display(), "config unchanged, not writing");
            return Ok(false);
        }
        let rendered = live.render(kind, current_unix_timestamp()?);
        write_atomic(&self.path, rendered.as_bytes())
            .with_context(|| format!("failed to save config {}", self.path.display()))?;

        self.shadow = ConfigKey::active(kind)
            .map(|key| (key, live.value(key)))
            .collect();
        info!(path = %self.path.display(), "config written");
        Ok(true)
    }
}
