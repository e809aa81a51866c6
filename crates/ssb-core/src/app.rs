use std::path::{Path, PathBuf};

use crate::engine::{EngineIdentity, EngineType};
use crate::version::{compare_versions, RuntimeVersion};

/// One user-built wrapper app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInstance {
    pub id: String,
    pub name: String,
    pub bundle_path: PathBuf,
    pub data_dir: PathBuf,
    pub version: RuntimeVersion,
    pub engine: EngineType,
    pub build_stamp: Option<String>,
    pub update_ignore_versions: Vec<String>,
    pub engine_source: Option<EngineIdentity>,
}

impl AppInstance {
    pub fn contents_path(&self) -> PathBuf {
        self.bundle_path.join("Contents")
    }

    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    pub fn is_ignoring(&self, version: &str) -> bool {
        self.update_ignore_versions
            .iter()
            .any(|ignored| compare_versions(ignored, version).is_eq())
    }

    pub fn ignore_update(&mut self, version: &str) {
        if !self.is_ignoring(version) {
            self.update_ignore_versions.push(version.to_string());
        }
    }

    /// Drops ignore entries at or below the app's own version.
    pub fn prune_ignore_list(&mut self) -> Vec<String> {
        let current = self.version.as_str().to_string();
        let (kept, pruned): (Vec<_>, Vec<_>) = self
            .update_ignore_versions
            .drain(..)
            .partition(|ignored| compare_versions(ignored, &current).is_gt());
        self.update_ignore_versions = kept;
        pruned
    }
}

/// What the previous launch recorded about the app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchHistory {
    pub last_version: Option<String>,
    pub last_engine: Option<EngineType>,
    pub last_build_stamp: Option<String>,
}

/// Lifecycle conditions that fired for this launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchConditions {
    pub is_new: bool,
    pub updated_from: Option<String>,
    pub edited: bool,
    pub engine_changed_from: Option<EngineType>,
    pub reset: bool,
}

impl LaunchConditions {
    pub fn derive(history: Option<&LaunchHistory>, app: &AppInstance) -> Self {
        let Some(history) = history else {
            return Self {
                is_new: true,
                ..Self::default()
            };
        };

        let updated_from = history
            .last_version
            .as_ref()
            .filter(|last| !compare_versions(last, app.version.as_str()).is_eq())
            .cloned();

        let edited = match (&history.last_build_stamp, &app.build_stamp) {
            (Some(last), Some(current)) => last != current,
            _ => false,
        };

        let engine_changed_from = history
            .last_engine
            .as_ref()
            .filter(|last| **last != app.engine)
            .cloned();

        Self {
            is_new: history.last_version.is_none(),
            updated_from,
            edited,
            engine_changed_from,
            reset: false,
        }
    }

    pub fn any(&self) -> bool {
        self.is_new
            || self.updated_from.is_some()
            || self.edited
            || self.engine_changed_from.is_some()
            || self.reset
    }
}
