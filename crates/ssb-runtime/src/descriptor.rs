use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ssb_core::RuntimeVersion;
use tracing::debug;

/// `Contents/Resources/runtime.json` inside a runtime bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDescriptor {
    pub version: RuntimeVersion,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub fixes: Vec<String>,
}

pub fn descriptor_path(runtime: &Path) -> PathBuf {
    runtime
        .join("Contents")
        .join("Resources")
        .join("runtime.json")
}

pub fn read_runtime_descriptor(runtime: &Path) -> Result<RuntimeDescriptor> {
    let path = descriptor_path(runtime);
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read runtime descriptor {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse runtime descriptor {}", path.display()))
}

/// One runtime install found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInstance {
    pub path: PathBuf,
    pub version: RuntimeVersion,
    pub changes: Vec<String>,
    pub fixes: Vec<String>,
}

impl RuntimeInstance {
    pub fn new(path: impl Into<PathBuf>, version: impl Into<RuntimeVersion>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            changes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    /// Reads the descriptor at `path`; anything unreadable gets the sentinel version.
    pub fn inspect(path: &Path) -> Self {
        match read_runtime_descriptor(path) {
            Ok(descriptor) => Self {
                path: path.to_path_buf(),
                version: descriptor.version,
                changes: descriptor.changes,
                fixes: descriptor.fixes,
            },
            Err(err) => {
                debug!(path = %path.display(), "not a runtime instance: {err:#}");
                Self::new(path, RuntimeVersion::sentinel())
            }
        }
    }
}
