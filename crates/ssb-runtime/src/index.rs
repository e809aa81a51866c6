use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};

/// Finds installed bundles by bundle identifier.
pub trait InstanceIndex {
    fn search(&self, bundle_id: &str) -> Result<Vec<PathBuf>>;
}

impl<F> InstanceIndex for F
where
    F: Fn(&str) -> Result<Vec<PathBuf>>,
{
    fn search(&self, bundle_id: &str) -> Result<Vec<PathBuf>> {
        self(bundle_id)
    }
}

/// The system content index, queried through `mdfind`.
#[derive(Debug, Clone, Default)]
pub struct SpotlightIndex;

impl InstanceIndex for SpotlightIndex {
    fn search(&self, bundle_id: &str) -> Result<Vec<PathBuf>> {
        if bundle_id.contains('\'') {
            bail!("refusing to search for bundle id containing a quote: {bundle_id}");
        }
        let output = Command::new("mdfind")
            .arg(format!("kMDItemCFBundleIdentifier == '{bundle_id}'"))
            .output()
            .context("failed to run mdfind")?;
        if !output.status.success() {
            bail!("mdfind exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}
