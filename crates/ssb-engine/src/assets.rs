use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ssb_store::{commit_dir_with, copy_dir_recursive, AppLayout};
use tracing::debug;

pub fn welcome_assets_path(runtime: &Path) -> PathBuf {
    runtime.join("Contents").join("Resources").join("Welcome")
}

/// Replaces the app's welcome page with the copy bundled in `runtime`.
pub fn install_welcome_assets(runtime: &Path, layout: &AppLayout) -> Result<PathBuf> {
    let source = welcome_assets_path(runtime);
    if !source.is_dir() {
        bail!("runtime has no welcome page at {}", source.display());
    }
    let target = layout.welcome_dir();
    commit_dir_with(&target, |staged| copy_dir_recursive(&source, staged))
        .with_context(|| format!("failed to install welcome page into {}", target.display()))?;
    debug!(target = %target.display(), "installed welcome page");
    Ok(layout.welcome_page())
}
