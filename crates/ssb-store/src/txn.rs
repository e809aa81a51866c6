//! Replace-or-rollback moves for files and directories.
//!
//! A permanent path is only ever swapped whole: it holds either the complete
//! old content or the complete new content.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

use crate::fs_utils::{path_exists, remove_path};

static STAGE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A collision-free sibling name for `target`.
pub fn stage_path(target: &Path) -> Result<PathBuf> {
    let parent = target
        .parent()
        .ok_or_else(|| anyhow!("cannot stage beside {}: no parent", target.display()))?;
    let name = target
        .file_name()
        .ok_or_else(|| anyhow!("cannot stage beside {}: no file name", target.display()))?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    loop {
        let sequence = STAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut staged = OsString::from(".");
        staged.push(name);
        staged.push(format!(".{}-{}-{}.tmp", std::process::id(), nanos, sequence));
        let candidate = parent.join(staged);
        if !path_exists(&candidate) {
            return Ok(candidate);
        }
    }
}

/// Moves `temp` over `permanent`, restoring the old `permanent` if that fails.
pub fn commit(temp: &Path, permanent: &Path) -> Result<()> {
    commit_with_rename(temp, permanent, |from, to| fs::rename(from, to))
}

pub(crate) fn commit_with_rename<Rename>(
    temp: &Path,
    permanent: &Path,
    mut rename: Rename,
) -> Result<()>
where
    Rename: FnMut(&Path, &Path) -> io::Result<()>,
{
    let holding = if path_exists(permanent) {
        let holding = stage_path(permanent)?;
        rename(permanent, &holding).with_context(|| {
            format!(
                "failed to move {} aside before replacing it",
                permanent.display()
            )
        })?;
        Some(holding)
    } else {
        None
    };

    if let Err(err) = rename(temp, permanent) {
        let err = anyhow::Error::new(err).context(format!(
            "failed to move {} into place at {}",
            temp.display(),
            permanent.display()
        ));
        if let Some(holding) = &holding {
            if let Err(restore_err) = rename(holding, permanent) {
                warn!(
                    permanent = %permanent.display(),
                    holding = %holding.display(),
                    "failed to restore original after failed commit: {restore_err}"
                );
                return Err(err.context(format!(
                    "original could not be restored from {}: {restore_err}",
                    holding.display()
                )));
            }
        }
        return Err(err);
    }

    if let Some(holding) = holding {
        if let Err(err) = remove_path(&holding) {
            warn!(
                holding = %holding.display(),
                "left replaced content behind after commit: {err}"
            );
        }
    }
    debug!(path = %permanent.display(), "committed");
    Ok(())
}

/// Removes a staged path. Missing paths are fine.
pub fn discard(temp: &Path) -> Result<()> {
    remove_path(temp).with_context(|| format!("failed to discard {}", temp.display()))
}

/// Writes `bytes` to a staged sibling and commits it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let temp = stage_path(path)?;
    let result = fs::write(&temp, bytes)
        .with_context(|| format!("failed to write {}", temp.display()))
        .and_then(|()| commit(&temp, path));
    finish_staged(&temp, result)
}

/// Builds a directory at a staged sibling with `fill` and commits it over `path`.
pub fn commit_dir_with<Fill>(path: &Path, fill: Fill) -> Result<()>
where
    Fill: FnOnce(&Path) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let temp = stage_path(path)?;
    let result = fs::create_dir(&temp)
        .with_context(|| format!("failed to create {}", temp.display()))
        .and_then(|()| fill(&temp))
        .and_then(|()| commit(&temp, path));
    finish_staged(&temp, result)
}

fn finish_staged(temp: &Path, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => match discard(temp) {
            Ok(()) => Err(err),
            Err(secondary) => Err(err.context(format!("cleanup also failed: {secondary:#}"))),
        },
    }
}
