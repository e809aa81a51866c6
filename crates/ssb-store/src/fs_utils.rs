use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use ssb_core::LifecycleError;

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// True for anything at `path`, including a dangling symlink.
pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Removes a file, symlink, or directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

pub fn is_dir_empty(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path)
        .with_context(|| format!("failed reading directory {}", path.display()))?;
    Ok(entries.next().is_none())
}

pub fn remove_dir_if_empty(path: &Path) -> Result<bool> {
    if !path.is_dir() || !is_dir_empty(path)? {
        return Ok(false);
    }
    fs::remove_dir(path)
        .with_context(|| format!("failed to remove empty directory {}", path.display()))?;
    Ok(true)
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Refuses `path` unless it sits strictly below every one of `roots`.
///
/// This gate runs before any recursive delete of user data.
pub fn ensure_within_roots(path: &Path, roots: &[&Path]) -> Result<(), LifecycleError> {
    if !path.is_absolute() {
        return Err(LifecycleError::unsafe_path(path, "path is not absolute"));
    }
    if roots.is_empty() {
        return Err(LifecycleError::unsafe_path(path, "no safe roots configured"));
    }

    let resolved = resolve_for_comparison(path);
    for root in roots {
        if !root.is_absolute() {
            return Err(LifecycleError::unsafe_path(
                path,
                format!("safe root {} is not absolute", root.display()),
            ));
        }
        let root = resolve_for_comparison(root);
        if resolved == root || !resolved.starts_with(&root) {
            return Err(LifecycleError::unsafe_path(
                path,
                format!("not inside {}", root.display()),
            ));
        }
    }
    Ok(())
}

fn resolve_for_comparison(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }

    // Canonicalize the deepest existing ancestor so both sides agree on symlinked prefixes.
    let normalized = normalize_lexically(path);
    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            rest.push(name.to_os_string());
        }
        existing = parent;
        if let Ok(canonical) = fs::canonicalize(existing) {
            let mut rebuilt = canonical;
            for name in rest.iter().rev() {
                rebuilt.push(name);
            }
            return rebuilt;
        }
    }
    normalized
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Copies a directory tree, recreating symlinks instead of following them.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        anyhow::bail!("source location is not a directory: {}", src.display());
    }
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;

    let mut queue: VecDeque<(PathBuf, PathBuf)> = VecDeque::new();
    queue.push_back((src.to_path_buf(), dst.to_path_buf()));

    while let Some((from_dir, to_dir)) = queue.pop_front() {
        for entry in fs::read_dir(&from_dir)
            .with_context(|| format!("failed reading directory {}", from_dir.display()))?
        {
            let entry = entry?;
            let from_path = entry.path();
            let to_path = to_dir.join(entry.file_name());
            let file_type = entry.file_type()?;

            if file_type.is_symlink() {
                copy_symlink(&from_path, &to_path)?;
            } else if file_type.is_dir() {
                fs::create_dir_all(&to_path)
                    .with_context(|| format!("failed to create {}", to_path.display()))?;
                queue.push_back((from_path, to_path));
            } else if file_type.is_file() {
                fs::copy(&from_path, &to_path).with_context(|| {
                    format!(
                        "failed to copy {} to {}",
                        from_path.display(),
                        to_path.display()
                    )
                })?;
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target =
        fs::read_link(from).with_context(|| format!("failed to read link {}", from.display()))?;
    std::os::unix::fs::symlink(&target, to)
        .with_context(|| format!("failed to create link {}", to.display()))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to)
        .map(|_| ())
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))
}
