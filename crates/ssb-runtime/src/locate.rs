//! Finds runtime installs and picks the current, latest, and update instances.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ssb_core::{AppInstance, LifecycleError};
use tracing::{debug, info, warn};

use crate::descriptor::RuntimeInstance;
use crate::index::InstanceIndex;

pub const DEFAULT_RUNTIME_BUNDLE_ID: &str = "org.ssb.Runtime";
pub const RUNTIME_APP_NAME: &str = "SSB.app";

/// Well-known places a runtime may be installed, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoots {
    /// Runtime copy kept beside an internal-engine payload.
    pub adjacent: Option<PathBuf>,
    pub user_install: PathBuf,
    pub system_install: PathBuf,
}

impl SearchRoots {
    pub fn standard(home: &Path, adjacent: Option<PathBuf>) -> Self {
        Self {
            adjacent,
            user_install: home.join("Applications").join(RUNTIME_APP_NAME),
            system_install: PathBuf::from("/Applications").join(RUNTIME_APP_NAME),
        }
    }
}

/// Preferred paths first, then indexed paths not already listed.
pub fn candidate_paths(
    app: &AppInstance,
    roots: &SearchRoots,
    indexed: Vec<PathBuf>,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if app.engine.is_internal() {
        if let Some(adjacent) = &roots.adjacent {
            paths.push(adjacent.clone());
        }
    }
    paths.push(roots.user_install.clone());
    paths.push(roots.system_install.clone());

    for path in indexed {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorOutcome {
    FullyResolved,
    NothingFound,
    LatestAndUpdate,
    CurrentAndLatest,
    LatestOnly,
}

impl LocatorOutcome {
    pub fn code(&self) -> i32 {
        match self {
            Self::FullyResolved => 0,
            Self::NothingFound => 1,
            Self::LatestAndUpdate => 2,
            Self::CurrentAndLatest => 3,
            Self::LatestOnly => 4,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::FullyResolved => "current, latest and update found",
            Self::NothingFound => "no runtime found",
            Self::LatestAndUpdate => "latest and update found, current missing",
            Self::CurrentAndLatest => "current and latest found, no update",
            Self::LatestOnly => "only latest found",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Located {
    pub current: Option<RuntimeInstance>,
    pub latest: Option<RuntimeInstance>,
    pub update: Option<RuntimeInstance>,
    /// Ignore-list entries dropped because they are not newer than the app.
    pub pruned_ignores: Vec<String>,
    pub cannot_create_payload: bool,
}

impl Located {
    pub fn outcome(&self) -> LocatorOutcome {
        match (&self.current, &self.latest, &self.update) {
            (_, None, _) => LocatorOutcome::NothingFound,
            (Some(_), Some(_), Some(_)) => LocatorOutcome::FullyResolved,
            (None, Some(_), Some(_)) => LocatorOutcome::LatestAndUpdate,
            (Some(_), Some(_), None) => LocatorOutcome::CurrentAndLatest,
            (None, Some(_), None) => LocatorOutcome::LatestOnly,
        }
    }

    /// Fails when no runtime can supply an engine payload.
    pub fn ensure_payload_source(&self) -> Result<(), LifecycleError> {
        if self.cannot_create_payload {
            return Err(LifecycleError::fatal(
                "no usable runtime was found to build the engine payload",
            ));
        }
        Ok(())
    }
}

/// Picks current/latest/update among inspected instances and prunes the app's ignore list.
pub fn select_instances(
    app: &mut AppInstance,
    instances: Vec<RuntimeInstance>,
    explicit_payload_path: bool,
) -> Located {
    let app_is_release = app.version.is_release();
    let survivors = instances
        .into_iter()
        .filter(|instance| !instance.version.is_sentinel())
        .filter(|instance| {
            let keep = !app_is_release || instance.version.is_release();
            if !keep {
                debug!(
                    path = %instance.path.display(),
                    version = %instance.version,
                    "skipping beta runtime for release app"
                );
            }
            keep
        })
        .collect::<Vec<_>>();

    let current = survivors
        .iter()
        .find(|instance| instance.version.cmp_version(&app.version) == Ordering::Equal)
        .cloned();
    let latest = highest(survivors.iter());
    let update = highest(survivors.iter().filter(|instance| {
        instance.version.cmp_version(&app.version) == Ordering::Greater
            && !app.is_ignoring(instance.version.as_str())
    }));

    let pruned_ignores = app.prune_ignore_list();
    if !pruned_ignores.is_empty() {
        info!(pruned = ?pruned_ignores, "dropped stale ignored update versions");
    }

    let cannot_create_payload = current.is_none()
        && ((latest.is_none() && !explicit_payload_path) || app.engine.is_internal());

    Located {
        current,
        latest,
        update,
        pruned_ignores,
        cannot_create_payload,
    }
}

// First of equal versions wins so preferred paths beat indexed duplicates.
fn highest<'a>(instances: impl Iterator<Item = &'a RuntimeInstance>) -> Option<RuntimeInstance> {
    instances
        .fold(None::<&RuntimeInstance>, |best, instance| match best {
            Some(best) if instance.version.cmp_version(&best.version) != Ordering::Greater => {
                Some(best)
            }
            _ => Some(instance),
        })
        .cloned()
}

/// Searches every candidate location and selects instances for `app`.
///
/// A failing index search is logged and the preferred paths are still checked.
#[tracing::instrument(skip_all, fields(app = %app.id, version = %app.version))]
pub fn locate(
    app: &mut AppInstance,
    roots: &SearchRoots,
    index: &dyn InstanceIndex,
    runtime_bundle_id: &str,
    explicit_payload_path: bool,
) -> Located {
    let indexed = index.search(runtime_bundle_id).unwrap_or_else(|err| {
        warn!("content index search failed: {err:#}");
        Vec::new()
    });
    let instances = candidate_paths(app, roots, indexed)
        .iter()
        .map(|path| RuntimeInstance::inspect(path))
        .collect::<Vec<_>>();

    let located = select_instances(app, instances, explicit_payload_path);
    info!(
        outcome = located.outcome().code(),
        current = located.current.as_ref().map(|i| i.version.to_string()),
        latest = located.latest.as_ref().map(|i| i.version.to_string()),
        update = located.update.as_ref().map(|i| i.version.to_string()),
        "located runtime instances"
    );
    located
}
