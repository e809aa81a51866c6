//! Locating an installed browser to use as an external engine.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use ssb_core::EngineIdentity;
use ssb_runtime::InstanceIndex;
use ssb_store::is_executable;
use tracing::{debug, warn};

use crate::bundle::{info_plist_path, read_bundle_info};

/// Display names of well-known browsers, by bundle id.
const KNOWN_APP_NAMES: &[(&str, &str)] = &[
    ("com.google.Chrome", "Google Chrome.app"),
    ("com.google.Chrome.beta", "Google Chrome Beta.app"),
    ("com.google.Chrome.canary", "Google Chrome Canary.app"),
    ("com.brave.Browser", "Brave Browser.app"),
    ("com.microsoft.edgemac", "Microsoft Edge.app"),
    ("com.vivaldi.Vivaldi", "Vivaldi.app"),
    ("org.chromium.Chromium", "Chromium.app"),
    ("com.operasoftware.Opera", "Opera.app"),
];

/// Checks that `app` declares `bundle_id` and ships a runnable executable.
pub fn validate_engine_source(app: &Path, bundle_id: &str) -> Result<EngineIdentity> {
    let contents = app.join("Contents");
    let info = read_bundle_info(&info_plist_path(&contents))?;
    if info.identifier != bundle_id {
        bail!(
            "{} is {}, not {bundle_id}",
            app.display(),
            if info.identifier.is_empty() {
                "missing a bundle id"
            } else {
                info.identifier.as_str()
            }
        );
    }
    if info.executable.is_empty() {
        bail!("{} does not name an executable", app.display());
    }
    let executable = contents.join("MacOS").join(&info.executable);
    if !is_executable(&executable) {
        bail!("engine executable {} is not runnable", executable.display());
    }
    Ok(info.identity())
}

/// Where a browser with `bundle_id` may be installed, in preference order.
pub fn engine_candidates(bundle_id: &str, home: &Path, index: &dyn InstanceIndex) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some((_, name)) = KNOWN_APP_NAMES.iter().find(|(id, _)| *id == bundle_id) {
        candidates.push(home.join("Applications").join(name));
        candidates.push(PathBuf::from("/Applications").join(name));
    }
    match index.search(bundle_id) {
        Ok(found) => {
            for path in found {
                if !candidates.contains(&path) {
                    candidates.push(path);
                }
            }
        }
        Err(err) => warn!(bundle_id, "content index search failed: {err:#}"),
    }
    candidates
}

/// The first valid install of `bundle_id`.
pub fn find_external_engine(
    bundle_id: &str,
    home: &Path,
    index: &dyn InstanceIndex,
) -> Option<(PathBuf, EngineIdentity)> {
    engine_candidates(bundle_id, home, index)
        .into_iter()
        .find_map(|path| match validate_engine_source(&path, bundle_id) {
            Ok(identity) => Some((path, identity)),
            Err(err) => {
                debug!(path = %path.display(), "not a usable engine: {err:#}");
                None
            }
        })
}
