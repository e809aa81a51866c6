//! The engine payload and its swap into and out of the app bundle.
//!
//! While inactive the payload sits at `Engine/Payload` and the bundle's own
//! `Contents` is the launcher. Activation parks the launcher at
//! `Engine/Launcher` and moves the payload into `Contents`; deactivation
//! reverses that. Every transition needs the app's [`LaunchLock`].

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use ssb_core::{AppInstance, EngineIdentity, LifecycleError, TemplateFilter};
use ssb_store::{
    commit, commit_dir_with, copy_dir_recursive, discard, ensure_within_roots, is_executable,
    path_exists, remove_dir_if_empty, remove_path, stage_path, wait_until, AppLayout, LaunchLock,
    WaitPolicy,
};
use tracing::{debug, info, warn};

use crate::bundle::{info_plist_path, read_bundle_info};
use crate::discover::validate_engine_source;
use crate::template::app_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadState {
    NoPayload,
    Inactive,
    Active,
    Corrupt,
}

impl PayloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPayload => "no-payload",
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Corrupt => "corrupt",
        }
    }
}

/// Where a new payload is copied from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSource {
    /// The engine bundled inside a runtime install.
    Internal { runtime: PathBuf },
    /// An installed browser, identified by its bundle id.
    External { app: PathBuf, bundle_id: String },
}

impl EngineSource {
    pub fn contents(&self) -> PathBuf {
        match self {
            Self::Internal { runtime } => internal_engine_path(runtime),
            Self::External { app, .. } => app.join("Contents"),
        }
    }
}

pub fn internal_engine_path(runtime: &Path) -> PathBuf {
    runtime.join("Contents").join("Resources").join("Engine")
}

#[derive(Debug)]
pub struct EnginePayload<'lock> {
    layout: AppLayout,
    contents: PathBuf,
    wait: WaitPolicy,
    _lock: &'lock LaunchLock,
}

impl<'lock> EnginePayload<'lock> {
    pub fn new(layout: AppLayout, contents: impl Into<PathBuf>, lock: &'lock LaunchLock) -> Self {
        Self {
            layout,
            contents: contents.into(),
            wait: WaitPolicy::default(),
            _lock: lock,
        }
    }

    pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    pub fn payload_path(&self) -> PathBuf {
        self.layout.payload_path()
    }

    pub fn launcher_path(&self) -> PathBuf {
        self.layout.launcher_path()
    }

    pub fn contents(&self) -> &Path {
        &self.contents
    }

    pub fn state(&self, identity: &EngineIdentity) -> PayloadState {
        let payload = path_exists(&self.payload_path());
        let launcher = path_exists(&self.launcher_path());
        let state = match (payload, launcher) {
            (false, false) => return PayloadState::NoPayload,
            (true, true) => return PayloadState::Corrupt,
            (true, false) => PayloadState::Inactive,
            (false, true) => PayloadState::Active,
        };
        match self.validate(identity) {
            Ok(()) => state,
            Err(err) => {
                warn!("engine payload failed validation: {err}");
                PayloadState::Corrupt
            }
        }
    }

    /// Checks the payload wherever it currently lives.
    ///
    /// Its parked directory must be the only entry in `Engine/`, and the
    /// payload must hold `Info.plist` plus the runnable engine executable.
    pub fn validate(&self, identity: &EngineIdentity) -> Result<(), LifecycleError> {
        let corrupt = |reason: String| LifecycleError::PayloadCorrupt { reason };

        let (parked, payload_contents) = if path_exists(&self.launcher_path()) {
            (self.launcher_path(), self.contents.clone())
        } else {
            (self.payload_path(), self.payload_path())
        };
        if !parked.is_dir() {
            return Err(corrupt(format!("{} is missing", parked.display())));
        }

        let engine_dir = self.layout.engine_dir();
        let entries = fs::read_dir(&engine_dir)
            .map_err(|err| corrupt(format!("cannot list {}: {err}", engine_dir.display())))?
            .filter_map(|entry| entry.ok().map(|entry| entry.file_name()))
            .collect::<Vec<_>>();
        if entries.len() != 1 || Some(entries[0].as_os_str()) != parked.file_name() {
            return Err(corrupt(format!(
                "{} must contain only {}, found {}",
                engine_dir.display(),
                parked.display(),
                entries.len()
            )));
        }

        if identity.executable.is_empty() {
            return Err(corrupt("engine identity names no executable".to_string()));
        }
        let executable = payload_contents.join("MacOS").join(&identity.executable);
        if !is_executable(&executable) {
            return Err(corrupt(format!(
                "engine executable {} is missing or not executable",
                executable.display()
            )));
        }
        let plist = info_plist_path(&payload_contents);
        if !plist.is_file() {
            return Err(corrupt(format!("{} is missing", plist.display())));
        }
        Ok(())
    }

    /// Builds a fresh inactive payload from `source` and records its identity on `app`.
    #[tracing::instrument(skip_all, fields(app = %app.id))]
    pub fn create(
        &self,
        app: &mut AppInstance,
        source: &EngineSource,
        filter: Option<&dyn TemplateFilter>,
    ) -> Result<EngineIdentity> {
        let payload = self.payload_path();
        if path_exists(&payload) || path_exists(&self.launcher_path()) {
            bail!(LifecycleError::fatal(format!(
                "an engine payload already exists in {}",
                self.layout.engine_dir().display()
            )));
        }

        let source_contents = source.contents();
        if !source_contents.is_dir() {
            bail!(LifecycleError::fatal(format!(
                "engine source {} is missing",
                source_contents.display()
            )));
        }
        let identity = match source {
            EngineSource::Internal { .. } => {
                read_bundle_info(&info_plist_path(&source_contents))
                    .context("failed to read bundled engine info")?
                    .identity()
            }
            EngineSource::External { app: engine_app, bundle_id } => {
                validate_engine_source(engine_app, bundle_id)
                    .map_err(|err| LifecycleError::fatal(format!("{err:#}")))?
            }
        };

        let tokens = app_tokens(app, &identity);
        commit_dir_with(&payload, |staged| {
            copy_dir_recursive(&source_contents, staged)?;
            if let Some(filter) = filter {
                filter_info_plist(filter, &source_contents, staged, &tokens)?;
            }
            Ok(())
        })
        .with_context(|| format!("failed to create engine payload {}", payload.display()))?;

        info!(
            engine = %identity.bundle_id,
            version = %identity.version,
            "created engine payload"
        );
        app.engine_source = Some(identity.clone());
        Ok(identity)
    }

    pub fn activate(&self) -> Result<()> {
        self.activate_with(|from, to| fs::rename(from, to))
    }

    pub(crate) fn activate_with<Rename>(&self, mut rename: Rename) -> Result<()>
    where
        Rename: FnMut(&Path, &Path) -> io::Result<()>,
    {
        let payload = self.payload_path();
        let launcher = self.launcher_path();
        if path_exists(&launcher) {
            bail!(LifecycleError::AlreadyActivated {
                contents: self.contents.clone(),
            });
        }
        if !payload.is_dir() {
            bail!(LifecycleError::fatal(format!(
                "no inactive engine payload at {}",
                payload.display()
            )));
        }
        self.swap(&payload, &launcher, &mut rename, "activate")?;
        info!(contents = %self.contents.display(), "engine payload activated");
        Ok(())
    }

    pub fn deactivate(&self) -> Result<()> {
        self.deactivate_with(|from, to| fs::rename(from, to))
    }

    pub(crate) fn deactivate_with<Rename>(&self, mut rename: Rename) -> Result<()>
    where
        Rename: FnMut(&Path, &Path) -> io::Result<()>,
    {
        let payload = self.payload_path();
        let launcher = self.launcher_path();
        if !launcher.is_dir() {
            bail!(LifecycleError::fatal(format!(
                "engine payload is not active: {} is missing",
                launcher.display()
            )));
        }
        if path_exists(&payload) {
            bail!(LifecycleError::PayloadCorrupt {
                reason: format!(
                    "{} exists while the payload is active",
                    payload.display()
                ),
            });
        }
        self.swap(&launcher, &payload, &mut rename, "deactivate")?;
        info!(contents = %self.contents.display(), "engine payload deactivated");
        Ok(())
    }

    /// Parks `Contents` at `park`, then moves `incoming` into `Contents`.
    /// A failed second move puts the parked `Contents` back.
    fn swap<Rename>(
        &self,
        incoming: &Path,
        park: &Path,
        rename: &mut Rename,
        action: &str,
    ) -> Result<()>
    where
        Rename: FnMut(&Path, &Path) -> io::Result<()>,
    {
        if !self.contents.is_dir() {
            bail!(LifecycleError::NoContents {
                contents: self.contents.clone(),
            });
        }
        rename(&self.contents, park).map_err(|err| {
            LifecycleError::fatal(format!(
                "failed to {action} engine: could not move {} to {}: {err}",
                self.contents.display(),
                park.display()
            ))
        })?;

        if let Err(err) = rename(incoming, &self.contents) {
            let failure = format!(
                "failed to {action} engine: could not move {} into {}: {err}",
                incoming.display(),
                self.contents.display()
            );
            return match rename(park, &self.contents) {
                Ok(()) => Err(LifecycleError::fatal(failure).into()),
                Err(restore_err) => Err(anyhow::Error::new(LifecycleError::NoContents {
                    contents: self.contents.clone(),
                })
                .context(format!(
                    "{failure}; restoring from {} also failed: {restore_err}",
                    park.display()
                ))),
            };
        }
        Ok(())
    }

    /// Removes the payload in any state, leaving no `Engine/` behind.
    ///
    /// A swap cut short between its two moves is repaired first so the
    /// bundle always ends up with its launcher in `Contents`.
    #[tracing::instrument(skip_all, fields(payload = %self.payload_path().display()))]
    pub fn delete(&self) -> Result<()> {
        let payload = self.payload_path();
        let launcher = self.launcher_path();
        let mut engine_copies = Vec::new();

        if path_exists(&launcher) {
            if !path_exists(&self.contents) {
                warn!(
                    launcher = %launcher.display(),
                    "restoring launcher left parked by an interrupted swap"
                );
                self.move_into_contents(&launcher, "restore launcher")?;
            } else if !path_exists(&payload) {
                self.deactivate()
                    .context("failed to deactivate payload before deleting it")?;
            } else if let Some(parked) = self.settle_parked_launcher()? {
                engine_copies.push(parked);
            }
        }

        engine_copies.extend([payload, launcher]);
        for copy in &engine_copies {
            self.remove_engine_copy(copy)?;
        }

        let engine_dir = self.layout.engine_dir();
        if engine_dir.is_dir() {
            remove_dangling_symlinks(&engine_dir)?;
            if remove_dir_if_empty(&engine_dir)? {
                debug!(dir = %engine_dir.display(), "removed empty engine directory");
            }
        }
        info!("engine payload deleted");
        Ok(())
    }

    /// `Payload`, `Launcher` and `Contents` all exist. The one of `Contents`
    /// and `Launcher` that carries the payload's bundle id is an engine copy;
    /// the other is the launcher and is left in (or put back into) `Contents`.
    /// Returns where an engine copy taken out of `Contents` was parked.
    fn settle_parked_launcher(&self) -> Result<Option<PathBuf>> {
        let engine_id = bundle_id_of(&self.payload_path());
        let is_engine = |dir: &Path| engine_id.is_some() && bundle_id_of(dir) == engine_id;

        match (is_engine(&self.contents), is_engine(&self.launcher_path())) {
            (true, false) => {
                let parked = stage_path(&self.payload_path())?;
                fs::rename(&self.contents, &parked).map_err(|err| {
                    LifecycleError::fatal(format!(
                        "could not move engine out of {}: {err}",
                        self.contents.display()
                    ))
                })?;
                let restored = self.move_into_contents(&self.launcher_path(), "restore launcher");
                if let Err(err) = restored {
                    if let Err(restore_err) = fs::rename(&parked, &self.contents) {
                        return Err(err.context(format!(
                            "putting the engine back from {} also failed: {restore_err}",
                            parked.display()
                        )));
                    }
                    return Err(err);
                }
                Ok(Some(parked))
            }
            (false, true) => Ok(None),
            _ => bail!(LifecycleError::PayloadCorrupt {
                reason: format!(
                    "cannot tell whether {} or {} holds the launcher",
                    self.contents.display(),
                    self.launcher_path().display()
                ),
            }),
        }
    }

    fn move_into_contents(&self, from: &Path, action: &str) -> Result<()> {
        fs::rename(from, &self.contents).map_err(|err| {
            LifecycleError::fatal(format!(
                "failed to {action}: could not move {} into {}: {err}",
                from.display(),
                self.contents.display()
            ))
        })?;
        Ok(())
    }

    fn remove_engine_copy(&self, path: &Path) -> Result<()> {
        if !path_exists(path) {
            return Ok(());
        }
        self.ensure_deletable(path)?;
        remove_path(path)
            .with_context(|| format!("failed to delete engine payload {}", path.display()))?;
        wait_until("engine payload removal", &self.wait, || !path_exists(path))?;
        Ok(())
    }

    fn ensure_deletable(&self, path: &Path) -> Result<()> {
        ensure_within_roots(path, &[self.layout.data_root()])?;
        if path.parent() != Some(self.layout.engine_dir().as_path()) {
            bail!(LifecycleError::unsafe_path(path, "not inside the engine directory"));
        }
        let metadata = fs::symlink_metadata(path)
            .with_context(|| format!("failed to inspect {}", path.display()))?;
        if metadata.file_type().is_symlink() {
            bail!(LifecycleError::unsafe_path(path, "payload is a symlink"));
        }
        Ok(())
    }
}

fn bundle_id_of(contents: &Path) -> Option<String> {
    read_bundle_info(&info_plist_path(contents))
        .ok()
        .map(|info| info.identifier)
        .filter(|identifier| !identifier.is_empty())
}

fn filter_info_plist(
    filter: &dyn TemplateFilter,
    source_contents: &Path,
    staged: &Path,
    tokens: &BTreeMap<String, String>,
) -> Result<()> {
    let plist = info_plist_path(staged);
    let temp = stage_path(&plist)?;
    let result = filter
        .filter(&info_plist_path(source_contents), &temp, tokens)
        .and_then(|()| commit(&temp, &plist));
    if let Err(err) = result {
        if let Err(cleanup) = discard(&temp) {
            return Err(err.context(format!("cleanup also failed: {cleanup:#}")));
        }
        return Err(err);
    }
    Ok(())
}

fn remove_dangling_symlinks(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("failed reading {}", dir.display()))? {
        let path = entry?.path();
        let is_link = fs::symlink_metadata(&path)
            .map(|metadata| metadata.file_type().is_symlink())
            .unwrap_or(false);
        if is_link && !path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove stale link {}", path.display()))?;
            debug!(link = %path.display(), "removed stale engine link");
        }
    }
    Ok(())
}

/// Reads the identity recorded in the payload's own `Info.plist`.
pub fn read_payload_identity(contents: &Path) -> Result<EngineIdentity> {
    let info = read_bundle_info(&info_plist_path(contents))?;
    if info.executable.is_empty() {
        return Err(anyhow!("{} names no executable", contents.display()));
    }
    Ok(info.identity())
}
