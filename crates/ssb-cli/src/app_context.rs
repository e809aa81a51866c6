use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use ssb_core::{
    AppInstance, EngineIdentity, EngineType, LaunchHistory, LifecycleError, RuntimeVersion,
};
use ssb_store::{default_data_root, AppConfig, AppLayout, ConfigStore};
use tracing::warn;

use crate::settings::Settings;
use crate::AppIdentityArgs;

/// Where one app's state lives, plus the home directory the safety gates check against.
#[derive(Debug, Clone)]
pub(crate) struct AppContext {
    pub layout: AppLayout,
    pub home: PathBuf,
}

impl AppContext {
    pub(crate) fn resolve(
        identity: &AppIdentityArgs,
        data_root: Option<PathBuf>,
        settings: &Settings,
        home: PathBuf,
    ) -> Result<Self> {
        let app_id = app_id(identity)?;
        let data_root = data_root
            .or_else(|| settings.data_root.clone())
            .unwrap_or_else(|| default_data_root(&home));
        Ok(Self {
            layout: AppLayout::new(data_root, app_id),
            home,
        })
    }

    pub(crate) fn config_store(&self) -> ConfigStore {
        ConfigStore::new(self.layout.config_path())
    }
}

fn app_id(identity: &AppIdentityArgs) -> Result<String> {
    let id = identity
        .id
        .as_deref()
        .context("no app identifier; pass --app-id or set SSBIdentifier")?;
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(id.to_string()),
        _ => bail!(LifecycleError::unsafe_path(
            id,
            "app identifier must be a single path component"
        )),
    }
}

/// Reads the app's config; an unreadable file is treated as absent.
pub(crate) fn read_config(store: &mut ConfigStore) -> Option<AppConfig> {
    match store.read() {
        Ok(config) => config,
        Err(err) => {
            warn!("ignoring unreadable app config: {err:#}");
            None
        }
    }
}

pub(crate) fn build_app(
    identity: &AppIdentityArgs,
    config: Option<&AppConfig>,
    layout: &AppLayout,
) -> Result<AppInstance> {
    let version = identity
        .version
        .as_deref()
        .context("no app version; pass --app-version or set SSBVersion")?;
    let engine = identity
        .engine
        .as_deref()
        .context("no engine type; pass --engine or set SSBEngineType")?;
    let engine = EngineType::parse(engine)?;
    let bundle_path = identity
        .bundle
        .clone()
        .or_else(|| config.and_then(|config| config.app_path.as_deref()).map(PathBuf::from))
        .context("app bundle path is unknown; pass --bundle or set SSBAppPath")?;

    let engine_source = match config {
        Some(config) if !config.engine_source_info.is_empty() => {
            match EngineIdentity::from_fields(&config.engine_source_info) {
                Ok(identity) => Some(identity),
                Err(err) => {
                    warn!("discarding recorded engine source: {err:#}");
                    None
                }
            }
        }
        _ => None,
    };

    Ok(AppInstance {
        id: layout.app_id().to_string(),
        name: identity
            .name
            .clone()
            .unwrap_or_else(|| layout.app_id().to_string()),
        bundle_path,
        data_dir: layout.data_dir(),
        version: RuntimeVersion::new(version),
        engine,
        build_stamp: identity.build_stamp.clone(),
        update_ignore_versions: config
            .map(|config| config.update_ignore_versions.clone())
            .unwrap_or_default(),
        engine_source,
    })
}

pub(crate) fn launch_history(config: Option<&AppConfig>) -> Option<LaunchHistory> {
    let config = config?;
    let last_engine = config
        .last_run_engine_type
        .as_deref()
        .and_then(|raw| match EngineType::parse(raw) {
            Ok(engine) => Some(engine),
            Err(err) => {
                warn!("ignoring recorded engine type {raw:?}: {err:#}");
                None
            }
        });
    Some(LaunchHistory {
        last_version: config.last_run_version.clone(),
        last_engine,
        last_build_stamp: config.last_run_build_stamp.clone(),
    })
}

/// Folds this launch's outcome back into the persisted config.
pub(crate) fn record_launch(
    mut config: AppConfig,
    app: &AppInstance,
    engine_runtime_version: Option<&RuntimeVersion>,
) -> AppConfig {
    config.app_path = Some(app.bundle_path.display().to_string());
    config.last_run_version = Some(app.version.as_str().to_string());
    config.last_run_engine_type = Some(app.engine.to_string());
    config.last_run_build_stamp = app.build_stamp.clone();
    config.update_ignore_versions = app.update_ignore_versions.clone();
    if let Some(version) = engine_runtime_version {
        config.engine_runtime_version = Some(version.as_str().to_string());
    }
    config.engine_source_info = app
        .engine_source
        .as_ref()
        .map(EngineIdentity::to_fields)
        .unwrap_or_default();
    config
}
