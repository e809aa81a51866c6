//! The launch flow: reconcile state, bring the engine up, run it, pack it away.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ssb_core::{
    AppInstance, DialogPresenter, EngineIdentity, LaunchConditions, LifecycleError,
    ProcessLauncher, ResetReason, RunStatus, RuntimeVersion, TemplateFilter, WelcomeNotice,
};
use ssb_engine::{
    add_welcome_bookmark, find_external_engine, install_welcome_assets, read_payload_identity,
    EnginePayload, EngineSource, PayloadState, ProfileMigrator, DEFAULT_PROFILE,
};
use ssb_runtime::{locate, InstanceIndex, Located, LocatorOutcome, SearchRoots};
use ssb_store::{
    current_unix_timestamp, path_exists, wait_until, AppConfig, ConfigStore, LaunchLock,
    WaitPolicy,
};
use ssb_update::{
    apply_local_update, decide_local_update, LocalDecision, RemoteCheckOutcome, RemoteChecker,
    RemoteMode, RemoteUpdateCheck,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::app_context::{build_app, launch_history, read_config, record_launch, AppContext};
use crate::settings::Settings;
use crate::AppIdentityArgs;

/// The collaborators a launch talks to.
pub(crate) struct LaunchServices<'a> {
    pub presenter: &'a dyn DialogPresenter,
    pub processes: &'a dyn ProcessLauncher,
    pub index: &'a dyn InstanceIndex,
    pub remote: Option<&'a dyn RemoteChecker>,
    pub filter: Option<&'a dyn TemplateFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LaunchOptions {
    pub reset: bool,
    pub detach: bool,
    pub remote_mode: RemoteMode,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            reset: false,
            detach: false,
            remote_mode: RemoteMode::Dialog,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LaunchResult {
    /// The engine ran. It is still running when `detached`.
    Engine {
        pid: u32,
        welcome: Option<Url>,
        detached: bool,
    },
    /// The app was handed to a newer runtime's updater instead.
    UpdateHandoff { pid: u32, version: String },
}

#[derive(Debug)]
pub(crate) struct LaunchReport {
    pub result: LaunchResult,
    pub outcome: LocatorOutcome,
    /// Recoverable failures, joined into one message.
    pub warnings: Option<String>,
}

#[derive(Debug, Default)]
struct PreparedPayload {
    reset: Option<ResetReason>,
    built_from: Option<RuntimeVersion>,
}

#[tracing::instrument(skip_all, fields(app = identity.id.as_deref().unwrap_or_default()))]
pub(crate) fn run_launch(
    ctx: &AppContext,
    identity: &AppIdentityArgs,
    settings: &Settings,
    services: &LaunchServices<'_>,
    options: &LaunchOptions,
) -> Result<LaunchReport> {
    ctx.layout.ensure_base_dirs()?;
    let lock = LaunchLock::acquire_with_liveness(&ctx.layout.lock_path(), |pid| {
        services.processes.is_running(pid)
    })?;
    if lock.recovered_stale() {
        warn!("previous launch did not exit cleanly");
    }

    let mut store = ctx.config_store();
    let config = read_config(&mut store);
    let mut app = build_app(identity, config.as_ref(), &ctx.layout)?;
    let history = launch_history(config.as_ref());

    let mut conditions = LaunchConditions::derive(history.as_ref(), &app);
    conditions.reset = options.reset;
    let mut notice = WelcomeNotice::new(&app, &conditions);
    notice.abnormal_exit = lock.recovered_stale();
    if options.reset {
        notice.reset = Some(ResetReason::UserRequested);
    }
    info!(
        new = conditions.is_new,
        updated_from = conditions.updated_from.as_deref(),
        edited = conditions.edited,
        engine_changed = conditions.engine_changed_from.is_some(),
        "launch conditions"
    );

    let roots = SearchRoots::standard(&ctx.home, Some(ctx.layout.adjacent_runtime_path()));
    let explicit_payload_path = config
        .as_ref()
        .is_some_and(|config| config.payload_path.is_some());
    let located = locate(
        &mut app,
        &roots,
        services.index,
        settings.runtime_bundle_id(),
        explicit_payload_path,
    );

    let payload = EnginePayload::new(ctx.layout.clone(), app.contents_path(), &lock)
        .with_wait_policy(settings.delete_wait());
    let prepared = prepare_payload(
        &mut app,
        &payload,
        &located,
        &conditions,
        options,
        ctx,
        services,
    )?;
    if let Some(reason) = prepared.reset {
        notice.reset.get_or_insert(reason);
    }

    let mut status = RunStatus::new();

    if let Some(previous) = &conditions.engine_changed_from {
        let profile_dir = ctx.layout.profile_dir();
        let migrator = ProfileMigrator::new(&profile_dir, ctx.layout.data_root(), &ctx.home);
        let report = migrator.migrate(previous, &app.engine)?;
        notice.extensions = report.extensions;
        notice.extensions_lost = report.extensions_lost;
        if let Some(reason) = report.reset {
            notice.reset.get_or_insert(reason);
        }
        if let Some(problems) = report.problems {
            status.record("profile migration", &anyhow!(problems));
        }
    }

    let show_notice = conditions.any() || notice.reset.is_some() || notice.abnormal_exit;
    let welcome_page = if show_notice {
        install_welcome(&located, ctx, &mut status)
    } else {
        None
    };

    if conditions.is_new {
        if let Some(page) = &welcome_page {
            match Url::from_file_path(page) {
                Ok(page_url) => {
                    let default_profile = ctx.layout.profile_dir().join(DEFAULT_PROFILE);
                    notice.bookmarks = add_welcome_bookmark(
                        &default_profile,
                        &format!("{} Welcome", app.name),
                        page_url.as_str(),
                    );
                    if notice.bookmarks.is_failure() {
                        status.record(
                            "welcome bookmark",
                            &anyhow!(
                                "could not add the welcome bookmark (code {})",
                                notice.bookmarks.code()
                            ),
                        );
                    }
                }
                Err(()) => debug!(page = %page.display(), "welcome page path is not absolute"),
            }
        }
    }

    if let Some(candidate) = located.update.clone() {
        let action = settings.update_action(
            config
                .as_ref()
                .and_then(|config| config.update_action.as_deref()),
        );
        let decision = status.always("local update", || {
            decide_local_update(&mut app, &candidate, action, services.presenter)
        });
        if decision == Some(LocalDecision::Apply) {
            save_config(&mut store, config.clone(), &app, &prepared, &mut status);
            let process = apply_local_update(&candidate, &app.bundle_path, services.processes)?;
            info!(version = %candidate.version, pid = process.pid, "handed off to runtime updater");
            return Ok(LaunchReport {
                result: LaunchResult::UpdateHandoff {
                    pid: process.pid,
                    version: candidate.version.as_str().to_string(),
                },
                outcome: located.outcome(),
                warnings: status.message(),
            });
        }
    }

    if settings.remote_checks_enabled() {
        if let Some(checker) = services.remote {
            run_remote_check(ctx, &app, checker, services, options.remote_mode, &mut status);
        }
    }

    save_config(&mut store, config, &app, &prepared, &mut status);

    let welcome = match &welcome_page {
        Some(page) => status.always("welcome notice", || notice.to_url(page)),
        None => None,
    };

    let pid = run_engine(&app, &payload, ctx, settings, services, options, welcome.as_ref())?;
    drop(payload);
    lock.release()?;

    Ok(LaunchReport {
        result: LaunchResult::Engine {
            pid,
            welcome,
            detached: options.detach,
        },
        outcome: located.outcome(),
        warnings: status.message(),
    })
}

/// Brings the payload to a valid inactive state, rebuilding it when needed.
fn prepare_payload(
    app: &mut AppInstance,
    payload: &EnginePayload<'_>,
    located: &Located,
    conditions: &LaunchConditions,
    options: &LaunchOptions,
    ctx: &AppContext,
    services: &LaunchServices<'_>,
) -> Result<PreparedPayload> {
    // The recorded identity belongs to the previous engine.
    let engine_changed = conditions.engine_changed_from.is_some();
    if engine_changed {
        app.engine_source = None;
    }

    let mut state = payload_state(app, payload);
    if state == PayloadState::Active {
        warn!("engine payload was left active, deactivating");
        payload.deactivate()?;
        state = PayloadState::Inactive;
    }

    let reset = match state {
        _ if engine_changed => None,
        PayloadState::Corrupt => Some(ResetReason::CorruptPayload),
        PayloadState::Inactive if !app.engine.is_internal() && app.engine_source.is_none() => {
            Some(ResetReason::EngineSourceMissing)
        }
        _ => None,
    };
    let rebuild = state == PayloadState::NoPayload
        || reset.is_some()
        || options.reset
        || engine_changed
        || (app.engine.is_internal() && conditions.updated_from.is_some());
    if !rebuild {
        debug!(state = state.as_str(), "engine payload is usable");
        return Ok(PreparedPayload::default());
    }

    if state != PayloadState::NoPayload {
        info!(state = state.as_str(), "rebuilding engine payload");
        payload.delete()?;
    }
    let (source, built_from) = engine_source(app, located, ctx, services)?;
    // Only the bundled engine ships a text Info.plist with tokens.
    let filter = match source {
        EngineSource::Internal { .. } => services.filter,
        EngineSource::External { .. } => None,
    };
    payload.create(app, &source, filter)?;
    Ok(PreparedPayload { reset, built_from })
}

fn payload_state(app: &mut AppInstance, payload: &EnginePayload<'_>) -> PayloadState {
    let (state, identity) = inspect_payload(app, payload);
    if app.engine.is_internal() && app.engine_source.is_none() {
        app.engine_source = identity;
    }
    state
}

/// Current payload state and the identity it was checked against: the
/// recorded one, else whatever the payload's own `Info.plist` declares.
pub(crate) fn inspect_payload(
    app: &AppInstance,
    payload: &EnginePayload<'_>,
) -> (PayloadState, Option<EngineIdentity>) {
    let parked = if path_exists(&payload.payload_path()) {
        payload.payload_path()
    } else if path_exists(&payload.launcher_path()) {
        payload.contents().to_path_buf()
    } else {
        return (PayloadState::NoPayload, None);
    };

    let identity = match &app.engine_source {
        Some(identity) => identity.clone(),
        None => match read_payload_identity(&parked) {
            Ok(identity) => identity,
            Err(err) => {
                warn!("engine payload identity is unreadable: {err:#}");
                return (PayloadState::Corrupt, None);
            }
        },
    };
    (payload.state(&identity), Some(identity))
}

fn engine_source(
    app: &AppInstance,
    located: &Located,
    ctx: &AppContext,
    services: &LaunchServices<'_>,
) -> Result<(EngineSource, Option<RuntimeVersion>)> {
    if app.engine.is_internal() {
        located.ensure_payload_source()?;
        let runtime = located
            .current
            .as_ref()
            .ok_or_else(|| LifecycleError::fatal("no runtime matches the app version"))?;
        return Ok((
            EngineSource::Internal {
                runtime: runtime.path.clone(),
            },
            Some(runtime.version.clone()),
        ));
    }

    let bundle_id = &app.engine.bundle_id;
    let (path, _) = find_external_engine(bundle_id, &ctx.home, services.index).ok_or_else(|| {
        LifecycleError::fatal(format!("no usable install of {bundle_id} was found"))
    })?;
    Ok((
        EngineSource::External {
            app: path,
            bundle_id: bundle_id.clone(),
        },
        None,
    ))
}

fn install_welcome(
    located: &Located,
    ctx: &AppContext,
    status: &mut RunStatus,
) -> Option<PathBuf> {
    let Some(runtime) = located.current.as_ref().or(located.latest.as_ref()) else {
        debug!("no runtime to supply the welcome page");
        return None;
    };
    status.always("install welcome page", || {
        install_welcome_assets(&runtime.path, &ctx.layout)
    })
}

fn run_remote_check(
    ctx: &AppContext,
    app: &AppInstance,
    checker: &dyn RemoteChecker,
    services: &LaunchServices<'_>,
    mode: RemoteMode,
    status: &mut RunStatus,
) {
    let check = RemoteUpdateCheck {
        record_path: ctx.layout.update_check_path(),
        result_path: ctx.layout.update_result_path(),
        mode,
        checker,
        presenter: services.presenter,
        launcher: services.processes,
    };
    let outcome = status.always("remote update check", || {
        check.run(app, current_unix_timestamp()?)
    });
    if let Some(RemoteCheckOutcome::Failed {
        message,
        report: true,
        ..
    }) = outcome
    {
        status.record("remote update check", &anyhow!(message));
    }
}

fn save_config(
    store: &mut ConfigStore,
    config: Option<AppConfig>,
    app: &AppInstance,
    prepared: &PreparedPayload,
    status: &mut RunStatus,
) {
    let live = record_launch(
        config.unwrap_or_default(),
        app,
        prepared.built_from.as_ref(),
    );
    status.always("save app config", || store.write(&live, app.engine.kind, false));
}

/// Activates the payload and starts the engine, then packs the payload away
/// again: once the engine is up when detached, otherwise after it exits.
/// Either way the payload is inactive before the launch lock is released.
fn run_engine(
    app: &AppInstance,
    payload: &EnginePayload<'_>,
    ctx: &AppContext,
    settings: &Settings,
    services: &LaunchServices<'_>,
    options: &LaunchOptions,
    welcome: Option<&Url>,
) -> Result<u32> {
    let identity = app
        .engine_source
        .as_ref()
        .ok_or_else(|| LifecycleError::fatal("engine payload has no recorded identity"))?;
    payload.activate()?;

    let executable = app.contents_path().join("MacOS").join(&identity.executable);
    let mut args = vec![format!(
        "--user-data-dir={}",
        ctx.layout.profile_dir().display()
    )];
    if let Some(welcome) = welcome {
        args.push(welcome.to_string());
    }

    let mut status = RunStatus::new();
    let launch_wait = settings.launch_wait();
    let pid = status.run("start engine", || {
        let process = services.processes.launch(&executable, &args)?;
        wait_until("engine to start", &launch_wait, || {
            services.processes.is_running(process.pid)
        })?;
        Ok(process.pid)
    });

    if let Some(pid) = pid.filter(|_| !options.detach) {
        let exit_wait = WaitPolicy::new(launch_wait.interval, Duration::MAX);
        status.run("wait for engine exit", || {
            wait_until("engine to exit", &exit_wait, || {
                !services.processes.is_running(pid)
            })
            .map_err(Into::into)
        });
    }
    status.always("deactivate engine payload", || payload.deactivate());

    status
        .into_result()
        .context("engine launch failed")?;
    pid.ok_or_else(|| anyhow!("engine did not start"))
}
