use anyhow::{anyhow, Context, Result};
use ssb_core::{EngineKind, EngineType};
use ssb_engine::{EnginePayload, ProfileMigrator, TokenFilter};
use ssb_runtime::{locate, SearchRoots, SpotlightIndex};
use ssb_store::{
    current_unix_timestamp, home_dir, render_assignment, ConfigKey, LaunchLock, CONFIG_KEYS,
};
use ssb_update::{
    GithubReleaseChecker, RemoteCheckOutcome, RemoteChecker, RemoteMode, RemoteUpdateCheck,
};

use crate::app_context::{build_app, read_config, AppContext};
use crate::completion::write_completions_script;
use crate::host::{pinned_url_handler, HostIdentity, NativeHost, SystemOpener};
use crate::launch::{inspect_payload, run_launch, LaunchOptions, LaunchResult, LaunchServices};
use crate::render::{
    current_output_style, format_engine_status_lines, format_launch_outcome, format_located_lines,
    format_migration_lines, format_remote_outcome, print_lines, print_status, OutputStyle,
};
use crate::settings::Settings;
use crate::terminal::{stdio_presenter, SystemLauncher};
use crate::{AppIdentityArgs, Cli, Commands, ConfigCommands, EngineCommands, ProfileCommands};

/// Runs one command and returns the process exit code.
pub(crate) fn run_cli(cli: Cli, settings: Settings) -> Result<i32> {
    let style = current_output_style();
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_completions_script(*shell, &mut stdout)?;
        return Ok(0);
    }
    if let Commands::Host {
        print_version,
        display_name,
        short_name,
        origin,
    } = cli.command
    {
        return host_command(
            &cli.identity,
            print_version,
            display_name,
            short_name,
            origin.as_deref(),
        );
    }

    let ctx = AppContext::resolve(&cli.identity, cli.data_root.clone(), &settings, home_dir()?)?;
    let identity = &cli.identity;
    match cli.command {
        Commands::Launch {
            reset,
            detach,
            handoff,
        } => {
            let options = LaunchOptions {
                reset,
                detach,
                remote_mode: remote_mode(handoff),
            };
            launch_command(&ctx, identity, &settings, &options, style)
        }
        Commands::Locate => locate_command(&ctx, identity, &settings, style),
        Commands::Engine { command } => engine_command(&ctx, identity, &settings, command, style),
        Commands::Profile {
            command: ProfileCommands::Migrate { from },
        } => migrate_command(&ctx, identity, &from, style),
        Commands::Config { command } => config_command(&ctx, identity, command, style),
        Commands::UpdateCheck { handoff } => {
            update_check_command(&ctx, identity, &settings, remote_mode(handoff), style)
        }
        Commands::Completions { .. } | Commands::Host { .. } => Ok(0),
    }
}

fn host_command(
    identity: &AppIdentityArgs,
    print_version: bool,
    display_name: Option<String>,
    short_name: Option<String>,
    origin: Option<&str>,
) -> Result<i32> {
    if print_version {
        let version = identity
            .version
            .as_deref()
            .context("no app version; pass --app-version or set SSBVersion")?;
        println!("{version}");
        return Ok(0);
    }
    let host = NativeHost {
        identity: HostIdentity::from_args(identity, display_name, short_name)?,
        opener: &SystemOpener,
        pinned_handler: pinned_url_handler(&home_dir()?),
    };
    let handled = host.serve(&mut std::io::stdin().lock(), &mut std::io::stdout().lock())?;
    tracing::debug!(origin = origin.unwrap_or("unknown"), handled, "extension closed the pipe");
    Ok(0)
}

fn remote_mode(handoff: bool) -> RemoteMode {
    if handoff {
        RemoteMode::Handoff
    } else {
        RemoteMode::Dialog
    }
}

fn remote_checker(settings: &Settings) -> Result<Option<GithubReleaseChecker>> {
    match &settings.remote_update_url {
        Some(url) if settings.remote_checks_enabled() => {
            Ok(Some(GithubReleaseChecker::new(url.clone())?))
        }
        _ => Ok(None),
    }
}

fn launch_command(
    ctx: &AppContext,
    identity: &AppIdentityArgs,
    settings: &Settings,
    options: &LaunchOptions,
    style: OutputStyle,
) -> Result<i32> {
    let presenter = stdio_presenter();
    let processes = SystemLauncher::default();
    let remote = remote_checker(settings)?;
    let services = LaunchServices {
        presenter: &presenter,
        processes: &processes,
        index: &SpotlightIndex,
        remote: remote
            .as_ref()
            .map(|checker| checker as &dyn RemoteChecker),
        filter: Some(&TokenFilter),
    };

    let report = run_launch(ctx, identity, settings, &services, options)?;
    println!("{}", format_launch_outcome(report.outcome, style));
    match &report.result {
        LaunchResult::Engine {
            pid,
            welcome,
            detached,
        } => {
            let state = if *detached { "is running" } else { "exited" };
            print_status(style, "ok", &format!("engine (pid {pid}) {state}"));
            if let Some(welcome) = welcome {
                println!("welcome: {welcome}");
            }
        }
        LaunchResult::UpdateHandoff { pid, version } => print_status(
            style,
            "ok",
            &format!("updating to {version} (updater pid {pid})"),
        ),
    }
    if let Some(warnings) = &report.warnings {
        print_status(style, "warn", warnings);
    }
    Ok(0)
}

fn locate_command(
    ctx: &AppContext,
    identity: &AppIdentityArgs,
    settings: &Settings,
    style: OutputStyle,
) -> Result<i32> {
    let mut store = ctx.config_store();
    let config = read_config(&mut store);
    let mut app = build_app(identity, config.as_ref(), &ctx.layout)?;
    let roots = SearchRoots::standard(&ctx.home, Some(ctx.layout.adjacent_runtime_path()));
    let explicit_payload_path = config
        .as_ref()
        .is_some_and(|config| config.payload_path.is_some());
    let located = locate(
        &mut app,
        &roots,
        &SpotlightIndex,
        settings.runtime_bundle_id(),
        explicit_payload_path,
    );
    print_lines(&format_located_lines(&located, style));
    Ok(located.outcome().code())
}

fn engine_command(
    ctx: &AppContext,
    identity: &AppIdentityArgs,
    settings: &Settings,
    command: EngineCommands,
    style: OutputStyle,
) -> Result<i32> {
    let lock = LaunchLock::acquire(&ctx.layout.lock_path())?;
    let config = read_config(&mut ctx.config_store());
    let app = build_app(identity, config.as_ref(), &ctx.layout)?;
    let payload = EnginePayload::new(ctx.layout.clone(), app.contents_path(), &lock)
        .with_wait_policy(settings.delete_wait());

    match command {
        EngineCommands::Status => {
            let (state, identity) = inspect_payload(&app, &payload);
            print_lines(&format_engine_status_lines(state, identity.as_ref(), style));
        }
        EngineCommands::Validate => {
            let (_, identity) = inspect_payload(&app, &payload);
            let identity =
                identity.ok_or_else(|| anyhow!("there is no readable engine payload"))?;
            if let Err(err) = payload.validate(&identity) {
                print_status(style, "err", &err.to_string());
                return Ok(1);
            }
            print_status(style, "ok", "engine payload is valid");
        }
        EngineCommands::Activate => {
            payload.activate()?;
            print_status(style, "ok", "engine payload activated");
        }
        EngineCommands::Deactivate => {
            payload.deactivate()?;
            print_status(style, "ok", "engine payload deactivated");
        }
        EngineCommands::Delete => {
            payload.delete()?;
            print_status(style, "ok", "engine payload deleted");
        }
    }
    Ok(0)
}

fn migrate_command(
    ctx: &AppContext,
    identity: &AppIdentityArgs,
    from: &str,
    style: OutputStyle,
) -> Result<i32> {
    let from = EngineType::parse(from).context("invalid --from engine type")?;
    let _lock = LaunchLock::acquire(&ctx.layout.lock_path())?;
    let config = read_config(&mut ctx.config_store());
    let app = build_app(identity, config.as_ref(), &ctx.layout)?;

    let profile_dir = ctx.layout.profile_dir();
    let report = ProfileMigrator::new(&profile_dir, ctx.layout.data_root(), &ctx.home)
        .migrate(&from, &app.engine)?;
    print_lines(&format_migration_lines(&report, style));
    Ok(0)
}

fn engine_kind(identity: &AppIdentityArgs) -> Result<Option<EngineKind>> {
    identity
        .engine
        .as_deref()
        .map(|raw| EngineType::parse(raw).map(|engine| engine.kind))
        .transpose()
}

fn config_command(
    ctx: &AppContext,
    identity: &AppIdentityArgs,
    command: ConfigCommands,
    style: OutputStyle,
) -> Result<i32> {
    let mut store = ctx.config_store();
    match command {
        ConfigCommands::Show => {
            let Some(config) = store.read()? else {
                print_status(
                    style,
                    "warn",
                    &format!("no config at {}", store.path().display()),
                );
                return Ok(1);
            };
            let keys: Vec<ConfigKey> = match engine_kind(identity)? {
                Some(kind) => ConfigKey::active(kind).collect(),
                None => CONFIG_KEYS.to_vec(),
            };
            for key in keys {
                println!("{}", render_assignment(key.name(), &config.value(key)));
            }
        }
        ConfigCommands::Write { force } => {
            let kind = engine_kind(identity)?
                .context("no engine type; pass --engine or set SSBEngineType")?;
            let _lock = LaunchLock::acquire(&ctx.layout.lock_path())?;
            let config = store.read()?.unwrap_or_default();
            let message = if store.write(&config, kind, force)? {
                "config written"
            } else {
                "config unchanged"
            };
            print_status(style, "ok", message);
        }
    }
    Ok(0)
}

fn update_check_command(
    ctx: &AppContext,
    identity: &AppIdentityArgs,
    settings: &Settings,
    mode: RemoteMode,
    style: OutputStyle,
) -> Result<i32> {
    let url = settings
        .remote_update_url
        .as_deref()
        .context("remote_update_url is not set in settings")?;
    let checker = GithubReleaseChecker::new(url)?;
    let config = read_config(&mut ctx.config_store());
    let app = build_app(identity, config.as_ref(), &ctx.layout)?;

    let presenter = stdio_presenter();
    let processes = SystemLauncher::default();
    let check = RemoteUpdateCheck {
        record_path: ctx.layout.update_check_path(),
        result_path: ctx.layout.update_result_path(),
        mode,
        checker: &checker,
        presenter: &presenter,
        launcher: &processes,
    };
    let outcome = check.run(&app, current_unix_timestamp()?)?;
    println!("{}", format_remote_outcome(&outcome, style));
    Ok(match outcome {
        RemoteCheckOutcome::Failed { .. } => 1,
        _ => 0,
    })
}
