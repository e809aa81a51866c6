use super::*;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::CommandFactory;
use ssb_core::{
    is_fatal, Dialog, DialogPresenter, DialogResponse, LaunchedProcess, ProcessLauncher,
};
use ssb_engine::{internal_engine_path, launch_services_path, TokenFilter};
use ssb_runtime::{Located, LocatorOutcome, RuntimeInstance, RUNTIME_APP_NAME};
use ssb_store::{AppConfig, AppLayout, ConfigStore};
use ssb_update::{RemoteMode, UpdateAction};
use url::Url;

use crate::app_context::{build_app, launch_history, record_launch, AppContext};
use crate::completion::write_completions_script;
use crate::host::{
    pinned_url_handler, read_frame, write_message, HostIdentity, NativeHost, UrlOpener,
    MAX_MESSAGE_BYTES,
};
use crate::launch::{run_launch, LaunchOptions, LaunchResult, LaunchServices};
use crate::render::{
    format_launch_outcome, format_located_lines, render_status_line, resolve_output_style,
    OutputStyle,
};
use crate::terminal::{parse_choice, TerminalPresenter};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "ssb-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

fn make_executable(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
    fs::write(path, body).expect("write executable");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
}

fn write_runtime(runtime: &Path, version: &str) {
    let resources = runtime.join("Contents").join("Resources");
    fs::create_dir_all(&resources).expect("create resources");
    fs::write(
        resources.join("runtime.json"),
        format!(r#"{{"version":"{version}","changes":["Faster startup"],"fixes":[]}}"#),
    )
    .expect("write descriptor");

    let engine = internal_engine_path(runtime);
    make_executable(&engine.join("MacOS").join("Brave Browser"), "#!/bin/sh\n");
    fs::write(
        engine.join("Info.plist"),
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<plist version=\"1.0\"><dict>\
<key>CFBundleIdentifier</key><string>com.brave.Browser</string>\
<key>CFBundleExecutable</key><string>Brave Browser</string>\
<key>CFBundleShortVersionString</key><string>1.60.0</string>\
<key>CFBundleName</key><string>@APP_NAME@</string>\
</dict></plist>\n",
    )
    .expect("write engine plist");

    let welcome = resources.join("Welcome");
    fs::create_dir_all(&welcome).expect("create welcome");
    fs::write(welcome.join("welcome.html"), "<html>welcome</html>").expect("write welcome");

    make_executable(
        &runtime.join("Contents").join("MacOS").join("ssb-update"),
        "#!/bin/sh\n",
    );
}

const ENGINE_PID: u32 = 4242;

/// Pretends every launched process starts, then exits on the next poll
/// unless `keep_running` is set.
#[derive(Default)]
struct FakeProcesses {
    launched: RefCell<Vec<(PathBuf, Vec<String>, bool)>>,
    polls: Cell<u32>,
    keep_running: bool,
}

impl ProcessLauncher for FakeProcesses {
    fn launch(&self, program: &Path, args: &[String]) -> Result<LaunchedProcess> {
        self.launched
            .borrow_mut()
            .push((program.to_path_buf(), args.to_vec(), program.exists()));
        self.polls.set(0);
        Ok(LaunchedProcess { pid: ENGINE_PID })
    }

    fn is_running(&self, pid: u32) -> bool {
        if pid != ENGINE_PID {
            return false;
        }
        if self.keep_running {
            return true;
        }
        let polls = self.polls.get();
        self.polls.set(polls + 1);
        polls == 0
    }
}

#[derive(Default)]
struct ScriptedPresenter {
    answers: RefCell<Vec<DialogResponse>>,
    shown: RefCell<Vec<Dialog>>,
}

impl ScriptedPresenter {
    fn answering(answers: &[DialogResponse]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().rev().copied().collect()),
            shown: RefCell::new(Vec::new()),
        }
    }
}

impl DialogPresenter for ScriptedPresenter {
    fn present(&self, dialog: &Dialog) -> Result<DialogResponse> {
        self.shown.borrow_mut().push(dialog.clone());
        Ok(self
            .answers
            .borrow_mut()
            .pop()
            .unwrap_or(DialogResponse::Cancelled))
    }
}

fn no_index(_bundle_id: &str) -> Result<Vec<PathBuf>> {
    Ok(Vec::new())
}

struct LaunchFixture {
    root: PathBuf,
    ctx: AppContext,
    bundle: PathBuf,
    settings: Settings,
}

impl LaunchFixture {
    fn new() -> Self {
        let root = test_root();
        let data_root = root
            .join("Library")
            .join("Application Support")
            .join("SSB")
            .join("Apps");
        let ctx = AppContext {
            layout: AppLayout::new(data_root, "com.example.mail"),
            home: root.clone(),
        };

        let bundle = root.join("Apps").join("Mail.app");
        let contents = bundle.join("Contents");
        fs::create_dir_all(contents.join("MacOS")).expect("create launcher");
        fs::write(contents.join("Info.plist"), "launcher plist").expect("write");
        fs::write(contents.join("MacOS").join("Mail"), "launcher").expect("write");

        write_runtime(&root.join("Applications").join(RUNTIME_APP_NAME), "2.1.0");

        let settings = Settings {
            poll_interval_ms: Some(1),
            launch_timeout_ms: Some(500),
            ..Settings::default()
        };
        Self {
            root,
            ctx,
            bundle,
            settings,
        }
    }

    fn identity(&self) -> AppIdentityArgs {
        AppIdentityArgs {
            id: Some("com.example.mail".to_string()),
            version: Some("2.1.0".to_string()),
            engine: Some("internal|com.brave.Browser".to_string()),
            name: Some("Mail".to_string()),
            bundle: Some(self.bundle.clone()),
            build_stamp: Some("build-1".to_string()),
        }
    }

    fn launch(
        &self,
        identity: &AppIdentityArgs,
        presenter: &dyn DialogPresenter,
        processes: &FakeProcesses,
        options: &LaunchOptions,
    ) -> Result<crate::launch::LaunchReport> {
        let services = LaunchServices {
            presenter,
            processes,
            index: &no_index,
            remote: None,
            filter: Some(&TokenFilter),
        };
        run_launch(&self.ctx, identity, &self.settings, &services, options)
    }

    fn launch_default(&self) -> crate::launch::LaunchReport {
        self.launch(
            &self.identity(),
            &ScriptedPresenter::default(),
            &FakeProcesses::default(),
            &LaunchOptions::default(),
        )
        .expect("launch")
    }

    fn read_config(&self) -> AppConfig {
        ConfigStore::new(self.ctx.layout.config_path())
            .read()
            .expect("read config")
            .expect("config exists")
    }
}

impl Drop for LaunchFixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn query_of(url: &Url) -> BTreeMap<String, String> {
    url.query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

fn welcome_of(report: &crate::launch::LaunchReport) -> Option<Url> {
    match &report.result {
        LaunchResult::Engine { welcome, .. } => welcome.clone(),
        LaunchResult::UpdateHandoff { .. } => None,
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn cli_parses_identity_and_launch_flags() {
    let cli = Cli::try_parse_from([
        "ssb",
        "--app-id",
        "com.example.mail",
        "--engine",
        "external|com.brave.Browser",
        "launch",
        "--reset",
        "--handoff",
    ])
    .expect("parse");
    assert_eq!(cli.identity.id.as_deref(), Some("com.example.mail"));
    assert_eq!(
        cli.identity.engine.as_deref(),
        Some("external|com.brave.Browser")
    );
    match cli.command {
        Commands::Launch {
            reset,
            detach,
            handoff,
        } => {
            assert!(reset);
            assert!(!detach);
            assert!(handoff);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_parses_nested_engine_command() {
    let cli = Cli::try_parse_from(["ssb", "engine", "delete"]).expect("parse");
    assert!(matches!(
        cli.command,
        Commands::Engine {
            command: EngineCommands::Delete
        }
    ));
}

#[test]
fn completions_script_names_the_binary() {
    let mut output = Vec::new();
    write_completions_script(CompletionShell::Bash, &mut output).expect("generate");
    let script = String::from_utf8(output).expect("utf8");
    assert!(script.contains("ssb"));
    assert!(script.contains("launch"));
}

#[test]
fn settings_parse_every_key() {
    let settings = Settings::from_toml_str(
        r#"
data_root = "/tmp/ssb-apps"
runtime_bundle_id = "org.example.Runtime"
update_action = "auto"
remote_update_url = "https://example.invalid/releases"
remote_checks = true
delete_timeout_ms = 2000
launch_timeout_ms = 3000
poll_interval_ms = 50
log_filter = "ssb=debug"
"#,
    )
    .expect("parse");

    assert_eq!(settings.data_root, Some(PathBuf::from("/tmp/ssb-apps")));
    assert_eq!(settings.runtime_bundle_id(), "org.example.Runtime");
    assert_eq!(settings.update_action(None), UpdateAction::Auto);
    assert!(settings.remote_checks_enabled());
    assert_eq!(settings.log_filter(), "ssb=debug");
    assert_eq!(settings.delete_wait().timeout.as_millis(), 2000);
    assert_eq!(settings.launch_wait().interval.as_millis(), 50);
}

#[test]
fn settings_reject_unknown_keys_and_bad_actions() {
    assert!(Settings::from_toml_str("colour = true\n").is_err());
    assert!(Settings::from_toml_str("update_action = \"sometimes\"\n").is_err());
}

#[test]
fn settings_defaults_apply_when_file_is_missing() {
    let root = test_root();
    let settings = Settings::load(&root.join("settings.toml")).expect("load");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.runtime_bundle_id(), ssb_runtime::DEFAULT_RUNTIME_BUNDLE_ID);
    assert_eq!(settings.log_filter(), crate::settings::DEFAULT_LOG_FILTER);
    assert_eq!(settings.update_action(None), UpdateAction::Ask);
    assert!(!settings.remote_checks_enabled());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn app_update_action_overrides_settings() {
    let settings = Settings {
        update_action: Some("auto".to_string()),
        ..Settings::default()
    };
    assert_eq!(settings.update_action(Some("never")), UpdateAction::Never);
    assert_eq!(settings.update_action(None), UpdateAction::Auto);
}

#[test]
fn remote_checks_can_be_switched_off() {
    let settings = Settings {
        remote_update_url: Some("https://example.invalid".to_string()),
        remote_checks: Some(false),
        ..Settings::default()
    };
    assert!(!settings.remote_checks_enabled());
}

#[test]
fn default_settings_path_is_under_application_support() {
    assert_eq!(
        default_settings_path(Path::new("/Users/me")),
        PathBuf::from("/Users/me/Library/Application Support/SSB/settings.toml")
    );
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "engine payload activated"),
        "engine payload activated"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "bookmarks unreadable"),
        "[WARN] bookmarks unreadable"
    );
    assert_eq!(resolve_output_style(false), OutputStyle::Plain);
    assert_eq!(resolve_output_style(true), OutputStyle::Rich);
}

#[test]
fn located_lines_end_with_outcome_code() {
    let located = Located {
        latest: Some(RuntimeInstance::new("/Applications/SSB.app", "2.2.0")),
        ..Located::default()
    };
    let lines = format_located_lines(&located, OutputStyle::Plain);
    assert_eq!(lines[0], "current: none");
    assert_eq!(lines[1], "latest: 2.2.0 (/Applications/SSB.app)");
    assert_eq!(
        lines.last().cloned(),
        Some(format!(
            "outcome 4: {}",
            ssb_runtime::LocatorOutcome::LatestOnly.describe()
        ))
    );
}

#[test]
fn launch_outcome_line_names_the_code() {
    assert_eq!(
        format_launch_outcome(LocatorOutcome::CurrentAndLatest, OutputStyle::Rich),
        "[..] runtime search: current and latest found, no update (outcome 3)"
    );
    assert_eq!(
        format_launch_outcome(LocatorOutcome::LatestOnly, OutputStyle::Rich),
        "[WARN] runtime search: only latest found (outcome 4)"
    );
}

#[test]
fn parse_choice_accepts_numbers_and_labels() {
    let dialog = Dialog::new("Update", "Update now?", &["Update", "Later"]);
    assert_eq!(parse_choice("1", &dialog), Some(DialogResponse::Button(0)));
    assert_eq!(parse_choice(" later\n", &dialog), Some(DialogResponse::Button(1)));
    assert_eq!(parse_choice("", &dialog), Some(DialogResponse::Cancelled));
    assert_eq!(parse_choice("3", &dialog), None);
    assert_eq!(parse_choice("maybe", &dialog), None);
}

#[test]
fn terminal_presenter_reprompts_until_a_valid_choice() {
    let presenter = TerminalPresenter::new(Cursor::new("maybe\n2\n"), Vec::new());
    let dialog = Dialog::new("Update", "Update now?", &["Update", "Later"]);
    assert_eq!(
        presenter.present(&dialog).expect("present"),
        DialogResponse::Button(1)
    );
}

#[test]
fn terminal_presenter_cancels_on_end_of_input() {
    let presenter = TerminalPresenter::new(Cursor::new(""), Vec::new());
    let dialog = Dialog::new("Update", "Update now?", &["Update", "Later"]);
    assert_eq!(
        presenter.present(&dialog).expect("present"),
        DialogResponse::Cancelled
    );
}

#[test]
fn app_context_rejects_path_like_identifiers() {
    let identity = AppIdentityArgs {
        id: Some("../escape".to_string()),
        ..AppIdentityArgs::default()
    };
    let err = AppContext::resolve(
        &identity,
        Some(PathBuf::from("/tmp/apps")),
        &Settings::default(),
        PathBuf::from("/tmp"),
    )
    .expect_err("must reject");
    assert!(is_fatal(&err));

    let missing = AppContext::resolve(
        &AppIdentityArgs::default(),
        None,
        &Settings::default(),
        PathBuf::from("/tmp"),
    );
    assert!(missing.is_err());
}

#[test]
fn build_app_falls_back_to_recorded_bundle_path() {
    let layout = AppLayout::new("/tmp/apps", "com.example.mail");
    let identity = AppIdentityArgs {
        id: Some("com.example.mail".to_string()),
        version: Some("2.1.0".to_string()),
        engine: Some("external|com.brave.Browser".to_string()),
        ..AppIdentityArgs::default()
    };
    let config = AppConfig {
        app_path: Some("/Applications/Mail.app".to_string()),
        update_ignore_versions: vec!["2.2.0".to_string()],
        engine_source_info: vec![
            "com.brave.Browser".to_string(),
            "Brave Browser".to_string(),
            "1.60.0".to_string(),
            "Brave Browser".to_string(),
        ],
        ..AppConfig::default()
    };

    let app = build_app(&identity, Some(&config), &layout).expect("build");
    assert_eq!(app.bundle_path, PathBuf::from("/Applications/Mail.app"));
    assert_eq!(app.name, "com.example.mail");
    assert_eq!(app.update_ignore_versions, vec!["2.2.0".to_string()]);
    assert_eq!(
        app.engine_source.as_ref().map(|source| source.executable.as_str()),
        Some("Brave Browser")
    );
    assert!(build_app(&identity, None, &layout).is_err());
}

#[test]
fn history_and_recorded_launch_round_trip() {
    assert!(launch_history(None).is_none());

    let layout = AppLayout::new("/tmp/apps", "com.example.mail");
    let identity = AppIdentityArgs {
        id: Some("com.example.mail".to_string()),
        version: Some("2.1.0".to_string()),
        engine: Some("internal|com.brave.Browser".to_string()),
        bundle: Some(PathBuf::from("/Applications/Mail.app")),
        build_stamp: Some("build-7".to_string()),
        ..AppIdentityArgs::default()
    };
    let app = build_app(&identity, None, &layout).expect("build");
    let recorded = record_launch(
        AppConfig::default(),
        &app,
        Some(&ssb_core::RuntimeVersion::new("2.1.0")),
    );
    assert_eq!(recorded.last_run_version.as_deref(), Some("2.1.0"));
    assert_eq!(
        recorded.last_run_engine_type.as_deref(),
        Some("internal|com.brave.Browser")
    );
    assert_eq!(recorded.engine_runtime_version.as_deref(), Some("2.1.0"));

    let history = launch_history(Some(&recorded)).expect("history");
    assert_eq!(history.last_version.as_deref(), Some("2.1.0"));
    assert_eq!(history.last_engine, Some(app.engine.clone()));
    assert_eq!(history.last_build_stamp.as_deref(), Some("build-7"));
}

#[test]
fn first_launch_builds_payload_and_shows_welcome() {
    let fixture = LaunchFixture::new();
    let processes = FakeProcesses::default();
    let report = fixture
        .launch(
            &fixture.identity(),
            &ScriptedPresenter::default(),
            &processes,
            &LaunchOptions::default(),
        )
        .expect("launch");

    assert_eq!(report.warnings, None);
    let welcome = welcome_of(&report).expect("welcome notice");
    let query = query_of(&welcome);
    assert_eq!(query.get("v").map(String::as_str), Some("2.1.0"));
    assert_eq!(
        query.get("e").map(String::as_str),
        Some("internal|com.brave.Browser")
    );
    assert_eq!(query.get("b").map(String::as_str), Some("1"));
    assert!(!query.contains_key("fa"));

    let launched = processes.launched.borrow();
    assert_eq!(launched.len(), 1);
    let (program, args, existed) = &launched[0];
    assert_eq!(
        program,
        &fixture.bundle.join("Contents").join("MacOS").join("Brave Browser")
    );
    assert!(existed, "engine must be active while it runs");
    assert_eq!(
        args[0],
        format!("--user-data-dir={}", fixture.ctx.layout.profile_dir().display())
    );
    assert_eq!(args[1], welcome.to_string());

    // The payload is packed away again after the engine exits.
    assert!(fixture.ctx.layout.payload_path().is_dir());
    assert!(!fixture.ctx.layout.launcher_path().exists());
    assert!(fixture.bundle.join("Contents").join("MacOS").join("Mail").exists());
    let plist = fs::read_to_string(fixture.ctx.layout.payload_path().join("Info.plist"))
        .expect("payload plist");
    assert!(plist.contains("<key>CFBundleName</key><string>Mail</string>"));

    assert!(fixture
        .ctx
        .layout
        .profile_dir()
        .join("Default")
        .join("Bookmarks")
        .is_file());
    assert!(!fixture.ctx.layout.lock_path().exists());

    let config = fixture.read_config();
    assert_eq!(config.last_run_version.as_deref(), Some("2.1.0"));
    assert_eq!(config.last_run_build_stamp.as_deref(), Some("build-1"));
    assert_eq!(config.engine_runtime_version.as_deref(), Some("2.1.0"));
}

#[test]
fn unchanged_relaunch_is_quiet() {
    let fixture = LaunchFixture::new();
    fixture.launch_default();
    let config_before = fs::read_to_string(fixture.ctx.layout.config_path()).expect("config");

    let report = fixture.launch_default();
    assert_eq!(welcome_of(&report), None);
    assert_eq!(
        fs::read_to_string(fixture.ctx.layout.config_path()).expect("config"),
        config_before
    );
}

#[test]
fn stale_lock_reports_abnormal_exit() {
    let fixture = LaunchFixture::new();
    fixture.launch_default();
    fs::write(
        fixture.ctx.layout.lock_path(),
        "pid=999999\nstarted_at_unix=1\n",
    )
    .expect("plant stale lock");

    let report = fixture.launch_default();
    let query = query_of(&welcome_of(&report).expect("welcome notice"));
    assert_eq!(query.get("fa").map(String::as_str), Some("1"));
}

#[test]
fn user_reset_rebuilds_payload() {
    let fixture = LaunchFixture::new();
    fixture.launch_default();
    let marker = fixture.ctx.layout.payload_path().join("stale-marker");
    fs::write(&marker, "old").expect("write marker");

    let report = fixture
        .launch(
            &fixture.identity(),
            &ScriptedPresenter::default(),
            &FakeProcesses::default(),
            &LaunchOptions {
                reset: true,
                ..LaunchOptions::default()
            },
        )
        .expect("launch");
    let query = query_of(&welcome_of(&report).expect("welcome notice"));
    assert_eq!(query.get("rt").map(String::as_str), Some("3"));
    assert!(!marker.exists());
    assert!(fixture.ctx.layout.payload_path().is_dir());
}

#[test]
fn corrupt_payload_is_rebuilt_and_reported() {
    let fixture = LaunchFixture::new();
    fixture.launch_default();
    std::os::unix::fs::symlink(
        fixture.root.join("Old Engine.app"),
        fixture.ctx.layout.engine_dir().join("Old Engine.app"),
    )
    .expect("plant stale link");

    let report = fixture.launch_default();
    let query = query_of(&welcome_of(&report).expect("welcome notice"));
    assert_eq!(query.get("rt").map(String::as_str), Some("1"));
    assert!(fixture.ctx.layout.payload_path().is_dir());
    assert!(!fixture
        .ctx
        .layout
        .engine_dir()
        .join("Old Engine.app")
        .exists());

    let report = fixture.launch_default();
    assert_eq!(welcome_of(&report), None);
}

#[test]
fn engine_family_change_clears_profile() {
    let fixture = LaunchFixture::new();
    let mut previous = fixture.identity();
    previous.engine = Some("internal|com.google.Chrome".to_string());
    fixture
        .launch(
            &previous,
            &ScriptedPresenter::default(),
            &FakeProcesses::default(),
            &LaunchOptions::default(),
        )
        .expect("first launch");

    let default = fixture.ctx.layout.profile_dir().join("Default");
    fs::write(default.join("Cookies"), "cookies").expect("write cookies");
    fs::write(default.join("History"), "history").expect("write history");

    let report = fixture.launch_default();
    let query = query_of(&welcome_of(&report).expect("welcome notice"));
    assert_eq!(
        query.get("oe").map(String::as_str),
        Some("internal|com.google.Chrome")
    );
    assert_eq!(query.get("rt").map(String::as_str), Some("0"));
    assert!(!default.join("Cookies").exists());
    assert!(default.join("History").exists());
    assert_eq!(
        fixture.read_config().last_run_engine_type.as_deref(),
        Some("internal|com.brave.Browser")
    );
}

#[test]
fn same_major_update_hands_off_when_automatic() {
    let fixture = LaunchFixture::new();
    fixture.launch_default();
    let newer = fixture.ctx.layout.adjacent_runtime_path();
    write_runtime(&newer, "2.3.0");
    fs::write(
        fixture.ctx.layout.config_path(),
        fs::read_to_string(fixture.ctx.layout.config_path())
            .expect("config")
            .replace("SSBUpdateAction=''", "SSBUpdateAction='auto'"),
    )
    .expect("set update action");

    let processes = FakeProcesses::default();
    let report = fixture
        .launch(
            &fixture.identity(),
            &ScriptedPresenter::default(),
            &processes,
            &LaunchOptions::default(),
        )
        .expect("launch");

    assert_eq!(
        report.result,
        LaunchResult::UpdateHandoff {
            pid: ENGINE_PID,
            version: "2.3.0".to_string(),
        }
    );
    let launched = processes.launched.borrow();
    assert_eq!(
        launched[0].0,
        newer.join("Contents").join("MacOS").join("ssb-update")
    );
    assert_eq!(
        launched[0].1,
        vec!["--app".to_string(), fixture.bundle.display().to_string()]
    );
}

#[test]
fn ignoring_an_update_records_it_and_still_launches() {
    let fixture = LaunchFixture::new();
    fixture.launch_default();
    write_runtime(&fixture.ctx.layout.adjacent_runtime_path(), "2.3.0");

    let presenter = ScriptedPresenter::answering(&[DialogResponse::Button(2)]);
    let report = fixture
        .launch(
            &fixture.identity(),
            &presenter,
            &FakeProcesses::default(),
            &LaunchOptions::default(),
        )
        .expect("launch");

    assert!(matches!(report.result, LaunchResult::Engine { .. }));
    assert_eq!(presenter.shown.borrow().len(), 1);
    assert!(presenter.shown.borrow()[0].message.contains("Faster startup"));
    assert_eq!(
        fixture.read_config().update_ignore_versions,
        vec!["2.3.0".to_string()]
    );
}

#[test]
fn detached_launch_packs_payload_before_releasing_lock() {
    let fixture = LaunchFixture::new();
    let processes = FakeProcesses {
        keep_running: true,
        ..FakeProcesses::default()
    };
    let report = fixture
        .launch(
            &fixture.identity(),
            &ScriptedPresenter::default(),
            &processes,
            &LaunchOptions {
                detach: true,
                remote_mode: RemoteMode::Handoff,
                ..LaunchOptions::default()
            },
        )
        .expect("launch");
    assert!(matches!(
        report.result,
        LaunchResult::Engine { detached: true, .. }
    ));
    assert!(processes.launched.borrow()[0].2, "engine must be active when started");

    // The engine is still running, yet the bundle holds its launcher again.
    assert!(!fixture.ctx.layout.launcher_path().exists());
    assert!(fixture.ctx.layout.payload_path().is_dir());
    assert!(fixture.bundle.join("Contents").join("MacOS").join("Mail").exists());
    assert!(!fixture.ctx.layout.lock_path().exists());

    // The next launch finds a usable inactive payload.
    let report = fixture.launch_default();
    assert_eq!(welcome_of(&report), None);
    assert!(fixture.ctx.layout.payload_path().is_dir());
}

#[test]
fn missing_runtime_is_fatal_for_internal_engine() {
    let fixture = LaunchFixture::new();
    fs::remove_dir_all(fixture.root.join("Applications")).expect("remove runtime");

    let err = fixture
        .launch(
            &fixture.identity(),
            &ScriptedPresenter::default(),
            &FakeProcesses::default(),
            &LaunchOptions::default(),
        )
        .expect_err("must fail");
    assert!(is_fatal(&err));
    assert!(!fixture.ctx.layout.payload_path().exists());
    assert!(!fixture.ctx.layout.lock_path().exists());
}

#[derive(Default)]
struct RecordingOpener {
    opened: RefCell<Vec<(String, Option<String>)>>,
}

impl UrlOpener for RecordingOpener {
    fn open(&self, url: &str, handler: Option<&str>) -> Result<()> {
        if url.starts_with("bad:") {
            anyhow::bail!("no application can open {url}");
        }
        self.opened
            .borrow_mut()
            .push((url.to_string(), handler.map(str::to_string)));
        Ok(())
    }
}

fn frame(body: &[u8]) -> Vec<u8> {
    let mut framed = u32::try_from(body.len())
        .expect("length")
        .to_ne_bytes()
        .to_vec();
    framed.extend_from_slice(body);
    framed
}

fn host_identity() -> HostIdentity {
    HostIdentity {
        version: "1.4.0".to_string(),
        id: "com.example.mail".to_string(),
        name: "Example Mail".to_string(),
        short_name: "Mail".to_string(),
    }
}

fn write_launch_services(home: &Path, http_handler: &str) {
    let prefs = launch_services_path(home);
    fs::create_dir_all(prefs.parent().expect("parent")).expect("create prefs dir");
    fs::write(
        &prefs,
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<plist version=\"1.0\"><dict>\
<key>LSHandlers</key><array>\
<dict><key>LSHandlerContentType</key><string>public.html</string>\
<key>LSHandlerRoleAll</key><string>org.mozilla.firefox</string></dict>\
<dict><key>LSHandlerURLScheme</key><string>http</string>\
<key>LSHandlerRoleAll</key><string>{http_handler}</string></dict>\
</array></dict></plist>\n"
        ),
    )
    .expect("write launch services prefs");
}

#[test]
fn cli_parses_host_modes() {
    let cli = Cli::try_parse_from(["ssb", "--app-version", "1.4.0", "host", "-v"]).expect("parse");
    assert!(matches!(
        cli.command,
        Commands::Host {
            print_version: true,
            origin: None,
            ..
        }
    ));

    let cli = Cli::try_parse_from(["ssb", "host", "chrome-extension://abcdef/"]).expect("parse");
    match cli.command {
        Commands::Host {
            print_version,
            origin,
            ..
        } => {
            assert!(!print_version);
            assert_eq!(origin.as_deref(), Some("chrome-extension://abcdef/"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn host_identity_falls_back_to_app_name() {
    let args = AppIdentityArgs {
        id: Some("com.example.mail".to_string()),
        version: Some("1.4.0".to_string()),
        name: Some("Mail".to_string()),
        ..AppIdentityArgs::default()
    };
    let identity = HostIdentity::from_args(&args, None, None).expect("identity");
    assert_eq!(identity.short_name, "Mail");
    assert_eq!(identity.name, "Mail");

    let missing_version = AppIdentityArgs {
        version: None,
        ..args
    };
    assert!(HostIdentity::from_args(&missing_version, None, None).is_err());
}

#[test]
fn host_answers_version_and_url_messages() {
    let opener = RecordingOpener::default();
    let host = NativeHost {
        identity: host_identity(),
        opener: &opener,
        pinned_handler: Some("com.google.Chrome".to_string()),
    };
    let mut input = Vec::new();
    input.extend(frame(br#"{"version":true}"#));
    input.extend(frame(b"{not json"));
    input.extend(frame(br#"{"url":"https://example.com/inbox"}"#));
    input.extend(frame(br#"{"url":"bad:link"}"#));
    let mut output = Vec::new();

    let handled = host
        .serve(&mut Cursor::new(input), &mut output)
        .expect("serve");
    assert_eq!(handled, 4);

    let mut replies = Cursor::new(output);
    let mut next = || -> serde_json::Value {
        let body = read_frame(&mut replies)
            .expect("read reply")
            .expect("reply present");
        serde_json::from_slice(&body).expect("reply is json")
    };
    assert_eq!(
        next(),
        serde_json::json!({
            "version": "1.4.0",
            "ssbID": "com.example.mail",
            "ssbName": "Example Mail",
            "ssbShortName": "Mail",
        })
    );
    assert_eq!(
        next(),
        serde_json::json!({ "result": "success", "url": "https://example.com/inbox" })
    );
    assert_eq!(
        next(),
        serde_json::json!({ "result": "error", "url": "bad:link" })
    );
    assert!(read_frame(&mut replies).expect("read").is_none());

    assert_eq!(
        opener.opened.borrow().as_slice(),
        &[(
            "https://example.com/inbox".to_string(),
            Some("com.google.Chrome".to_string())
        )]
    );
}

#[test]
fn host_rejects_oversized_messages() {
    let mut input = Cursor::new((MAX_MESSAGE_BYTES + 1).to_ne_bytes().to_vec());
    let err = read_frame(&mut input).expect_err("must reject");
    assert!(err.to_string().contains("exceeds"));

    let mut truncated = Cursor::new(frame(b"{}")[..5].to_vec());
    assert!(read_frame(&mut truncated).is_err());
}

#[test]
fn written_messages_carry_their_length() {
    let mut output = Vec::new();
    write_message(&mut output, &serde_json::json!({ "a": 1 })).expect("write");
    assert_eq!(&output[..4], &7u32.to_ne_bytes());
    assert_eq!(&output[4..], br#"{"a":1}"#);
}

#[test]
fn chrome_default_browser_is_pinned() {
    let home = test_root();
    assert_eq!(pinned_url_handler(&home), None);

    write_launch_services(&home, "com.google.Chrome");
    assert_eq!(
        pinned_url_handler(&home).as_deref(),
        Some("com.google.Chrome")
    );

    write_launch_services(&home, "com.apple.Safari");
    assert_eq!(pinned_url_handler(&home), None);
    let _ = fs::remove_dir_all(home);
}
