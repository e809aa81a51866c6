mod app_context;
mod completion;
mod dispatch;
mod host;
mod launch;
mod render;
mod settings;
mod terminal;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::dispatch::run_cli;
use crate::settings::{default_settings_path, Settings};

#[derive(Parser, Debug)]
#[command(name = "ssb")]
#[command(about = "Site-specific browser app lifecycle manager", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Settings file (defaults to ~/Library/Application Support/SSB/settings.toml).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Root directory holding every app's data directory.
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,
    #[command(flatten)]
    identity: AppIdentityArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Identity of the app being managed, normally supplied by the app's launcher.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct AppIdentityArgs {
    #[arg(long = "app-id", env = "SSBIdentifier", global = true)]
    pub id: Option<String>,
    #[arg(id = "app_version", long = "app-version", env = "SSBVersion", global = true)]
    pub version: Option<String>,
    /// `internal|<bundleid>` or `external|<bundleid>`.
    #[arg(long = "engine", env = "SSBEngineType", global = true)]
    pub engine: Option<String>,
    #[arg(long = "app-name", env = "SSBAppName", global = true)]
    pub name: Option<String>,
    #[arg(long = "bundle", env = "SSBAppPath", global = true)]
    pub bundle: Option<PathBuf>,
    #[arg(long = "build-stamp", env = "SSBBuildStamp", global = true)]
    pub build_stamp: Option<String>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Reconcile app state and start its engine.
    Launch {
        /// Rebuild the engine payload and show the reset notice.
        #[arg(long)]
        reset: bool,
        /// Return once the engine has started instead of waiting for it to exit.
        #[arg(long)]
        detach: bool,
        /// Write update results to update-result.json instead of asking.
        #[arg(long)]
        handoff: bool,
    },
    /// Find runtime installs; exits with the locator outcome code.
    Locate,
    Engine {
        #[command(subcommand)]
        command: EngineCommands,
    },
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Run the remote release check if it is due.
    UpdateCheck {
        #[arg(long)]
        handoff: bool,
    },
    Completions {
        shell: CompletionShell,
    },
    /// Serve the browser extension's native messages over stdin and stdout.
    Host {
        /// Print the app version and exit.
        #[arg(short = 'v', long = "print-version")]
        print_version: bool,
        #[arg(long, env = "CFBundleDisplayName")]
        display_name: Option<String>,
        #[arg(long, env = "CFBundleName")]
        short_name: Option<String>,
        /// Origin of the calling extension, passed by the browser.
        origin: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum EngineCommands {
    Status,
    Validate,
    Activate,
    Deactivate,
    Delete,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ProfileCommands {
    /// Clean the profile after switching from `--from` to the current engine.
    Migrate {
        #[arg(long)]
        from: String,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigCommands {
    Show,
    Write {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings_path = match &cli.settings {
        Some(path) => path.clone(),
        None => default_settings_path(&ssb_store::home_dir()?),
    };
    let settings = Settings::load(&settings_path)?;
    init_tracing(&settings);

    let code = run_cli(cli, settings)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
