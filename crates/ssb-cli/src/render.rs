use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use ssb_core::EngineIdentity;
use ssb_engine::{MigrationReport, PayloadState};
use ssb_runtime::{Located, LocatorOutcome, RuntimeInstance};
use ssb_update::RemoteCheckOutcome;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(std::io::stdout().is_terminal())
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn badge_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::Green,
        "warn" => AnsiColor::Yellow,
        "err" => AnsiColor::Red,
        _ => AnsiColor::BrightBlue,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

pub(crate) fn print_status(style: OutputStyle, status: &str, message: &str) {
    match style {
        OutputStyle::Plain => println!("{message}"),
        OutputStyle::Rich => println!(
            "{} {message}",
            colorize(badge_style(status), status_badge(status))
        ),
    }
}

pub(crate) fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn describe_instance(instance: Option<&RuntimeInstance>) -> String {
    match instance {
        Some(instance) => format!("{} ({})", instance.version, instance.path.display()),
        None => "none".to_string(),
    }
}

pub(crate) fn format_located_lines(located: &Located, style: OutputStyle) -> Vec<String> {
    let outcome = located.outcome();
    let mut lines = vec![
        format!("current: {}", describe_instance(located.current.as_ref())),
        format!("latest: {}", describe_instance(located.latest.as_ref())),
        format!("update: {}", describe_instance(located.update.as_ref())),
    ];
    if !located.pruned_ignores.is_empty() {
        lines.push(format!(
            "pruned ignored versions: {}",
            located.pruned_ignores.join(", ")
        ));
    }
    let status = if located.cannot_create_payload {
        "warn"
    } else {
        "ok"
    };
    lines.push(render_status_line(
        style,
        status,
        &format!("outcome {}: {}", outcome.code(), outcome.describe()),
    ));
    lines
}

pub(crate) fn format_engine_status_lines(
    state: PayloadState,
    identity: Option<&EngineIdentity>,
    style: OutputStyle,
) -> Vec<String> {
    let status = match state {
        PayloadState::Corrupt => "err",
        PayloadState::NoPayload => "warn",
        PayloadState::Inactive | PayloadState::Active => "ok",
    };
    let mut lines = vec![render_status_line(
        style,
        status,
        &format!("payload: {}", state.as_str()),
    )];
    if let Some(identity) = identity {
        lines.push(format!(
            "engine: {} {} ({})",
            identity.display_name, identity.version, identity.bundle_id
        ));
        lines.push(format!("executable: {}", identity.executable));
    }
    lines
}

pub(crate) fn format_migration_lines(report: &MigrationReport, style: OutputStyle) -> Vec<String> {
    let mut lines = vec![render_status_line(
        style,
        if report.problems.is_some() { "warn" } else { "ok" },
        &format!(
            "profile migrated ({:?}), {} item(s) removed",
            report.policy,
            report.removed.len()
        ),
    )];
    for extension in &report.extensions {
        lines.push(format!("extension: {} ({})", extension.name, extension.icon));
    }
    if report.extensions_lost {
        lines.push("extensions could not be listed; reinstall them by hand".to_string());
    }
    if let Some(problems) = &report.problems {
        lines.push(format!("problems: {problems}"));
    }
    lines
}

/// One line summarizing the runtime search behind a launch.
pub(crate) fn format_launch_outcome(outcome: LocatorOutcome, style: OutputStyle) -> String {
    let status = match outcome {
        LocatorOutcome::NothingFound | LocatorOutcome::LatestOnly => "warn",
        _ => "info",
    };
    render_status_line(
        style,
        status,
        &format!(
            "runtime search: {} (outcome {})",
            outcome.describe(),
            outcome.code()
        ),
    )
}

pub(crate) fn format_remote_outcome(outcome: &RemoteCheckOutcome, style: OutputStyle) -> String {
    match outcome {
        RemoteCheckOutcome::Disabled { reason } => render_status_line(
            style,
            "warn",
            &format!("remote checks disabled: {reason}"),
        ),
        RemoteCheckOutcome::NotDue { due_at_unix } => render_status_line(
            style,
            "info",
            &format!("next remote check due at {due_at_unix}"),
        ),
        RemoteCheckOutcome::UpToDate => render_status_line(style, "ok", "up to date"),
        RemoteCheckOutcome::Found { release, response } => {
            let action = match response {
                Some(response) => format!(" ({response:?})"),
                None => String::new(),
            };
            render_status_line(
                style,
                "ok",
                &format!("version {} is available{action}: {}", release.version, release.url),
            )
        }
        RemoteCheckOutcome::Failed { message, .. } => {
            render_status_line(style, "err", &format!("remote check failed: {message}"))
        }
    }
}
