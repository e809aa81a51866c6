//! Terminal-backed dialog presenter and process launcher.

use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use ssb_core::{Dialog, DialogPresenter, DialogResponse, LaunchedProcess, ProcessLauncher};
use ssb_store::process_is_alive;
use tracing::{debug, info};

/// Prompts on `output` and reads the answer from `input`.
///
/// A button is chosen by number or by label. An empty line or end of input
/// cancels the dialog.
pub(crate) struct TerminalPresenter<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl<R: BufRead, W: Write> TerminalPresenter<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }
}

pub(crate) fn stdio_presenter() -> TerminalPresenter<std::io::StdinLock<'static>, std::io::Stderr>
{
    TerminalPresenter::new(std::io::stdin().lock(), std::io::stderr())
}

pub(crate) fn parse_choice(answer: &str, dialog: &Dialog) -> Option<DialogResponse> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Some(DialogResponse::Cancelled);
    }
    if let Ok(number) = answer.parse::<usize>() {
        return (1..=dialog.buttons.len())
            .contains(&number)
            .then(|| DialogResponse::Button(number - 1));
    }
    dialog
        .buttons
        .iter()
        .position(|button| button.eq_ignore_ascii_case(answer))
        .map(DialogResponse::Button)
}

impl<R: BufRead, W: Write> DialogPresenter for TerminalPresenter<R, W> {
    fn present(&self, dialog: &Dialog) -> Result<DialogResponse> {
        let mut output = self.output.borrow_mut();
        let mut input = self.input.borrow_mut();
        writeln!(output, "\n{}\n\n{}\n", dialog.title, dialog.message)
            .context("failed writing dialog")?;
        for (idx, button) in dialog.buttons.iter().enumerate() {
            writeln!(output, "  {}) {button}", idx + 1).context("failed writing dialog")?;
        }

        loop {
            write!(output, "choice (empty to cancel): ").context("failed writing dialog")?;
            output.flush().context("failed writing dialog")?;

            let mut answer = String::new();
            let read = input
                .read_line(&mut answer)
                .context("failed reading dialog answer")?;
            if read == 0 {
                debug!(title = %dialog.title, "input closed, cancelling dialog");
                return Ok(DialogResponse::Cancelled);
            }
            match parse_choice(&answer, dialog) {
                Some(response) => return Ok(response),
                None => writeln!(output, "unrecognized choice: {}", answer.trim())
                    .context("failed writing dialog")?,
            }
        }
    }
}

/// Spawns real processes and keeps their handles so exits are reaped.
#[derive(Default)]
pub(crate) struct SystemLauncher {
    children: RefCell<Vec<Child>>,
}

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> Result<LaunchedProcess> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", program.display()))?;
        let pid = child.id();
        info!(program = %program.display(), pid, "started process");
        self.children.borrow_mut().push(child);
        Ok(LaunchedProcess { pid })
    }

    fn is_running(&self, pid: u32) -> bool {
        let mut children = self.children.borrow_mut();
        match children.iter_mut().find(|child| child.id() == pid) {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => process_is_alive(pid),
        }
    }
}
