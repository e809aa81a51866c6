//! Interfaces of the collaborators the lifecycle core calls out to.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub title: String,
    pub message: String,
    pub buttons: Vec<String>,
    pub default_button: usize,
}

impl Dialog {
    pub fn new(title: impl Into<String>, message: impl Into<String>, buttons: &[&str]) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            buttons: buttons.iter().map(|button| button.to_string()).collect(),
            default_button: 0,
        }
    }
}

/// The button the user chose, or that they backed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogResponse {
    Button(usize),
    Cancelled,
}

impl DialogResponse {
    pub fn label<'a>(&self, dialog: &'a Dialog) -> Option<&'a str> {
        match self {
            Self::Button(idx) => dialog.buttons.get(*idx).map(String::as_str),
            Self::Cancelled => None,
        }
    }
}

pub trait DialogPresenter {
    fn present(&self, dialog: &Dialog) -> Result<DialogResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchedProcess {
    pub pid: u32,
}

pub trait ProcessLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> Result<LaunchedProcess>;

    fn is_running(&self, pid: u32) -> bool;
}

/// Renders `source` into `destination`, substituting every token.
pub trait TemplateFilter {
    fn filter(
        &self,
        source: &Path,
        destination: &Path,
        tokens: &BTreeMap<String, String>,
    ) -> Result<()>;
}
