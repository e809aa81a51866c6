//! The remote update check record, `due|downloaded-version|last-error`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::txn::write_atomic;

/// A `last_error` starting with this disables further remote checks.
pub const FATAL_ERROR_PREFIX: &str = "fatal:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCheckRecord {
    pub due_at_unix: u64,
    pub downloaded_version: Option<String>,
    pub last_error: Option<String>,
}

impl UpdateCheckRecord {
    pub fn parse(raw: &str) -> Result<Self> {
        let line = raw.lines().next().unwrap_or_default();
        let mut fields = line.splitn(3, '|');
        let due = fields.next().unwrap_or_default().trim();
        let due_at_unix = due
            .parse::<u64>()
            .with_context(|| format!("invalid update check due date: {due:?}"))?;
        let optional = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            due_at_unix,
            downloaded_version: optional(fields.next()),
            last_error: optional(fields.next()),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "{}|{}|{}\n",
            self.due_at_unix,
            sanitize(self.downloaded_version.as_deref().unwrap_or_default()),
            sanitize(self.last_error.as_deref().unwrap_or_default()),
        )
    }

    pub fn is_due(&self, now_unix: u64) -> bool {
        now_unix >= self.due_at_unix
    }

    /// The stored error text when it disables checking.
    pub fn fatal_error(&self) -> Option<&str> {
        self.last_error
            .as_deref()
            .and_then(|error| error.strip_prefix(FATAL_ERROR_PREFIX))
            .map(str::trim)
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '|' => '/',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

/// Missing or unreadable records are `None`, which forces a fresh check.
pub fn read_update_check_record(path: &Path) -> Option<UpdateCheckRecord> {
    let raw = fs::read_to_string(path).ok()?;
    match UpdateCheckRecord::parse(&raw) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(path = %path.display(), "ignoring unreadable update check record: {err:#}");
            None
        }
    }
}

pub fn write_update_check_record(path: &Path, record: &UpdateCheckRecord) -> Result<()> {
    write_atomic(path, record.render().as_bytes())
        .with_context(|| format!("failed to save update check record {}", path.display()))
}
