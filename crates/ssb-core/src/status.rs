use std::panic::Location;

use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use crate::error::{is_fatal, LifecycleError};

/// Outcome of a multi-step run.
///
/// `run` only executes while nothing has failed yet, `always` executes
/// regardless (cleanup) and adds its own failure next to earlier ones.
#[derive(Debug, Default)]
pub struct RunStatus {
    failures: Vec<Failure>,
}

#[derive(Debug)]
struct Failure {
    context: String,
    message: String,
    fatal: bool,
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.failures.iter().any(|failure| failure.fatal)
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    #[track_caller]
    pub fn run<T, F>(&mut self, context: &str, op: F) -> Option<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if !self.is_ok() {
            debug!(context = %context, "skipped after earlier failure");
            return None;
        }
        self.capture(context, Location::caller(), op)
    }

    #[track_caller]
    pub fn always<T, F>(&mut self, context: &str, op: F) -> Option<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.capture(context, Location::caller(), op)
    }

    #[track_caller]
    pub fn record(&mut self, context: &str, err: &anyhow::Error) {
        self.push(context, Location::caller(), err);
    }

    /// Every failure so far, in order, as one user-facing message.
    pub fn message(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|failure| failure.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn contexts(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|failure| failure.context.as_str())
            .collect()
    }

    pub fn into_result(self) -> Result<()> {
        let fatal = self.has_fatal();
        match self.message() {
            None => Ok(()),
            Some(message) if fatal => Err(LifecycleError::fatal(message).into()),
            Some(message) => Err(anyhow!(message)),
        }
    }

    fn capture<T, F>(&mut self, context: &str, location: &'static Location<'static>, op: F) -> Option<T>
    where
        F: FnOnce() -> Result<T>,
    {
        match op() {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(context, location, &err);
                None
            }
        }
    }

    fn push(&mut self, context: &str, location: &'static Location<'static>, err: &anyhow::Error) {
        let message = format!("{err:#}");
        let fatal = is_fatal(err);
        warn!(
            context = %context,
            location = %location,
            fatal,
            "{message}"
        );
        self.failures.push(Failure {
            context: context.to_string(),
            message,
            fatal,
        });
    }
}
