use std::path::PathBuf;

use thiserror::Error;

/// Failures that must stop an app launch or build.
///
/// Everything else is recoverable and accumulates in [`crate::RunStatus`].
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{message}")]
    Fatal { message: String },

    #[error("refusing to modify {}: {reason}", path.display())]
    UnsafePath { path: PathBuf, reason: String },

    #[error("engine payload is corrupt: {reason}")]
    PayloadCorrupt { reason: String },

    #[error("engine payload is already active in {}", contents.display())]
    AlreadyActivated { contents: PathBuf },

    #[error("app bundle was left without a Contents directory: {}", contents.display())]
    NoContents { contents: PathBuf },

    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },
}

impl LifecycleError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn unsafe_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsafePath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Timeouts are reported but left to the caller to escalate.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Timeout { .. })
    }
}

/// True when any error in the chain is a fatal [`LifecycleError`].
pub fn is_fatal(err: &anyhow::Error) -> bool {
    // Context values are only reachable through `downcast_ref`, causes through `chain`.
    if err
        .downcast_ref::<LifecycleError>()
        .is_some_and(LifecycleError::is_fatal)
    {
        return true;
    }
    err.chain().any(|cause| {
        cause
            .downcast_ref::<LifecycleError>()
            .is_some_and(LifecycleError::is_fatal)
    })
}
