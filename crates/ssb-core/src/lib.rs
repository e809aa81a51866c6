mod app;
mod collab;
mod engine;
mod error;
mod status;
mod version;
mod welcome;

pub use app::{AppInstance, LaunchConditions, LaunchHistory};
pub use collab::{
    Dialog, DialogPresenter, DialogResponse, LaunchedProcess, ProcessLauncher, TemplateFilter,
};
pub use engine::{EngineIdentity, EngineKind, EngineType, GOOGLE_BUNDLE_ID_PREFIX};
pub use error::{is_fatal, LifecycleError};
pub use status::RunStatus;
pub use version::{compare_versions, RuntimeVersion};
pub use welcome::{BookmarkStatus, ResetReason, WelcomeExtension, WelcomeNotice};

#[cfg(test)]
mod tests;
