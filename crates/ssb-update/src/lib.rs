mod local;
mod remote;
mod schedule;

pub use local::{
    apply_local_update, decide_local_update, updater_path, LocalDecision, UpdateAction,
    UPDATER_EXECUTABLE,
};
pub use remote::{
    parse_releases, GithubReleaseChecker, RemoteCheckError, RemoteChecker, RemoteRelease,
};
pub use schedule::{
    RemoteCheckOutcome, RemoteMode, RemoteResponse, RemoteUpdateCheck, CHECK_INTERVAL_SECS,
    RETRY_INTERVAL_SECS,
};
