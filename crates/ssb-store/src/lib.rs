mod config;
mod fs_utils;
mod layout;
mod lock;
mod shell_codec;
mod txn;
mod update_record;
mod wait;

pub use config::{AppConfig, ConfigKey, ConfigScope, ConfigStore, CONFIG_KEYS};
pub use fs_utils::{
    copy_dir_recursive, ensure_within_roots, is_dir_empty, is_executable, path_exists,
    remove_dir_if_empty, remove_file_if_exists, remove_path,
};
pub use layout::{default_data_root, home_dir, AppLayout};
pub use lock::{process_is_alive, LaunchLock, LockError, LockOwner, UNREADABLE_LOCK_GRACE};
pub use shell_codec::{parse_assignments, quote, render_assignment, ConfigValue};
pub use txn::{commit, commit_dir_with, discard, stage_path, write_atomic};
pub use update_record::{
    read_update_check_record, write_update_check_record, UpdateCheckRecord, FATAL_ERROR_PREFIX,
};
pub use wait::{wait_until, WaitPolicy};

pub fn current_unix_timestamp() -> anyhow::Result<u64> {
    use anyhow::Context;
    use std::time::{SystemTime, UNIX_EPOCH};

    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
