use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::current_unix_timestamp;

/// An unparseable lock younger than this may still be being written.
pub const UNREADABLE_LOCK_GRACE: Duration = Duration::from_secs(10);
const UNREADABLE_LOCK_RECHECK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub pid: u32,
    pub started_at_unix: u64,
}

impl LockOwner {
    fn render(&self) -> String {
        format!("pid={}\nstarted_at_unix={}\n", self.pid, self.started_at_unix)
    }

    fn parse(raw: &str) -> Option<Self> {
        let mut pid = None;
        let mut started_at_unix = None;
        for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "pid" => pid = value.parse().ok(),
                "started_at_unix" => started_at_unix = value.parse().ok(),
                _ => {}
            }
        }
        Some(Self {
            pid: pid?,
            started_at_unix: started_at_unix.unwrap_or(0),
        })
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("app is already running (pid {pid}), lock held at {}", path.display())]
    Held { path: PathBuf, pid: u32 },

    #[error("lock file {} is being taken by another launch", path.display())]
    Contended { path: PathBuf },

    #[error("lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive per-app lock, held for the duration of a launch.
///
/// Released on drop. A lock left by a process that is no longer alive is
/// taken over and reported through [`LaunchLock::recovered_stale`].
#[derive(Debug)]
pub struct LaunchLock {
    path: PathBuf,
    owner: LockOwner,
    recovered_stale: bool,
    released: bool,
}

impl LaunchLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        Self::acquire_with_liveness(path, process_is_alive)
    }

    pub fn acquire_with_liveness<IsAlive>(
        path: &Path,
        is_alive: IsAlive,
    ) -> Result<Self, LockError>
    where
        IsAlive: Fn(u32) -> bool,
    {
        let io_err = |source: io::Error| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let owner = LockOwner {
            pid: std::process::id(),
            started_at_unix: current_unix_timestamp().unwrap_or(0),
        };
        let mut recovered_stale = false;

        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut file) => {
                    file.write_all(owner.render().as_bytes())
                        .and_then(|()| file.sync_all())
                        .map_err(io_err)?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                        owner,
                        recovered_stale,
                        released: false,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    let existing = match read_owner(path) {
                        LockContents::Owner(owner) => Some(owner),
                        LockContents::Gone => continue,
                        LockContents::Unreadable { modified }
                            if lock_age(modified) < UNREADABLE_LOCK_GRACE =>
                        {
                            // Another launch may sit between creating and writing it.
                            std::thread::sleep(UNREADABLE_LOCK_RECHECK);
                            match read_owner(path) {
                                LockContents::Owner(owner) => Some(owner),
                                LockContents::Gone => continue,
                                LockContents::Unreadable { .. } => {
                                    return Err(LockError::Contended {
                                        path: path.to_path_buf(),
                                    })
                                }
                            }
                        }
                        LockContents::Unreadable { .. } => None,
                    };
                    if let Some(existing) = &existing {
                        if is_alive(existing.pid) {
                            return Err(LockError::Held {
                                path: path.to_path_buf(),
                                pid: existing.pid,
                            });
                        }
                    }
                    warn!(
                        path = %path.display(),
                        stale_pid = existing.as_ref().map(|owner| owner.pid),
                        stale_since = existing.as_ref().map(|owner| owner.started_at_unix),
                        "removing stale launch lock"
                    );
                    match fs::remove_file(path) {
                        Ok(()) => {}
                        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                        Err(err) => return Err(io_err(err)),
                    }
                    recovered_stale = true;
                }
                Err(err) => return Err(io_err(err)),
            }
        }

        Err(LockError::Contended {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    pub fn recovered_stale(&self) -> bool {
        self.recovered_stale
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "released launch lock");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for LaunchLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

enum LockContents {
    Owner(LockOwner),
    Unreadable { modified: Option<SystemTime> },
    Gone,
}

fn read_owner(path: &Path) -> LockContents {
    match fs::read_to_string(path) {
        Ok(raw) => match LockOwner::parse(&raw) {
            Some(owner) => LockContents::Owner(owner),
            None => LockContents::Unreadable {
                modified: fs::metadata(path).and_then(|meta| meta.modified()).ok(),
            },
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => LockContents::Gone,
        Err(_) => LockContents::Unreadable {
            modified: fs::metadata(path).and_then(|meta| meta.modified()).ok(),
        },
    }
}

/// Unknown mtimes count as fresh.
fn lock_age(modified: Option<SystemTime>) -> Duration {
    modified
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .unwrap_or(Duration::ZERO)
}

/// `kill(pid, 0)`. A process we may not signal still exists.
pub fn process_is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw == 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(err) => {
            debug!(%err, pid, "pid check returned unexpected error");
            true
        }
    }
}
