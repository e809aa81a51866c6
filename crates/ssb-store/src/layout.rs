use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk locations belonging to one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLayout {
    data_root: PathBuf,
    app_id: String,
}

impl AppLayout {
    pub fn new(data_root: impl Into<PathBuf>, app_id: impl Into<String>) -> Self {
        Self {
            data_root: data_root.into(),
            app_id: app_id.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_root.join(&self.app_id)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir().join("config.sh")
    }

    pub fn engine_dir(&self) -> PathBuf {
        self.data_dir().join("Engine")
    }

    /// Where the payload lives while packed away.
    pub fn payload_path(&self) -> PathBuf {
        self.engine_dir().join("Payload")
    }

    /// Where the app's own `Contents` waits while the payload is active.
    pub fn launcher_path(&self) -> PathBuf {
        self.engine_dir().join("Launcher")
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.data_dir().join("UserData")
    }

    pub fn welcome_dir(&self) -> PathBuf {
        self.data_dir().join("Welcome")
    }

    pub fn welcome_page(&self) -> PathBuf {
        self.welcome_dir().join("welcome.html")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir().join("launch.lock")
    }

    pub fn update_check_path(&self) -> PathBuf {
        self.data_dir().join("update-check.txt")
    }

    pub fn update_result_path(&self) -> PathBuf {
        self.data_dir().join("update-result.json")
    }

    /// Runtime copy kept beside the payload for apps on the internal engine.
    pub fn adjacent_runtime_path(&self) -> PathBuf {
        self.data_dir().join("Runtime.app")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.data_dir(), self.profile_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set; cannot resolve app data root")?;
    Ok(PathBuf::from(home))
}

pub fn default_data_root(home: &Path) -> PathBuf {
    home.join("Library")
        .join("Application Support")
        .join("SSB")
        .join("Apps")
}
