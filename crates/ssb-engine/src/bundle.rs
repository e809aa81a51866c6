use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use ssb_core::EngineIdentity;

/// The `Info.plist` keys the lifecycle cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BundleInfo {
    #[serde(rename = "CFBundleIdentifier", default)]
    pub identifier: String,
    #[serde(rename = "CFBundleExecutable", default)]
    pub executable: String,
    #[serde(rename = "CFBundleShortVersionString", default)]
    pub short_version: String,
    #[serde(rename = "CFBundleName", default)]
    pub name: String,
    #[serde(rename = "CFBundleIconFile", default)]
    pub icon_file: Option<String>,
}

impl BundleInfo {
    pub fn identity(&self) -> EngineIdentity {
        EngineIdentity {
            bundle_id: self.identifier.clone(),
            executable: self.executable.clone(),
            version: self.short_version.clone(),
            display_name: self.name.clone(),
            icon_files: self.icon_file.iter().cloned().collect(),
        }
    }
}

/// `<contents>/Info.plist` for a `Contents`-shaped directory.
pub fn info_plist_path(contents: &Path) -> PathBuf {
    contents.join("Info.plist")
}

/// Reads an XML or binary `Info.plist`.
pub fn read_bundle_info(plist: &Path) -> Result<BundleInfo> {
    plist::from_file(plist)
        .with_context(|| format!("failed to parse bundle info from {}", plist.display()))
}

#[derive(Debug, Default, Deserialize)]
struct LaunchServicesPrefs {
    #[serde(rename = "LSHandlers", default)]
    handlers: Vec<LaunchServicesHandler>,
}

#[derive(Debug, Deserialize)]
struct LaunchServicesHandler {
    #[serde(rename = "LSHandlerURLScheme")]
    scheme: Option<String>,
    #[serde(rename = "LSHandlerRoleAll")]
    role_all: Option<String>,
}

/// `~/Library/Preferences/com.apple.LaunchServices/com.apple.launchservices.secure.plist`
pub fn launch_services_path(home: &Path) -> PathBuf {
    home.join("Library")
        .join("Preferences")
        .join("com.apple.LaunchServices")
        .join("com.apple.launchservices.secure.plist")
}

/// The bundle id registered for URLs of `scheme`, if any.
pub fn read_url_handler(prefs: &Path, scheme: &str) -> Result<Option<String>> {
    let prefs: LaunchServicesPrefs = plist::from_file(prefs)
        .with_context(|| format!("failed to parse {}", prefs.display()))?;
    Ok(prefs
        .handlers
        .into_iter()
        .find(|handler| handler.scheme.as_deref() == Some(scheme))
        .and_then(|handler| handler.role_all))
}
