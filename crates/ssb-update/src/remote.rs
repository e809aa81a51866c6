use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use ssb_core::compare_versions;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRelease {
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteCheckError {
    /// Worth retrying later.
    #[error("{0}")]
    Transient(String),
    /// The feed itself is gone; checking again will not help.
    #[error("{0}")]
    Fatal(String),
}

pub trait RemoteChecker {
    fn latest_release(&self) -> Result<Option<RemoteRelease>, RemoteCheckError>;
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    body: Option<String>,
}

/// The newest published, non-prerelease entry of a GitHub-style releases list.
pub fn parse_releases(body: &str) -> Result<Option<RemoteRelease>> {
    let releases: Vec<GithubRelease> =
        serde_json::from_str(body).context("release feed is not a releases list")?;
    let newest = releases
        .into_iter()
        .filter(|release| !release.prerelease && !release.draft)
        .map(|release| RemoteRelease {
            version: release
                .tag_name
                .trim()
                .trim_start_matches(['v', 'V'])
                .to_string(),
            url: release.html_url,
            notes: release.body.unwrap_or_default(),
        })
        .filter(|release| !release.version.is_empty())
        .reduce(|best, release| {
            if compare_versions(&release.version, &best.version).is_gt() {
                release
            } else {
                best
            }
        });
    Ok(newest)
}

pub struct GithubReleaseChecker {
    url: String,
    client: Client,
}

impl GithubReleaseChecker {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("ssb/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl RemoteChecker for GithubReleaseChecker {
    fn latest_release(&self) -> Result<Option<RemoteRelease>, RemoteCheckError> {
        debug!(url = %self.url, "checking release feed");
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|err| RemoteCheckError::Transient(format!("update check failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteCheckError::Fatal(format!(
                "release feed {} no longer exists",
                self.url
            )));
        }
        if !status.is_success() {
            return Err(RemoteCheckError::Transient(format!(
                "update check failed: HTTP {status}"
            )));
        }
        let body = response
            .text()
            .map_err(|err| RemoteCheckError::Transient(format!("update check failed: {err}")))?;
        parse_releases(&body).map_err(|err| RemoteCheckError::Transient(format!("{err:#}")))
    }
}
