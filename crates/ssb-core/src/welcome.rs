use std::path::Path;

use anyhow::{anyhow, Result};
use url::form_urlencoded;
use url::Url;

use crate::app::{AppInstance, LaunchConditions};
use crate::engine::EngineType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    EngineFamilyChange,
    CorruptPayload,
    EngineSourceMissing,
    UserRequested,
}

impl ResetReason {
    pub fn code(&self) -> u8 {
        match self {
            Self::EngineFamilyChange => 0,
            Self::CorruptPayload => 1,
            Self::EngineSourceMissing => 2,
            Self::UserRequested => 3,
        }
    }
}

/// Result of maintaining the welcome bookmark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BookmarkStatus {
    #[default]
    Untouched,
    Created,
    Added,
    AlreadyPresent,
    Unreadable,
    WriteFailed,
}

impl BookmarkStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Untouched => 0,
            Self::Created => 1,
            Self::Added => 2,
            Self::AlreadyPresent => 3,
            Self::Unreadable => 4,
            Self::WriteFailed => 5,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Unreadable | Self::WriteFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeExtension {
    pub icon: String,
    pub name: String,
}

/// One-shot description of what changed, rendered into the welcome page query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeNotice {
    pub version: String,
    pub engine: EngineType,
    pub old_version: Option<String>,
    pub edited: bool,
    pub old_engine: Option<EngineType>,
    pub reset: Option<ResetReason>,
    pub extensions: Vec<WelcomeExtension>,
    pub bookmarks: BookmarkStatus,
    pub extensions_lost: bool,
    pub abnormal_exit: bool,
}

impl WelcomeNotice {
    pub fn new(app: &AppInstance, conditions: &LaunchConditions) -> Self {
        Self {
            version: app.version.as_str().to_string(),
            engine: app.engine.clone(),
            old_version: conditions.updated_from.clone(),
            edited: conditions.edited,
            old_engine: conditions.engine_changed_from.clone(),
            reset: None,
            extensions: Vec::new(),
            bookmarks: BookmarkStatus::Untouched,
            extensions_lost: false,
            abnormal_exit: false,
        }
    }

    pub fn query_string(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("v", &self.version);
        query.append_pair("e", &self.engine.to_string());
        if let Some(old_version) = &self.old_version {
            query.append_pair("ov", old_version);
        }
        if self.edited {
            query.append_pair("ed", "1");
        }
        if let Some(old_engine) = &self.old_engine {
            query.append_pair("oe", &old_engine.to_string());
        }
        if let Some(reset) = self.reset {
            query.append_pair("r", "1");
            query.append_pair("rt", &reset.code().to_string());
        }
        if !self.extensions.is_empty() {
            query.append_pair("xi", "1");
            for extension in &self.extensions {
                query.append_pair("x", &format!("{},{}", extension.icon, extension.name));
            }
        }
        if self.bookmarks != BookmarkStatus::Untouched {
            query.append_pair("b", &self.bookmarks.code().to_string());
        }
        if self.extensions_lost {
            query.append_pair("m", "1");
        }
        if self.abnormal_exit {
            query.append_pair("fa", "1");
        }
        query.finish()
    }

    pub fn to_url(&self, welcome_page: &Path) -> Result<Url> {
        let mut url = Url::from_file_path(welcome_page).map_err(|()| {
            anyhow!(
                "welcome page path must be absolute: {}",
                welcome_page.display()
            )
        })?;
        url.set_query(Some(&self.query_string()));
        Ok(url)
    }
}
