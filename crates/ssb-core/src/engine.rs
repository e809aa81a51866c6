use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// Bundle ids starting with this prefix (case-insensitive) belong to the
/// Google-flavored engine family.
pub const GOOGLE_BUNDLE_ID_PREFIX: &str = "com.google.chrome";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Internal,
    External,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "internal" => Ok(Self::Internal),
            "external" => Ok(Self::External),
            _ => Err(anyhow!("invalid engine kind: {value}")),
        }
    }
}

/// Declared engine of an app, written as `internal|<bundleid>` or `external|<bundleid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineType {
    pub kind: EngineKind,
    pub bundle_id: String,
}

impl EngineType {
    pub fn internal(bundle_id: impl Into<String>) -> Self {
        Self {
            kind: EngineKind::Internal,
            bundle_id: bundle_id.into(),
        }
    }

    pub fn external(bundle_id: impl Into<String>) -> Self {
        Self {
            kind: EngineKind::External,
            bundle_id: bundle_id.into(),
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let (kind, bundle_id) = value
            .trim()
            .split_once('|')
            .ok_or_else(|| anyhow!("engine type must be '<kind>|<bundleid>': {value}"))?;
        let bundle_id = bundle_id.trim();
        if bundle_id.is_empty() {
            return Err(anyhow!("engine type has an empty bundle id: {value}"));
        }
        Ok(Self {
            kind: EngineKind::parse(kind.trim())?,
            bundle_id: bundle_id.to_string(),
        })
    }

    pub fn is_internal(&self) -> bool {
        self.kind == EngineKind::Internal
    }

    pub fn is_google_family(&self) -> bool {
        self.bundle_id
            .to_ascii_lowercase()
            .starts_with(GOOGLE_BUNDLE_ID_PREFIX)
    }

    /// Two engines can share a profile unless exactly one of them is Google-flavored.
    pub fn is_compatible_with(&self, other: &EngineType) -> bool {
        self.is_google_family() == other.is_google_family()
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.kind.as_str(), self.bundle_id)
    }
}

impl FromStr for EngineType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

/// What a payload was built from, captured at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineIdentity {
    pub bundle_id: String,
    pub executable: String,
    pub version: String,
    pub display_name: String,
    pub icon_files: Vec<String>,
}

impl EngineIdentity {
    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.bundle_id.clone(),
            self.executable.clone(),
            self.version.clone(),
            self.display_name.clone(),
        ];
        fields.extend(self.icon_files.iter().cloned());
        fields
    }

    pub fn from_fields(fields: &[String]) -> Result<Self> {
        let [bundle_id, executable, version, display_name, icons @ ..] = fields else {
            return Err(anyhow!(
                "engine source info needs at least 4 fields, found {}",
                fields.len()
            ));
        };
        if bundle_id.is_empty() || executable.is_empty() {
            return Err(anyhow!(
                "engine source info is missing a bundle id or executable"
            ));
        }
        Ok(Self {
            bundle_id: bundle_id.clone(),
            executable: executable.clone(),
            version: version.clone(),
            display_name: display_name.clone(),
            icon_files: icons.to_vec(),
        })
    }
}
