use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Compares two dot-separated versions component by component as integers.
///
/// Missing trailing components count as `0`. A component that is not a plain
/// run of ASCII digits also counts as `0`, which makes `2.3.0b9` compare equal
/// to `2.3.0`: pre-release suffixes are not ordered semver-style.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = version_components(left);
    let right = version_components(right);
    let len = left.len().max(right.len());

    for idx in 0..len {
        let l = left.get(idx).copied().unwrap_or(0);
        let r = right.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

fn version_components(version: &str) -> Vec<u64> {
    version.trim().split('.').map(component_value).collect()
}

fn component_value(segment: &str) -> u64 {
    if !segment.is_empty() && segment.bytes().all(|byte| byte.is_ascii_digit()) {
        segment.parse().unwrap_or(0)
    } else {
        0
    }
}

/// Version string of a runtime or app, ordered with [`compare_versions`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeVersion(String);

impl RuntimeVersion {
    pub const SENTINEL: &'static str = "0.0.0";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    /// The version given to a candidate whose descriptor could not be read.
    pub fn sentinel() -> Self {
        Self(Self::SENTINEL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_sentinel(&self) -> bool {
        compare_versions(&self.0, Self::SENTINEL) == Ordering::Equal
    }

    /// A release version carries no pre-release suffix: every component is numeric.
    pub fn is_release(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .split('.')
                .all(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
    }

    pub fn major(&self) -> u64 {
        self.0.split('.').next().map(component_value).unwrap_or(0)
    }

    pub fn cmp_version(&self, other: &RuntimeVersion) -> Ordering {
        compare_versions(&self.0, &other.0)
    }

    pub fn cmp_str(&self, other: &str) -> Ordering {
        compare_versions(&self.0, other)
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuntimeVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
