//! Manifest tools versions.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The minimum manifest-format version a manifest requires.
///
/// Package versions whose manifest demands a newer tools version than the
/// running one are filtered out of container version lists; root packages
/// doing so are rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolsVersion {
    /// The tools version this build of Harbor implements.
    pub const CURRENT: ToolsVersion = ToolsVersion::new(1, 2, 0);

    /// The oldest tools version ever shipped, assumed when a manifest does
    /// not declare one.
    pub const MINIMUM: ToolsVersion = ToolsVersion::new(1, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for ToolsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error raised while parsing a tools-version string.
#[derive(Debug, Clone, Error)]
#[error("invalid tools version: '{0}'")]
pub struct ToolsVersionParseError(pub String);

impl FromStr for ToolsVersion {
    type Err = ToolsVersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(ToolsVersionParseError(s.to_string()));
        }
        let parse = |p: Option<&&str>| -> Result<u32, ToolsVersionParseError> {
            match p {
                None => Ok(0),
                Some(p) => p.parse().map_err(|_| ToolsVersionParseError(s.to_string())),
            }
        };
        Ok(Self {
            major: parse(parts.first())?,
            minor: parse(parts.get(1))?,
            patch: parse(parts.get(2))?,
        })
    }
}

impl Serialize for ToolsVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ToolsVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
