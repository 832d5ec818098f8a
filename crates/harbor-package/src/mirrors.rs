//! Dependency mirror configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A table of URL rewrites.
///
/// Mirrors are applied when a declared dependency URL is resolved to an
/// actual fetch location, and undone when pins are written so that a
/// mirror-configuration change never invalidates a pin file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// original URL -> mirror URL
    mirrors: BTreeMap<String, String>,
}

impl MirrorConfig {
    /// An empty mirror table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mirror` as the fetch location for `original`.
    pub fn set(&mut self, original: impl Into<String>, mirror: impl Into<String>) {
        self.mirrors.insert(original.into(), mirror.into());
    }

    /// Remove the mirror for `original`, if any.
    pub fn unset(&mut self, original: &str) {
        self.mirrors.remove(original);
    }

    /// The URL to actually fetch from: the configured mirror, or `url`
    /// itself when none is set.
    pub fn effective_url(&self, url: &str) -> String {
        self.mirrors.get(url).cloned().unwrap_or_else(|| url.to_string())
    }

    /// The pre-mirror URL for an effective URL, used when writing pins.
    pub fn original_url(&self, url: &str) -> String {
        self.mirrors
            .iter()
            .find(|(_, mirror)| mirror.as_str() == url)
            .map(|(original, _)| original.clone())
            .unwrap_or_else(|| url.to_string())
    }

    /// Whether any mirrors are configured.
    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }
}
