//! Addressable package references.

use crate::{MirrorConfig, PackageIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// What kind of source a package reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    /// A package rooted at a local directory.
    LocalPath,
    /// A package hosted in a remote source-control repository.
    Remote,
    /// A package served by a registry.
    Registry,
}

/// An addressable package.
///
/// The identity is a deterministic function of kind and location, computed
/// after applying the active mirror configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub identity: PackageIdentity,
    pub kind: RefKind,
    /// The effective (post-mirror) location.
    pub location: String,
    pub name: Option<String>,
}

impl PackageRef {
    /// A reference to a remotely hosted package. The mirror table is applied
    /// to `url` before the identity is derived.
    pub fn remote(url: &str, mirrors: &MirrorConfig) -> Self {
        let location = mirrors.effective_url(url);
        Self {
            identity: PackageIdentity::from_location(&location),
            kind: RefKind::Remote,
            location,
            name: None,
        }
    }

    /// A reference to a package rooted at a local directory.
    pub fn local(path: &Path) -> Self {
        let location = path.to_string_lossy().into_owned();
        Self {
            identity: PackageIdentity::from_location(&location),
            kind: RefKind::LocalPath,
            location,
            name: None,
        }
    }

    /// Attach the package name declared in the manifest.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The name to show users: the manifest name when known, otherwise the
    /// identity's last path component.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.identity.basename())
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_identity_uses_mirror() {
        let mut mirrors = MirrorConfig::new();
        mirrors.set("https://host/foo.git", "https://mirror/foo.git");

        let reference = PackageRef::remote("https://host/foo.git", &mirrors);
        assert_eq!(reference.location, "https://mirror/foo.git");
        assert_eq!(reference.identity.as_str(), "mirror/foo");

        let unmirrored = PackageRef::remote("https://host/bar.git", &mirrors);
        assert_eq!(unmirrored.identity.as_str(), "host/bar");
    }

    #[test]
    fn test_display_name() {
        let reference = PackageRef::remote("https://github.com/acme/widget.git", &MirrorConfig::new());
        assert_eq!(reference.display_name(), "widget");
        assert_eq!(reference.clone().with_name("Widget").display_name(), "Widget");
    }

    #[test]
    fn test_local() {
        let reference = PackageRef::local(Path::new("/tmp/pkg"));
        assert_eq!(reference.kind, RefKind::LocalPath);
        assert_eq!(reference.identity.as_str(), "/tmp/pkg");
    }
}
