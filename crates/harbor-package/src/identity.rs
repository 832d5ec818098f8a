//! Canonical package identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The canonical key a package is known by.
///
/// Two references to the same hosted package must compare equal no matter
/// how the URL was spelled: scheme, user-info, a trailing `.git` suffix,
/// trailing slashes and letter case are all erased. Both
/// `https://github.com/Foo/Bar.git` and `git@github.com:foo/bar` canonicalize
/// to `github.com/foo/bar`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    /// Derive the identity from a URL or filesystem path.
    pub fn from_location(location: &str) -> Self {
        Self(canonicalize(location))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last path component, used as a fallback package name.
    pub fn basename(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// A form safe to use as a single filesystem component: anything outside
    /// `[a-z0-9._-]` becomes `-`.
    pub fn fs_safe(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }

    /// A directory name for on-disk caches keyed by this identity.
    ///
    /// Sanitizing an identity for the filesystem loses information (both
    /// `host/a-b` and `host/a/b` become `host-a-b`), so the fs-safe form is
    /// suffixed with a truncated BLAKE3 digest of the canonical string to
    /// keep distinct identities in distinct directories.
    pub fn cache_dir_name(&self) -> String {
        let digest = blake3::hash(self.0.as_bytes());
        let mut suffix = String::with_capacity(16);
        for byte in &digest.as_bytes()[..8] {
            suffix.push_str(&format!("{:02x}", byte));
        }
        format!("{}-{}", self.fs_safe(), suffix)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a package location to its canonical form.
fn canonicalize(location: &str) -> String {
    let mut s = location.trim();

    // Strip the scheme, if any.
    if let Some(idx) = s.find("://") {
        s = &s[idx + 3..];
    }

    // An scp-style address (`git@host:path`) uses `:` as the host/path
    // separator; rewrite it to `/` after dropping the user-info.
    let mut owned;
    if let Some(at) = s.find('@') {
        s = &s[at + 1..];
        if let Some(colon) = s.find(':')
            && !s[colon + 1..].starts_with("//")
        {
            owned = String::with_capacity(s.len());
            owned.push_str(&s[..colon]);
            owned.push('/');
            owned.push_str(&s[colon + 1..]);
            s = &owned;
        }
    }

    let mut result = s.trim_end_matches('/').to_string();
    if let Some(stripped) = result.strip_suffix(".git") {
        result = stripped.to_string();
    }
    result = result.trim_end_matches('/').to_string();
    result.make_ascii_lowercase();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_spellings_collapse() {
        let expected = PackageIdentity::from_location("github.com/foo/bar");
        for spelling in [
            "https://github.com/foo/bar",
            "https://github.com/foo/bar.git",
            "https://github.com/Foo/Bar.git",
            "http://github.com/foo/bar/",
            "git@github.com:foo/bar.git",
            "ssh://git@github.com/foo/bar",
            "git@github.com:Foo/Bar",
        ] {
            assert_eq!(PackageIdentity::from_location(spelling), expected, "{}", spelling);
        }
    }

    #[test]
    fn test_distinct_paths_stay_distinct() {
        assert_ne!(
            PackageIdentity::from_location("https://github.com/foo/bar"),
            PackageIdentity::from_location("https://github.com/foo/baz")
        );
        assert_ne!(
            PackageIdentity::from_location("https://github.com/foo/bar"),
            PackageIdentity::from_location("https://gitlab.com/foo/bar")
        );
    }

    #[test]
    fn test_local_path() {
        let identity = PackageIdentity::from_location("/home/dev/Projects/Widget/");
        assert_eq!(identity.as_str(), "/home/dev/projects/widget");
        assert_eq!(identity.basename(), "widget");
    }

    #[test]
    fn test_fs_safe() {
        let identity = PackageIdentity::from_location("https://github.com/foo/bar");
        assert_eq!(identity.fs_safe(), "github.com-foo-bar");
    }

    #[test]
    fn test_cache_dir_name_disambiguates_fs_collisions() {
        // Both identities sanitize to the same fs-safe string; the digest
        // suffix must keep their cache directories apart.
        let a = PackageIdentity::from_location("https://host/a-b");
        let b = PackageIdentity::from_location("https://host/a/b");
        assert_eq!(a.fs_safe(), b.fs_safe());
        assert_ne!(a.cache_dir_name(), b.cache_dir_name());

        // Stable across calls.
        assert_eq!(a.cache_dir_name(), a.cache_dir_name());
        assert!(a.cache_dir_name().starts_with("host-a-b-"));
    }

    #[test]
    fn test_basename() {
        let identity = PackageIdentity::from_location("https://github.com/foo/bar.git");
        assert_eq!(identity.basename(), "bar");
    }
}
