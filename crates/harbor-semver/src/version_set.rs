//! Sets of semantic versions.

use crate::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A set of versions.
///
/// Ranges are half-open: `[lower, upper)`. The set is closed under
/// [`intersection`](VersionSet::intersection), which is commutative and
/// associative with `Any` as identity and `Empty` as the absorbing element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionSet {
    /// Every version.
    Any,
    /// No version.
    Empty,
    /// Exactly one version.
    Exact(Version),
    /// All versions in `[lower, upper)`.
    Range { lower: Version, upper: Version },
}

impl VersionSet {
    /// The set containing exactly `version`.
    pub fn exact(version: Version) -> Self {
        VersionSet::Exact(version)
    }

    /// The half-open range `[lower, upper)`, normalized to `Empty` when the
    /// bounds do not describe any version.
    pub fn range(lower: Version, upper: Version) -> Self {
        if lower >= upper {
            VersionSet::Empty
        } else {
            VersionSet::Range { lower, upper }
        }
    }

    /// The range `[version, (major+1).0.0)`.
    pub fn upto_next_major(version: Version) -> Self {
        let upper = Version::new(version.major + 1, 0, 0);
        VersionSet::range(version, upper)
    }

    /// The range `[version, major.(minor+1).0)`.
    pub fn upto_next_minor(version: Version) -> Self {
        let upper = Version::new(version.major, version.minor + 1, 0);
        VersionSet::range(version, upper)
    }

    /// Whether `version` is a member of this set.
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            VersionSet::Any => true,
            VersionSet::Empty => false,
            VersionSet::Exact(v) => v == version,
            VersionSet::Range { lower, upper } => lower <= version && version < upper,
        }
    }

    /// The intersection of `self` and `other`.
    pub fn intersection(&self, other: &VersionSet) -> VersionSet {
        match (self, other) {
            (VersionSet::Any, x) | (x, VersionSet::Any) => x.clone(),
            (VersionSet::Empty, _) | (_, VersionSet::Empty) => VersionSet::Empty,
            (VersionSet::Exact(v), s) | (s, VersionSet::Exact(v)) => {
                if s.contains(v) {
                    VersionSet::Exact(v.clone())
                } else {
                    VersionSet::Empty
                }
            }
            (
                VersionSet::Range { lower: l1, upper: u1 },
                VersionSet::Range { lower: l2, upper: u2 },
            ) => {
                let lower = std::cmp::max(l1, l2).clone();
                let upper = std::cmp::min(u1, u2).clone();
                VersionSet::range(lower, upper)
            }
        }
    }

    /// Whether this set contains no version at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, VersionSet::Empty)
    }
}

impl fmt::Display for VersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSet::Any => write!(f, "any"),
            VersionSet::Empty => write!(f, "empty"),
            VersionSet::Exact(v) => write!(f, "{}", v),
            VersionSet::Range { lower, upper } => write!(f, "[{}, {})", lower, upper),
        }
    }
}
