//! Per-package version demands.

use crate::PackageRef;
use harbor_semver::VersionSet;
use std::fmt;

/// A demand placed on a single package identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// The package must be bound to a version in the set.
    VersionSet(VersionSet),
    /// The package is used in place (local or edited); version bounds on it
    /// are ignored, but its currently-declared dependencies still apply.
    Unversioned(Vec<Constraint>),
}

impl Requirement {
    /// The requirement that admits every version.
    pub fn any() -> Self {
        Requirement::VersionSet(VersionSet::Any)
    }

    /// Whether this requirement admits every version.
    pub fn is_any(&self) -> bool {
        matches!(self, Requirement::VersionSet(VersionSet::Any))
    }

    /// Combine two requirements on the same identity.
    ///
    /// Version sets intersect, an empty intersection is unsatisfiable. An
    /// unversioned requirement dominates any version set. Two unversioned
    /// requirements merge only when their constraint lists are structurally
    /// equal, in which case the left side wins.
    pub fn merging(&self, other: &Requirement) -> Option<Requirement> {
        match (self, other) {
            (Requirement::VersionSet(a), Requirement::VersionSet(b)) => {
                let intersection = a.intersection(b);
                if intersection.is_empty() {
                    None
                } else {
                    Some(Requirement::VersionSet(intersection))
                }
            }
            (Requirement::Unversioned(lhs), Requirement::Unversioned(rhs)) => {
                if lhs == rhs {
                    Some(self.clone())
                } else {
                    None
                }
            }
            (Requirement::Unversioned(_), Requirement::VersionSet(_)) => Some(self.clone()),
            (Requirement::VersionSet(_), Requirement::Unversioned(_)) => Some(other.clone()),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::VersionSet(set) => write!(f, "{}", set),
            Requirement::Unversioned(_) => write!(f, "unversioned"),
        }
    }
}

/// A demand on one package: who is demanded, and what of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub package: PackageRef,
    pub requirement: Requirement,
}

impl Constraint {
    pub fn new(package: PackageRef, requirement: Requirement) -> Self {
        Self { package, requirement }
    }

    /// A versioned constraint.
    pub fn versioned(package: PackageRef, versions: VersionSet) -> Self {
        Self::new(package, Requirement::VersionSet(versions))
    }

    /// An unversioned constraint carrying the package's currently-declared
    /// dependencies.
    pub fn unversioned(package: PackageRef, dependencies: Vec<Constraint>) -> Self {
        Self::new(package, Requirement::Unversioned(dependencies))
    }
}
