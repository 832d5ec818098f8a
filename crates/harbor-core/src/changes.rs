//! Diffing resolver output against the managed-dependency table.

use crate::{DependencyState, ManagedDependency, WorkspaceError};
use harbor_fetch::Revision;
use harbor_package::{PackageIdentity, PackageRef, RefKind};
use harbor_resolver::{BoundVersion, ResolvedPackage};
use harbor_semver::Version;
use std::collections::BTreeMap;

/// How one package's on-disk state must change to match a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageStateChange {
    /// Not present yet; clone and check out.
    Added {
        version: Option<Version>,
        revision: Revision,
    },
    /// Present at a different version or revision; move the checkout.
    Updated {
        old: DependencyState,
        version: Option<Version>,
        revision: Revision,
    },
    /// Already where the resolution wants it.
    Unchanged,
    /// Managed but no longer part of the resolution; remove the checkout.
    Removed,
}

/// A state change attributed to its package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    pub package: PackageRef,
    pub change: PackageStateChange,
}

/// Walk the resolver output and classify every package against the current
/// managed-dependency table. Managed dependencies missing from the output
/// are classified `Removed`, except edit-mode dependencies, which are never
/// removed automatically.
pub fn compute_package_state_changes(
    managed: &BTreeMap<PackageIdentity, ManagedDependency>,
    resolved: &[ResolvedPackage],
) -> Result<Vec<PackageChange>, WorkspaceError> {
    let mut changes: BTreeMap<PackageIdentity, PackageChange> = BTreeMap::new();

    for package in resolved {
        let identity = &package.package.identity;
        let change = match &package.binding {
            BoundVersion::Excluded => {
                return Err(WorkspaceError::Internal(format!(
                    "resolver bound '{}' to excluded",
                    identity
                )));
            }
            BoundVersion::Unversioned => match managed.get(identity) {
                Some(dependency) if dependency.is_edited() => PackageStateChange::Unchanged,
                // Local root-level packages are used in place.
                _ if package.package.kind == RefKind::LocalPath => PackageStateChange::Unchanged,
                _ => {
                    return Err(WorkspaceError::Internal(format!(
                        "'{}' resolved unversioned but is not in edit mode",
                        identity
                    )));
                }
            },
            BoundVersion::Version(version) => {
                let revision = Revision::new(package.revision.clone().ok_or_else(|| {
                    WorkspaceError::Internal(format!(
                        "no revision for '{}' at {}",
                        identity, version
                    ))
                })?);
                match managed.get(identity) {
                    None => PackageStateChange::Added {
                        version: Some(version.clone()),
                        revision,
                    },
                    Some(dependency) if dependency.is_edited() => PackageStateChange::Unchanged,
                    Some(dependency) => {
                        let same_version = dependency.current_version() == Some(version);
                        let same_revision = dependency.current_revision() == Some(&revision);
                        if same_version || same_revision {
                            PackageStateChange::Unchanged
                        } else {
                            PackageStateChange::Updated {
                                old: dependency.state.clone(),
                                version: Some(version.clone()),
                                revision,
                            }
                        }
                    }
                }
            }
        };
        changes.insert(
            identity.clone(),
            PackageChange {
                package: package.package.clone(),
                change,
            },
        );
    }

    for (identity, dependency) in managed {
        if changes.contains_key(identity) || dependency.is_edited() {
            continue;
        }
        changes.insert(
            identity.clone(),
            PackageChange {
                package: dependency.package.clone(),
                change: PackageStateChange::Removed,
            },
        );
    }

    Ok(changes.into_values().collect())
}
