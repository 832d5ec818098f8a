//! The package-container interface the resolver works against.

use crate::ResolveError;
use harbor_package::{Constraint, PackageIdentity, PackageRef};
use harbor_semver::Version;
use std::sync::Arc;

/// A package source as seen by the resolver.
///
/// A container knows the versions a package is available at and the
/// dependency constraints each version declares. Version lists are newest
/// first; `dependencies` must be deterministic for a given version and is
/// expected to cache, since the resolver consults it repeatedly while
/// validating assignments.
pub trait Container: Send + Sync {
    /// The identity this container serves.
    fn identity(&self) -> &PackageIdentity;

    /// The reference this container was created from.
    fn package_ref(&self) -> &PackageRef;

    /// Known versions, newest first, filtered to those usable with the
    /// current tools version.
    fn versions(&self) -> Result<Vec<Version>, ResolveError>;

    /// The dependency constraints declared at `version`.
    fn dependencies(&self, version: &Version) -> Result<Vec<Constraint>, ResolveError>;

    /// The source-control revision backing `version`, when the container
    /// knows one.
    fn revision_for(&self, version: &Version) -> Result<Option<String>, ResolveError>;
}

/// Asynchronous lookup from package reference to container.
///
/// `get_container` blocks until the container is available; `prefetch` may
/// start background fetches so later lookups find their work already done.
/// Prefetching is pure latency hiding and never affects correctness.
pub trait ContainerProvider: Send + Sync {
    fn get_container(&self, package: &PackageRef) -> Result<Arc<dyn Container>, ResolveError>;

    fn prefetch(&self, _packages: &[PackageRef]) {}
}
