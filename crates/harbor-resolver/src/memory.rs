//! In-memory containers for testing.

use crate::{Container, ContainerProvider, ResolveError};
use harbor_package::{Constraint, PackageIdentity, PackageRef};
use harbor_semver::Version;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory package container for testing.
#[derive(Debug)]
pub struct MemoryContainer {
    package: PackageRef,
    versions: Vec<Version>,
    dependencies: HashMap<Version, Vec<Constraint>>,
    revisions: HashMap<Version, String>,
}

impl MemoryContainer {
    pub fn new(package: PackageRef) -> Self {
        Self {
            package,
            versions: Vec::new(),
            dependencies: HashMap::new(),
            revisions: HashMap::new(),
        }
    }

    /// Add a version with its declared dependencies. A deterministic
    /// pseudo-revision is derived from the identity and version.
    pub fn add_version(&mut self, version: Version, dependencies: Vec<Constraint>) {
        let revision = pseudo_revision(&self.package.identity, &version);
        self.add_version_with_revision(version, dependencies, revision);
    }

    /// Add a version with an explicit revision.
    pub fn add_version_with_revision(
        &mut self,
        version: Version,
        dependencies: Vec<Constraint>,
        revision: impl Into<String>,
    ) {
        self.dependencies.insert(version.clone(), dependencies);
        self.revisions.insert(version.clone(), revision.into());
        self.versions.push(version);
        // Keep the list newest first.
        self.versions.sort();
        self.versions.reverse();
    }
}

impl Container for MemoryContainer {
    fn identity(&self) -> &PackageIdentity {
        &self.package.identity
    }

    fn package_ref(&self) -> &PackageRef {
        &self.package
    }

    fn versions(&self) -> Result<Vec<Version>, ResolveError> {
        Ok(self.versions.clone())
    }

    fn dependencies(&self, version: &Version) -> Result<Vec<Constraint>, ResolveError> {
        self.dependencies
            .get(version)
            .cloned()
            .ok_or_else(|| ResolveError::DependencyLoad {
                repository: self.package.location.clone(),
                reference: version.to_string(),
                detail: "unknown version".to_string(),
                suggestion: None,
            })
    }

    fn revision_for(&self, version: &Version) -> Result<Option<String>, ResolveError> {
        Ok(self.revisions.get(version).cloned())
    }
}

/// An in-memory container provider for testing.
#[derive(Default)]
pub struct MemoryContainerProvider {
    containers: HashMap<PackageIdentity, Arc<MemoryContainer>>,
}

impl MemoryContainerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, container: MemoryContainer) {
        self.containers
            .insert(container.package.identity.clone(), Arc::new(container));
    }
}

impl ContainerProvider for MemoryContainerProvider {
    fn get_container(&self, package: &PackageRef) -> Result<Arc<dyn Container>, ResolveError> {
        self.containers
            .get(&package.identity)
            .map(|c| c.clone() as Arc<dyn Container>)
            .ok_or_else(|| ResolveError::UnavailableContainer {
                identity: package.identity.clone(),
                detail: "no such container".to_string(),
            })
    }
}

/// A stable 40-hex pseudo-revision for tests.
fn pseudo_revision(identity: &PackageIdentity, version: &Version) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    identity.as_str().hash(&mut hasher);
    version.to_string().hash(&mut hasher);
    format!("{:0>40x}", hasher.finish())
}
