//! The resolved package graph handed to downstream consumers.

use crate::{Manifest, ManifestError};

/// The outcome of workspace loading: every manifest the build needs.
#[derive(Debug, Clone)]
pub struct PackageGraph {
    /// Manifests of the registered root packages.
    pub roots: Vec<Manifest>,
    /// Manifests of the resolved external dependencies.
    pub dependencies: Vec<Manifest>,
}

impl PackageGraph {
    /// Total number of packages in the graph.
    pub fn package_count(&self) -> usize {
        self.roots.len() + self.dependencies.len()
    }
}

/// Turns resolved manifests into a package graph.
///
/// The real compile-graph construction lives with the build system; the
/// core only hands it the manifests it resolved.
pub trait PackageGraphLoader: Send + Sync {
    fn load(
        &self,
        roots: Vec<Manifest>,
        dependencies: Vec<Manifest>,
    ) -> Result<PackageGraph, ManifestError>;
}

/// A graph loader that simply bundles the manifests.
#[derive(Debug, Default)]
pub struct BasicGraphLoader;

impl PackageGraphLoader for BasicGraphLoader {
    fn load(
        &self,
        roots: Vec<Manifest>,
        dependencies: Vec<Manifest>,
    ) -> Result<PackageGraph, ManifestError> {
        Ok(PackageGraph { roots, dependencies })
    }
}
