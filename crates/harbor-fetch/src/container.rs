//! Repository-backed package containers.

use crate::{RepositoryManager, Repository};
use dashmap::DashMap;
use harbor_package::{
    Constraint, LocalFileView, ManifestError, ManifestLoader, MirrorConfig, PackageIdentity,
    PackageRef, RefKind, ToolsVersion, ToolsVersionLoader,
};
use harbor_resolver::{Container, ContainerProvider, ResolveError};
use harbor_semver::Version;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A tag that parses as a semantic version.
#[derive(Debug, Clone)]
struct TagCandidate {
    tag: String,
    version: Version,
    /// Number of numeric components in the tag (`1.2` has two).
    components: usize,
    has_v_prefix: bool,
}

/// Parse a tag name as a version. An optional leading `v` is stripped, and
/// one or two missing numeric components are padded with zeroes.
fn parse_tag(tag: &str) -> Option<TagCandidate> {
    let stripped = tag.strip_prefix('v').unwrap_or(tag);
    let core_end = stripped.find(['-', '+']).unwrap_or(stripped.len());
    let core = &stripped[..core_end];
    let rest = &stripped[core_end..];

    let components = core.split('.').count();
    let padded = match components {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        3 => stripped.to_string(),
        _ => return None,
    };
    let version: Version = padded.parse().ok()?;
    Some(TagCandidate {
        tag: tag.to_string(),
        version,
        components,
        has_v_prefix: tag.starts_with('v'),
    })
}

/// When several tags map to the same version, prefer the one with the most
/// components, then the one without the `v` prefix.
fn tag_preference(candidate: &TagCandidate) -> (usize, bool) {
    (candidate.components, !candidate.has_v_prefix)
}

#[derive(Default)]
struct ContainerState {
    /// version -> chosen tag, tools-filtered. `None` until first use.
    versions: Option<BTreeMap<Version, String>>,
    dependencies: HashMap<Version, Vec<Constraint>>,
}

/// A package container backed by a repository in the local cache.
///
/// Versions are the repository's tags parsed as versions, filtered to those
/// whose manifest tools version is usable, newest first. Dependencies are
/// loaded from the manifest at the tag's revision and memoized per version.
pub struct RepositoryPackageContainer {
    package: PackageRef,
    repository: Arc<dyn Repository>,
    manifest_loader: Arc<dyn ManifestLoader>,
    tools_version_loader: Arc<dyn ToolsVersionLoader>,
    current_tools_version: ToolsVersion,
    mirrors: MirrorConfig,
    state: Mutex<ContainerState>,
}

impl RepositoryPackageContainer {
    pub fn new(
        package: PackageRef,
        repository: Arc<dyn Repository>,
        manifest_loader: Arc<dyn ManifestLoader>,
        tools_version_loader: Arc<dyn ToolsVersionLoader>,
        current_tools_version: ToolsVersion,
        mirrors: MirrorConfig,
    ) -> Self {
        Self {
            package,
            repository,
            manifest_loader,
            tools_version_loader,
            current_tools_version,
            mirrors,
            state: Mutex::new(ContainerState::default()),
        }
    }

    fn unavailable(&self, detail: impl ToString) -> ResolveError {
        ResolveError::UnavailableContainer {
            identity: self.package.identity.clone(),
            detail: detail.to_string(),
        }
    }

    /// Wrap an error from a per-version load with diagnostic context.
    fn load_error(&self, reference: &str, detail: impl ToString) -> ResolveError {
        ResolveError::DependencyLoad {
            repository: self.package.location.clone(),
            reference: reference.to_string(),
            detail: detail.to_string(),
            suggestion: Some(format!(
                "check the manifest of '{}' at '{}'",
                self.package.display_name(),
                reference
            )),
        }
    }

    /// The tools version declared at `tag`, or `None` when the manifest is
    /// missing there.
    fn tools_version_at(&self, tag: &str) -> Result<Option<ToolsVersion>, ResolveError> {
        let revision = self
            .repository
            .resolve_revision(tag)
            .map_err(|e| self.load_error(tag, e))?;
        let view = self
            .repository
            .open_file_view(&revision)
            .map_err(|e| self.load_error(tag, e))?;
        match self.tools_version_loader.load(Path::new(""), view.as_ref()) {
            Ok(tools) => Ok(Some(tools)),
            Err(ManifestError::MissingManifest(_)) => Ok(None),
            Err(error) => Err(self.load_error(tag, error)),
        }
    }

    fn load_versions(&self) -> Result<BTreeMap<Version, String>, ResolveError> {
        let tags = self
            .repository
            .tags()
            .map_err(|e| self.unavailable(e))?;

        let mut candidates: BTreeMap<Version, TagCandidate> = BTreeMap::new();
        for tag in &tags {
            if let Some(candidate) = parse_tag(tag) {
                match candidates.get(&candidate.version) {
                    Some(existing) if tag_preference(existing) >= tag_preference(&candidate) => {}
                    _ => {
                        candidates.insert(candidate.version.clone(), candidate);
                    }
                }
            }
        }

        let mut versions = BTreeMap::new();
        for (version, candidate) in candidates {
            match self.tools_version_at(&candidate.tag)? {
                Some(tools) if tools <= self.current_tools_version => {
                    versions.insert(version, candidate.tag);
                }
                // Missing manifest or too-new tools version: not usable.
                _ => {}
            }
        }
        Ok(versions)
    }

    /// Look up the tag backing `version`, loading the version map on first
    /// use. The state lock must be held.
    fn tag_for(
        &self,
        state: &mut ContainerState,
        version: &Version,
    ) -> Result<String, ResolveError> {
        if state.versions.is_none() {
            state.versions = Some(self.load_versions()?);
        }
        state
            .versions
            .as_ref()
            .unwrap()
            .get(version)
            .cloned()
            .ok_or_else(|| self.load_error(&version.to_string(), "unknown version"))
    }
}

impl Container for RepositoryPackageContainer {
    fn identity(&self) -> &PackageIdentity {
        &self.package.identity
    }

    fn package_ref(&self) -> &PackageRef {
        &self.package
    }

    fn versions(&self) -> Result<Vec<Version>, ResolveError> {
        let mut state = self.state.lock().unwrap();
        if state.versions.is_none() {
            state.versions = Some(self.load_versions()?);
        }
        Ok(state
            .versions
            .as_ref()
            .unwrap()
            .keys()
            .rev()
            .cloned()
            .collect())
    }

    fn dependencies(&self, version: &Version) -> Result<Vec<Constraint>, ResolveError> {
        let mut state = self.state.lock().unwrap();
        if let Some(cached) = state.dependencies.get(version) {
            return Ok(cached.clone());
        }

        let tag = self.tag_for(&mut state, version)?;
        let revision = self
            .repository
            .resolve_revision(&tag)
            .map_err(|e| self.load_error(&tag, e))?;
        let view = self
            .repository
            .open_file_view(&revision)
            .map_err(|e| self.load_error(&tag, e))?;
        let manifest = self
            .manifest_loader
            .load(Path::new(""), &self.package.location, Some(version), view.as_ref())
            .map_err(|e| self.load_error(&tag, e))?;

        let constraints = manifest.package_constraints(&self.mirrors);
        state.dependencies.insert(version.clone(), constraints.clone());
        Ok(constraints)
    }

    fn revision_for(&self, version: &Version) -> Result<Option<String>, ResolveError> {
        let mut state = self.state.lock().unwrap();
        let tag = match self.tag_for(&mut state, version) {
            Ok(tag) => tag,
            Err(_) => return Ok(None),
        };
        let revision = self
            .repository
            .resolve_revision(&tag)
            .map_err(|e| self.load_error(&tag, e))?;
        Ok(Some(revision.to_string()))
    }
}

/// A container for a package rooted at a local directory.
///
/// Local packages carry no versions; they participate in resolution through
/// unversioned constraints and contribute their currently-declared
/// dependencies.
pub struct LocalPackageContainer {
    package: PackageRef,
    manifest_loader: Arc<dyn ManifestLoader>,
    mirrors: MirrorConfig,
    cached: Mutex<Option<Vec<Constraint>>>,
}

impl LocalPackageContainer {
    pub fn new(
        package: PackageRef,
        manifest_loader: Arc<dyn ManifestLoader>,
        mirrors: MirrorConfig,
    ) -> Self {
        Self {
            package,
            manifest_loader,
            mirrors,
            cached: Mutex::new(None),
        }
    }

    /// The dependencies currently declared by the package's manifest.
    pub fn declared_dependencies(&self) -> Result<Vec<Constraint>, ResolveError> {
        let mut cached = self.cached.lock().unwrap();
        if let Some(constraints) = cached.as_ref() {
            return Ok(constraints.clone());
        }
        let view = LocalFileView::new(&self.package.location);
        let manifest = self
            .manifest_loader
            .load(Path::new(""), &self.package.location, None, &view)
            .map_err(|e| ResolveError::DependencyLoad {
                repository: self.package.location.clone(),
                reference: "local".to_string(),
                detail: e.to_string(),
                suggestion: None,
            })?;
        let constraints = manifest.package_constraints(&self.mirrors);
        *cached = Some(constraints.clone());
        Ok(constraints)
    }
}

impl Container for LocalPackageContainer {
    fn identity(&self) -> &PackageIdentity {
        &self.package.identity
    }

    fn package_ref(&self) -> &PackageRef {
        &self.package
    }

    fn versions(&self) -> Result<Vec<Version>, ResolveError> {
        Ok(Vec::new())
    }

    fn dependencies(&self, _version: &Version) -> Result<Vec<Constraint>, ResolveError> {
        self.declared_dependencies()
    }

    fn revision_for(&self, _version: &Version) -> Result<Option<String>, ResolveError> {
        Ok(None)
    }
}

/// Container provider over the repository manager.
///
/// Containers are created on first lookup and live for the resolve; repeat
/// lookups of the same identity share one container and therefore one
/// dependency cache.
pub struct RepositoryContainerProvider {
    manager: RepositoryManager,
    manifest_loader: Arc<dyn ManifestLoader>,
    tools_version_loader: Arc<dyn ToolsVersionLoader>,
    current_tools_version: ToolsVersion,
    mirrors: MirrorConfig,
    /// Refresh repositories from their origin on first lookup.
    refresh: bool,
    containers: DashMap<PackageIdentity, Arc<dyn Container>>,
}

impl RepositoryContainerProvider {
    pub fn new(
        manager: RepositoryManager,
        manifest_loader: Arc<dyn ManifestLoader>,
        tools_version_loader: Arc<dyn ToolsVersionLoader>,
        current_tools_version: ToolsVersion,
        mirrors: MirrorConfig,
    ) -> Self {
        Self {
            manager,
            manifest_loader,
            tools_version_loader,
            current_tools_version,
            mirrors,
            refresh: false,
            containers: DashMap::new(),
        }
    }

    /// Update existing clones from their origin before serving containers,
    /// so version lists reflect newly published tags.
    pub fn refreshing(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

impl ContainerProvider for RepositoryContainerProvider {
    fn get_container(&self, package: &PackageRef) -> Result<Arc<dyn Container>, ResolveError> {
        if let Some(entry) = self.containers.get(&package.identity) {
            return Ok(entry.value().clone());
        }

        let container: Arc<dyn Container> = match package.kind {
            RefKind::LocalPath => Arc::new(LocalPackageContainer::new(
                package.clone(),
                self.manifest_loader.clone(),
                self.mirrors.clone(),
            )),
            RefKind::Remote => {
                let managed = self
                    .manager
                    .lookup(&package.identity, &package.location, self.refresh)
                    .map_err(|e| ResolveError::UnavailableContainer {
                        identity: package.identity.clone(),
                        detail: e.to_string(),
                    })?;
                Arc::new(RepositoryPackageContainer::new(
                    package.clone(),
                    managed.repository,
                    self.manifest_loader.clone(),
                    self.tools_version_loader.clone(),
                    self.current_tools_version,
                    self.mirrors.clone(),
                ))
            }
            RefKind::Registry => {
                return Err(ResolveError::UnavailableContainer {
                    identity: package.identity.clone(),
                    detail: "registry packages are not supported".to_string(),
                });
            }
        };

        let entry = self
            .containers
            .entry(package.identity.clone())
            .or_insert(container);
        Ok(entry.value().clone())
    }

    fn prefetch(&self, packages: &[PackageRef]) {
        self.manager.prefetch(packages);
    }
}
