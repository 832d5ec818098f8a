//! The workspace orchestrator.

use crate::delegate::ManagerDelegateAdapter;
use crate::{
    compute_package_state_changes, DependencyState, ManagedDependency, NullDelegate, PackageChange,
    PackageStateChange, Pin, PinState, PinStore, WorkspaceDelegate, WorkspaceError, WorkspaceState,
    PIN_FILENAME, STATE_FILENAME,
};
use harbor_fetch::{
    FetchError, GitRepositoryProvider, RepositoryContainerProvider, RepositoryManager,
    RepositoryProvider, Revision,
};
use harbor_package::{
    BasicGraphLoader, Constraint, JsonManifestLoader, JsonToolsVersionLoader, LocalFileView,
    Manifest, ManifestLoader, MirrorConfig, PackageGraph, PackageGraphLoader, PackageIdentity,
    PackageRef, ToolsVersion, ToolsVersionLoader,
};
use harbor_resolver::{ResolvedPackage, Resolver};
use harbor_semver::{Version, VersionSet};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const REPOSITORIES_DIR: &str = "repositories";
const CHECKOUTS_DIR: &str = "checkouts";
const EDITS_DIR: &str = "edits";

/// Paths and policy for a workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Root of the data directory (`repositories/`, `checkouts/`, `edits/`,
    /// `workspace-state.json`).
    pub data_path: PathBuf,
    /// Location of the pin file.
    pub pins_path: PathBuf,
    pub mirrors: MirrorConfig,
    /// The tools version this workspace runs.
    pub tools_version: ToolsVersion,
    /// Rewrite the pin store after every successful resolution.
    pub auto_pin: bool,
}

impl WorkspaceConfig {
    pub fn new(data_path: PathBuf, pins_path: PathBuf) -> Self {
        Self {
            data_path,
            pins_path,
            mirrors: MirrorConfig::new(),
            tools_version: ToolsVersion::CURRENT,
            auto_pin: false,
        }
    }
}

/// The stateful coordinator of resolution and on-disk checkouts.
///
/// A workspace owns its data directory exclusively and is single-writer by
/// contract: callers must not run two mutating operations in parallel.
/// Operations that mutate on-disk state save the managed-dependency table
/// at each stable checkpoint, so a failure mid-operation leaves a state the
/// next [`load_package_graph`](Workspace::load_package_graph) can validate
/// and repair.
pub struct Workspace {
    data_path: PathBuf,
    mirrors: MirrorConfig,
    tools_version: ToolsVersion,
    auto_pin: bool,
    repository_provider: Arc<dyn RepositoryProvider>,
    manifest_loader: Arc<dyn ManifestLoader>,
    tools_version_loader: Arc<dyn ToolsVersionLoader>,
    graph_loader: Arc<dyn PackageGraphLoader>,
    delegate: Arc<dyn WorkspaceDelegate>,
    manager: RepositoryManager,
    state: WorkspaceState,
    pin_store: PinStore,
    roots: BTreeSet<PathBuf>,
}

impl Workspace {
    pub fn new(
        config: WorkspaceConfig,
        repository_provider: Arc<dyn RepositoryProvider>,
        manifest_loader: Arc<dyn ManifestLoader>,
        tools_version_loader: Arc<dyn ToolsVersionLoader>,
        graph_loader: Arc<dyn PackageGraphLoader>,
        delegate: Arc<dyn WorkspaceDelegate>,
    ) -> Result<Self, WorkspaceError> {
        let repositories_path = config.data_path.join(REPOSITORIES_DIR);
        fs::create_dir_all(&repositories_path)?;
        fs::create_dir_all(config.data_path.join(CHECKOUTS_DIR))?;

        let state = WorkspaceState::load(config.data_path.join(STATE_FILENAME), &config.mirrors)?;
        let pin_store = PinStore::load(config.pins_path, config.mirrors.clone())?;
        let manager = RepositoryManager::with_delegate(
            repositories_path,
            repository_provider.clone(),
            Arc::new(ManagerDelegateAdapter(delegate.clone())),
        );

        Ok(Self {
            data_path: config.data_path,
            mirrors: config.mirrors,
            tools_version: config.tools_version,
            auto_pin: config.auto_pin,
            repository_provider,
            manifest_loader,
            tools_version_loader,
            graph_loader,
            delegate,
            manager,
            state,
            pin_store,
            roots: BTreeSet::new(),
        })
    }

    /// A git-backed workspace with the stock JSON manifest format and no
    /// delegate. The pin file lives at `Package.resolved` next to the data
    /// directory unless `pins_path` says otherwise.
    pub fn create(data_path: PathBuf, pins_path: Option<PathBuf>) -> Result<Self, WorkspaceError> {
        let pins_path = pins_path.unwrap_or_else(|| data_path.join(PIN_FILENAME));
        Self::new(
            WorkspaceConfig::new(data_path, pins_path),
            Arc::new(GitRepositoryProvider::new()),
            Arc::new(JsonManifestLoader),
            Arc::new(JsonToolsVersionLoader),
            Arc::new(BasicGraphLoader),
            Arc::new(NullDelegate),
        )
    }

    // Roots

    /// Register a root package directory.
    pub fn register_root(&mut self, path: PathBuf) {
        self.roots.insert(path);
    }

    /// Unregister a root package directory.
    pub fn unregister_root(&mut self, path: &Path) -> Result<(), WorkspaceError> {
        if !self.roots.remove(path) {
            return Err(WorkspaceError::PathNotRegistered(path.to_path_buf()));
        }
        Ok(())
    }

    // Accessors

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn managed_dependencies(&self) -> &BTreeMap<PackageIdentity, ManagedDependency> {
        self.state.dependencies()
    }

    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.pin_store.pins()
    }

    /// Absolute path of a managed dependency's working tree.
    pub fn path_of(&self, dependency: &ManagedDependency) -> PathBuf {
        self.data_path.join(&dependency.subpath)
    }

    // The master routine

    /// Load the root manifests, make the managed dependencies match what
    /// they demand (resolving, fetching and checking out as needed), and
    /// hand the complete manifest set to the graph loader.
    pub fn load_package_graph(&mut self) -> Result<PackageGraph, WorkspaceError> {
        let roots = self.load_root_manifests()?;
        self.validate_edited_dependencies()?;

        let (manifests, missing) = self.load_dependency_manifests(&roots)?;
        if missing.is_empty() {
            return Ok(self.graph_loader.load(roots, manifests)?);
        }

        let urls: Vec<String> = missing.iter().map(|p| p.location.clone()).collect();
        self.delegate.fetching_missing_repositories(&urls);

        let constraints = self.resolution_constraints(&roots, true, true, None)?;
        let resolved = self.resolve_and_apply(constraints, false)?;
        self.warn_stale_pins(&resolved);
        if self.auto_pin {
            self.pin_all(None)?;
        }

        let (manifests, still_missing) = self.load_dependency_manifests(&roots)?;
        if !still_missing.is_empty() {
            let urls: Vec<String> = still_missing.iter().map(|p| p.location.clone()).collect();
            return Err(WorkspaceError::Internal(format!(
                "dependencies remain unavailable after resolution: {}",
                urls.join(", ")
            )));
        }
        Ok(self.graph_loader.load(roots, manifests)?)
    }

    // Edit mode

    /// Move a resolved dependency into edit mode: clone its repository into
    /// the editables directory under `name`, check out `revision` (or the
    /// current one), and optionally create a fresh branch there.
    pub fn edit(
        &mut self,
        identity: &PackageIdentity,
        revision: Option<&Revision>,
        name: &str,
        branch: Option<&str>,
    ) -> Result<PathBuf, WorkspaceError> {
        let dependency = self
            .state
            .get(identity)
            .ok_or_else(|| WorkspaceError::UnknownDependency(identity.to_string()))?
            .clone();
        if dependency.is_edited() {
            return Err(WorkspaceError::DependencyAlreadyInEditMode(
                dependency.package.display_name().to_string(),
            ));
        }

        let subpath = PathBuf::from(EDITS_DIR).join(name);
        let dest = self.data_path.join(&subpath);
        if dest.exists() {
            // A stale overlay nothing refers to; replace it.
            fs::remove_dir_all(&dest)?;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let managed_repo =
            self.manager
                .lookup(identity, &dependency.package.location, false)?;
        self.repository_provider
            .clone_checkout(&managed_repo.path, &dest)?;
        let checkout = self.repository_provider.open_checkout(&dest)?;

        let target = match (revision, dependency.current_revision()) {
            (Some(revision), _) => revision.clone(),
            (None, Some(current)) => current.clone(),
            (None, None) => checkout.current_revision()?,
        };
        self.delegate
            .checking_out(&dependency.package.location, target.as_str());
        checkout.checkout(&target)?;

        if let Some(branch) = branch {
            if let Err(error) = checkout.checkout_new_branch(branch) {
                let _ = fs::remove_dir_all(&dest);
                return Err(match error {
                    FetchError::BranchAlreadyExists(name) => {
                        WorkspaceError::BranchAlreadyExists(name)
                    }
                    other => other.into(),
                });
            }
        }

        self.state.insert(dependency.editing(subpath));
        self.state.save()?;
        Ok(dest)
    }

    /// Leave edit mode, removing the overlay and restoring the underlying
    /// checkout. Without `force_remove`, an overlay with uncommitted or
    /// unpushed work is refused.
    pub fn unedit(
        &mut self,
        identity: &PackageIdentity,
        force_remove: bool,
    ) -> Result<(), WorkspaceError> {
        let dependency = self
            .state
            .get(identity)
            .ok_or_else(|| WorkspaceError::UnknownDependency(identity.to_string()))?
            .clone();
        if !dependency.is_edited() {
            return Err(WorkspaceError::DependencyNotInEditMode(
                dependency.package.display_name().to_string(),
            ));
        }

        let dir = self.data_path.join(&dependency.subpath);
        if dir.exists() {
            if !force_remove {
                let checkout = self.repository_provider.open_checkout(&dir)?;
                if checkout.has_uncommitted_changes()? {
                    return Err(WorkspaceError::HasUncommittedChanges(dir));
                }
                if checkout.has_unpushed_commits()? {
                    return Err(WorkspaceError::HasUnpushedCommits(dir));
                }
            }
            fs::remove_dir_all(&dir)?;
        }

        let edits_root = self.data_path.join(EDITS_DIR);
        if edits_root.exists() && fs::read_dir(&edits_root)?.next().is_none() {
            fs::remove_dir(&edits_root)?;
        }

        self.state.remove(identity);
        if let Some(underlying) = dependency.based_on {
            self.state.insert(*underlying);
        }
        self.state.save()?;
        Ok(())
    }

    // Pinning

    /// Pin one dependency at `version`: resolve with that constraint, move
    /// the checkouts to match, and only then record the pin.
    pub fn pin(
        &mut self,
        identity: &PackageIdentity,
        version: &Version,
        reason: Option<String>,
    ) -> Result<(), WorkspaceError> {
        let dependency = self
            .state
            .get(identity)
            .ok_or_else(|| WorkspaceError::UnknownDependency(identity.to_string()))?
            .clone();
        if dependency.is_edited() {
            return Err(WorkspaceError::DependencyAlreadyInEditMode(
                dependency.package.display_name().to_string(),
            ));
        }

        let roots = self.load_root_manifests()?;
        let mut constraints = self.resolution_constraints(&roots, true, false, Some(identity))?;
        constraints.push(Constraint::versioned(
            dependency.package.clone(),
            VersionSet::exact(version.clone()),
        ));

        let resolved = self.resolve_and_apply(constraints, false)?;
        let revision = resolved
            .iter()
            .find(|p| &p.package.identity == identity)
            .and_then(|p| p.revision.clone())
            .map(Revision::new)
            .ok_or_else(|| {
                WorkspaceError::Internal(format!("no revision resolved for '{}'", identity))
            })?;

        self.pin_store.pin(
            dependency.package,
            PinState::Version(version.clone(), revision),
            reason,
        );
        self.pin_store.save()
    }

    /// Record pins for every resolved managed dependency at its current
    /// version.
    pub fn pin_all(&mut self, reason: Option<String>) -> Result<(), WorkspaceError> {
        self.pin_store.unpin_all();
        for dependency in self.state.dependencies().values() {
            if let DependencyState::Checkout {
                version: Some(version),
                revision,
            } = &dependency.state
            {
                self.pin_store.pin(
                    dependency.package.clone(),
                    PinState::Version(version.clone(), revision.clone()),
                    reason.clone(),
                );
            }
        }
        self.pin_store.save()
    }

    /// Drop all pins.
    pub fn unpin_all(&mut self) -> Result<(), WorkspaceError> {
        self.pin_store.unpin_all();
        self.pin_store.save()
    }

    /// Re-resolve every non-edited dependency to the newest admissible
    /// version, refreshing repositories from their origins first. The pin
    /// store is ignored during the resolve and rewritten afterwards when
    /// `repin` (or the auto-pin policy) asks for it.
    pub fn update_dependencies(&mut self, repin: bool) -> Result<(), WorkspaceError> {
        let roots = self.load_root_manifests()?;
        self.validate_edited_dependencies()?;

        let constraints = self.resolution_constraints(&roots, false, false, None)?;
        self.resolve_and_apply(constraints, true)?;

        if repin || self.auto_pin {
            self.pin_all(None)?;
        }
        Ok(())
    }

    // Maintenance

    /// Delete everything in the data directory except the protected set:
    /// repositories, checkouts and the state file.
    pub fn clean(&self) -> Result<(), WorkspaceError> {
        const PROTECTED: [&str; 3] = [REPOSITORIES_DIR, CHECKOUTS_DIR, STATE_FILENAME];
        for entry in fs::read_dir(&self.data_path)? {
            let entry = entry?;
            let name = entry.file_name();
            if PROTECTED.iter().any(|p| name.to_string_lossy() == *p) {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Throw the whole workspace away: managed dependencies, repository
    /// cache and data directory, then recreate the mandatory
    /// subdirectories.
    pub fn reset(&mut self) -> Result<(), WorkspaceError> {
        self.state.clear();
        self.manager.reset()?;
        if self.data_path.exists() {
            fs::remove_dir_all(&self.data_path)?;
        }
        fs::create_dir_all(self.data_path.join(REPOSITORIES_DIR))?;
        fs::create_dir_all(self.data_path.join(CHECKOUTS_DIR))?;
        Ok(())
    }

    // Internals

    fn container_provider(&self, refresh: bool) -> RepositoryContainerProvider {
        RepositoryContainerProvider::new(
            self.manager.clone(),
            self.manifest_loader.clone(),
            self.tools_version_loader.clone(),
            self.tools_version,
            self.mirrors.clone(),
        )
        .refreshing(refresh)
    }

    fn load_root_manifests(&self) -> Result<Vec<Manifest>, WorkspaceError> {
        if self.roots.is_empty() {
            return Err(WorkspaceError::NoRegisteredPackages);
        }
        let mut manifests = Vec::new();
        for root in &self.roots {
            let view = LocalFileView::new(root);
            let location = root.to_string_lossy().into_owned();
            let manifest = self
                .manifest_loader
                .load(Path::new(""), &location, None, &view)?;
            if manifest.tools_version > self.tools_version {
                return Err(WorkspaceError::IncompatibleToolsVersion {
                    path: location,
                    required: manifest.tools_version,
                    current: self.tools_version,
                });
            }
            manifests.push(manifest);
        }
        Ok(manifests)
    }

    /// An edit-mode dependency whose overlay directory has disappeared is
    /// silently reverted to its underlying checkout.
    fn validate_edited_dependencies(&mut self) -> Result<(), WorkspaceError> {
        let mut reverted = Vec::new();
        for (identity, dependency) in self.state.dependencies() {
            if dependency.is_edited() && !self.data_path.join(&dependency.subpath).exists() {
                reverted.push(identity.clone());
            }
        }
        if reverted.is_empty() {
            return Ok(());
        }
        for identity in reverted {
            if let Some(dependency) = self.state.remove(&identity) {
                self.delegate.warning(&format!(
                    "dependency '{}' was in edit mode but the overlay is missing; reverting to the original checkout",
                    dependency.package.display_name()
                ));
                if let Some(underlying) = dependency.based_on {
                    self.state.insert(*underlying);
                }
            }
        }
        self.state.save()
    }

    /// Walk the declared dependency URLs across the managed checkouts,
    /// loading every manifest that is available and collecting the
    /// references that are not.
    fn load_dependency_manifests(
        &self,
        roots: &[Manifest],
    ) -> Result<(Vec<Manifest>, Vec<PackageRef>), WorkspaceError> {
        let mut queue: VecDeque<PackageRef> = VecDeque::new();
        for manifest in roots {
            for constraint in manifest.package_constraints(&self.mirrors) {
                queue.push_back(constraint.package);
            }
        }

        let mut seen: BTreeSet<PackageIdentity> = BTreeSet::new();
        let mut loaded: BTreeMap<PackageIdentity, Manifest> = BTreeMap::new();
        let mut missing: BTreeMap<PackageIdentity, PackageRef> = BTreeMap::new();

        while let Some(package) = queue.pop_front() {
            if !seen.insert(package.identity.clone()) {
                continue;
            }
            let Some(dependency) = self.state.get(&package.identity) else {
                missing.insert(package.identity.clone(), package);
                continue;
            };
            let dir = self.data_path.join(&dependency.subpath);
            if !dir.exists() {
                // Resolved but the checkout vanished; re-clone via
                // resolution.
                missing.insert(package.identity.clone(), package);
                continue;
            }

            let view = LocalFileView::new(&dir);
            match self.manifest_loader.load(
                Path::new(""),
                &package.location,
                dependency.current_version(),
                &view,
            ) {
                Ok(manifest) => {
                    for constraint in manifest.package_constraints(&self.mirrors) {
                        queue.push_back(constraint.package);
                    }
                    loaded.insert(package.identity.clone(), manifest);
                }
                Err(error) => {
                    self.delegate.warning(&format!(
                        "failed to load manifest for '{}': {}",
                        package.identity, error
                    ));
                    missing.insert(package.identity.clone(), package);
                }
            }
        }

        Ok((
            loaded.into_values().collect(),
            missing.into_values().collect(),
        ))
    }

    /// Build the resolution inputs: root dependencies, then per-identity
    /// pinning constraints for the managed dependencies (exact versions for
    /// resolved ones when `pin_managed`, unversioned with declared
    /// dependencies for edited ones), then version pins from the pin store
    /// for identities not otherwise managed.
    fn resolution_constraints(
        &self,
        roots: &[Manifest],
        pin_managed: bool,
        include_pin_store: bool,
        skip_pin_for: Option<&PackageIdentity>,
    ) -> Result<Vec<Constraint>, WorkspaceError> {
        let mut constraints = Vec::new();
        for manifest in roots {
            constraints.extend(manifest.package_constraints(&self.mirrors));
        }

        for (identity, dependency) in self.state.dependencies() {
            if skip_pin_for == Some(identity) {
                continue;
            }
            match &dependency.state {
                DependencyState::Edited => {
                    let dir = self.data_path.join(&dependency.subpath);
                    let declared = if dir.exists() {
                        let view = LocalFileView::new(&dir);
                        match self.manifest_loader.load(
                            Path::new(""),
                            &dependency.package.location,
                            None,
                            &view,
                        ) {
                            Ok(manifest) => manifest.package_constraints(&self.mirrors),
                            Err(error) => {
                                self.delegate.warning(&format!(
                                    "failed to load manifest of edited dependency '{}': {}",
                                    dependency.package.display_name(),
                                    error
                                ));
                                Vec::new()
                            }
                        }
                    } else {
                        Vec::new()
                    };
                    constraints.push(Constraint::unversioned(
                        dependency.package.clone(),
                        declared,
                    ));
                }
                DependencyState::Checkout {
                    version: Some(version),
                    ..
                } if pin_managed => {
                    constraints.push(Constraint::versioned(
                        dependency.package.clone(),
                        VersionSet::exact(version.clone()),
                    ));
                }
                DependencyState::Checkout { .. } => {}
            }
        }

        if include_pin_store {
            for pin in self.pin_store.pins() {
                if self.state.get(&pin.package.identity).is_some() {
                    continue;
                }
                if let PinState::Version(version, _) = &pin.state {
                    constraints.push(Constraint::versioned(
                        pin.package.clone(),
                        VersionSet::exact(version.clone()),
                    ));
                }
            }
        }

        Ok(constraints)
    }

    fn resolve_and_apply(
        &mut self,
        constraints: Vec<Constraint>,
        refresh: bool,
    ) -> Result<Vec<ResolvedPackage>, WorkspaceError> {
        let provider = self.container_provider(refresh);
        let resolved = Resolver::new(&provider).resolve(&constraints)?;
        let changes = compute_package_state_changes(self.state.dependencies(), &resolved)?;
        self.apply_changes(&changes)?;
        Ok(resolved)
    }

    fn apply_changes(&mut self, changes: &[PackageChange]) -> Result<(), WorkspaceError> {
        for change in changes {
            match &change.change {
                PackageStateChange::Added { version, revision }
                | PackageStateChange::Updated {
                    version, revision, ..
                } => {
                    self.check_out(&change.package, version.as_ref(), revision)?;
                }
                PackageStateChange::Removed => {
                    self.remove_dependency(&change.package)?;
                }
                PackageStateChange::Unchanged => {
                    // Self-repair: resolved but the checkout vanished.
                    let gone = self.state.get(&change.package.identity).and_then(
                        |dependency| match &dependency.state {
                            DependencyState::Checkout { version, revision }
                                if !self.data_path.join(&dependency.subpath).exists() =>
                            {
                                Some((version.clone(), revision.clone()))
                            }
                            _ => None,
                        },
                    );
                    if let Some((version, revision)) = gone {
                        self.check_out(&change.package, version.as_ref(), &revision)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Ensure a working checkout for `package` exists and sits at
    /// `revision`, then record it in the managed table.
    fn check_out(
        &mut self,
        package: &PackageRef,
        version: Option<&Version>,
        revision: &Revision,
    ) -> Result<(), WorkspaceError> {
        let managed_repo = self
            .manager
            .lookup(&package.identity, &package.location, false)?;

        let subpath = PathBuf::from(CHECKOUTS_DIR).join(package.identity.fs_safe());
        let dest = self.data_path.join(&subpath);
        if !dest.exists() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            self.repository_provider
                .clone_checkout(&managed_repo.path, &dest)?;
        }

        let checkout = self.repository_provider.open_checkout(&dest)?;
        let reference = match version {
            Some(version) => version.to_string(),
            None => revision.to_string(),
        };
        self.delegate.checking_out(&package.location, &reference);
        checkout.checkout(revision)?;

        self.state.insert(ManagedDependency::checkout(
            package.clone(),
            subpath,
            version.cloned(),
            revision.clone(),
        ));
        self.state.save()
    }

    fn remove_dependency(&mut self, package: &PackageRef) -> Result<(), WorkspaceError> {
        self.delegate.removing(&package.location);
        if let Some(dependency) = self.state.remove(&package.identity) {
            let dir = self.data_path.join(&dependency.subpath);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            self.state.save()?;
        }
        Ok(())
    }

    fn warn_stale_pins(&self, resolved: &[ResolvedPackage]) {
        let resolved_identities: BTreeSet<&PackageIdentity> =
            resolved.iter().map(|p| &p.package.identity).collect();
        for pin in self.pin_store.pins() {
            if !resolved_identities.contains(&pin.package.identity) {
                self.delegate.warning(&format!(
                    "pin for '{}' no longer matches any resolved dependency",
                    pin.name
                ));
            }
        }
    }
}
