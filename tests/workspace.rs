//! End-to-end workspace tests over in-memory repositories.

use harbor_core::{
    DependencyState, NullDelegate, Workspace, WorkspaceConfig, WorkspaceDelegate, WorkspaceError,
};
use harbor_fetch::MemoryRepositoryProvider;
use harbor_package::{
    BasicGraphLoader, Manifest, ManifestDependency, MockManifestLoader, MockToolsVersionLoader,
    PackageIdentity, ToolsVersion,
};
use harbor_resolver::ResolveError;
use harbor_semver::{Version, VersionSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

fn v(s: &str) -> Version {
    s.parse().unwrap()
}

fn identity(url: &str) -> PackageIdentity {
    PackageIdentity::from_location(url)
}

fn manifest(name: &str, url: &str, version: Option<&str>, deps: &[(&str, &str, &str)]) -> Manifest {
    Manifest {
        name: name.to_string(),
        url: url.to_string(),
        version: version.map(v),
        tools_version: ToolsVersion::MINIMUM,
        dependencies: deps
            .iter()
            .map(|(url, lo, hi)| ManifestDependency {
                url: url.to_string(),
                versions: VersionSet::range(v(lo), v(hi)),
            })
            .collect(),
    }
}

/// Delegate that records warnings for assertions.
#[derive(Default)]
struct RecordingDelegate {
    warnings: Mutex<Vec<String>>,
}

impl WorkspaceDelegate for RecordingDelegate {
    fn warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

/// A hosted world with one root package depending on `a`, which depends on
/// `b`. `a` has three tagged versions so tests can observe pinning and
/// updating.
struct Fixture {
    tmp: tempfile::TempDir,
    provider: Arc<MemoryRepositoryProvider>,
    root: PathBuf,
    root_url: String,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        std::fs::create_dir_all(&root).unwrap();

        let provider = Arc::new(MemoryRepositoryProvider::new());
        provider.add_repository(
            "https://host/a",
            &[("1.0.0", "ra0"), ("1.1.0", "ra1"), ("1.2.0", "ra2")],
        );
        provider.add_repository("https://host/b", &[("1.0.0", "rb0")]);

        let root_url = root.to_string_lossy().into_owned();
        Self {
            tmp,
            provider,
            root,
            root_url,
        }
    }

    fn loader(&self) -> Arc<MockManifestLoader> {
        let mut loader = MockManifestLoader::new();
        loader.add(
            self.root_url.clone(),
            None,
            manifest(
                "root",
                &self.root_url,
                None,
                &[("https://host/a", "1.0.0", "2.0.0")],
            ),
        );
        for version in ["1.0.0", "1.1.0", "1.2.0"] {
            loader.add(
                "https://host/a",
                Some(v(version)),
                manifest(
                    "a",
                    "https://host/a",
                    Some(version),
                    &[("https://host/b", "1.0.0", "2.0.0")],
                ),
            );
        }
        loader.add(
            "https://host/a",
            None,
            manifest(
                "a",
                "https://host/a",
                None,
                &[("https://host/b", "1.0.0", "2.0.0")],
            ),
        );
        loader.add(
            "https://host/b",
            Some(v("1.0.0")),
            manifest("b", "https://host/b", Some("1.0.0"), &[]),
        );
        loader.add("https://host/b", None, manifest("b", "https://host/b", None, &[]));
        Arc::new(loader)
    }

    fn pins_path(&self) -> PathBuf {
        self.tmp.path().join("Package.resolved")
    }

    fn workspace(&self) -> Workspace {
        self.workspace_at(self.tmp.path().join("data"), Arc::new(NullDelegate))
    }

    fn workspace_at(&self, data_path: PathBuf, delegate: Arc<dyn WorkspaceDelegate>) -> Workspace {
        let config = WorkspaceConfig::new(data_path, self.pins_path());
        let mut workspace = Workspace::new(
            config,
            self.provider.clone(),
            self.loader(),
            Arc::new(MockToolsVersionLoader::default()),
            Arc::new(BasicGraphLoader),
            delegate,
        )
        .unwrap();
        workspace.register_root(self.root.clone());
        workspace
    }

    fn version_of(&self, workspace: &Workspace, url: &str) -> Option<Version> {
        workspace
            .managed_dependencies()
            .get(&identity(url))
            .and_then(|dep| dep.current_version().cloned())
    }
}

#[test]
fn test_load_package_graph_resolves_and_checks_out() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();

    let graph = workspace.load_package_graph().unwrap();
    assert_eq!(graph.roots.len(), 1);
    assert_eq!(graph.dependencies.len(), 2);

    // Newest admissible versions were chosen.
    assert_eq!(fixture.version_of(&workspace, "https://host/a"), Some(v("1.2.0")));
    assert_eq!(fixture.version_of(&workspace, "https://host/b"), Some(v("1.0.0")));

    // Checkouts exist on disk.
    for dependency in workspace.managed_dependencies().values() {
        assert!(workspace.path_of(dependency).exists());
    }
}

#[test]
fn test_reload_is_stable() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();
    let before = workspace.managed_dependencies().clone();

    // Reloading the same workspace changes nothing.
    workspace.load_package_graph().unwrap();
    assert_eq!(workspace.managed_dependencies(), &before);

    // Reopening the workspace from its state file changes nothing either.
    let mut reopened = fixture.workspace();
    reopened.load_package_graph().unwrap();
    assert_eq!(reopened.managed_dependencies(), &before);
}

#[test]
fn test_pin_moves_checkout_and_survives_fresh_workspace() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();
    assert_eq!(fixture.version_of(&workspace, "https://host/a"), Some(v("1.2.0")));

    workspace
        .pin(&identity("https://host/a"), &v("1.1.0"), None)
        .unwrap();
    assert_eq!(fixture.version_of(&workspace, "https://host/a"), Some(v("1.1.0")));
    assert!(fixture.pins_path().exists());

    // A fresh workspace (same pin file, empty data directory) reproduces
    // the pinned version even though a newer tag exists.
    let mut fresh = fixture.workspace_at(fixture.tmp.path().join("data2"), Arc::new(NullDelegate));
    fresh.load_package_graph().unwrap();
    assert_eq!(fixture.version_of(&fresh, "https://host/a"), Some(v("1.1.0")));
}

#[test]
fn test_pin_unsatisfiable_version_leaves_state_untouched() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();

    let result = workspace.pin(&identity("https://host/a"), &v("9.9.9"), None);
    assert!(matches!(
        result,
        Err(WorkspaceError::Resolve(
            ResolveError::UnsatisfiableRequirement { .. }
        ))
    ));
    assert_eq!(fixture.version_of(&workspace, "https://host/a"), Some(v("1.2.0")));
    assert!(!fixture.pins_path().exists());
}

#[test]
fn test_update_dependencies_repins() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();
    workspace
        .pin(&identity("https://host/a"), &v("1.0.0"), None)
        .unwrap();
    assert_eq!(fixture.version_of(&workspace, "https://host/a"), Some(v("1.0.0")));

    workspace.update_dependencies(true).unwrap();
    assert_eq!(fixture.version_of(&workspace, "https://host/a"), Some(v("1.2.0")));

    let pinned: Vec<_> = workspace.pins().collect();
    assert!(pinned
        .iter()
        .any(|pin| pin.package.identity == identity("https://host/a")
            && matches!(&pin.state, harbor_core::PinState::Version(version, _) if *version == v("1.2.0"))));
}

#[test]
fn test_edit_and_unedit() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();

    let a = identity("https://host/a");
    let overlay = workspace.edit(&a, None, "a-edit", Some("work")).unwrap();
    assert!(overlay.exists());
    // The overlay lives under the caller-supplied name.
    assert!(overlay.ends_with("edits/a-edit"));
    assert!(workspace.managed_dependencies()[&a].is_edited());

    // Editing twice is refused.
    assert!(matches!(
        workspace.edit(&a, None, "a-edit", None),
        Err(WorkspaceError::DependencyAlreadyInEditMode(_))
    ));

    // Loading the graph with an edited dependency keeps it untouched and
    // still resolves its declared dependencies.
    workspace.load_package_graph().unwrap();
    assert!(workspace.managed_dependencies()[&a].is_edited());
    assert!(workspace.managed_dependencies().contains_key(&identity("https://host/b")));

    workspace.unedit(&a, false).unwrap();
    assert!(!overlay.exists());
    let restored = &workspace.managed_dependencies()[&a];
    assert!(!restored.is_edited());
    assert_eq!(restored.current_version(), Some(&v("1.2.0")));

    assert!(matches!(
        workspace.unedit(&a, false),
        Err(WorkspaceError::DependencyNotInEditMode(_))
    ));
}

#[test]
fn test_unedit_refuses_uncommitted_changes() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();

    let a = identity("https://host/a");
    let overlay = workspace.edit(&a, None, "a", None).unwrap();

    fixture.provider.mark_dirty(&overlay);
    assert!(matches!(
        workspace.unedit(&a, false),
        Err(WorkspaceError::HasUncommittedChanges(_))
    ));

    // Force removal discards the unsaved work.
    workspace.unedit(&a, true).unwrap();
    assert!(!overlay.exists());
}

#[test]
fn test_unedit_refuses_unpushed_commits() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();

    let a = identity("https://host/a");
    let overlay = workspace.edit(&a, None, "a", None).unwrap();

    fixture.provider.mark_unpushed(&overlay);
    assert!(matches!(
        workspace.unedit(&a, false),
        Err(WorkspaceError::HasUnpushedCommits(_))
    ));
    workspace.unedit(&a, true).unwrap();
}

#[test]
fn test_missing_overlay_reverts_to_checkout() {
    let fixture = Fixture::new();
    let delegate = Arc::new(RecordingDelegate::default());
    let mut workspace =
        fixture.workspace_at(fixture.tmp.path().join("data"), delegate.clone());
    workspace.load_package_graph().unwrap();

    let a = identity("https://host/a");
    let overlay = workspace.edit(&a, None, "a", None).unwrap();
    std::fs::remove_dir_all(&overlay).unwrap();

    workspace.load_package_graph().unwrap();
    let dependency = &workspace.managed_dependencies()[&a];
    assert!(!dependency.is_edited());
    assert_eq!(dependency.current_version(), Some(&v("1.2.0")));
    assert!(delegate
        .warnings
        .lock()
        .unwrap()
        .iter()
        .any(|w| w.contains("edit mode")));
}

#[test]
fn test_self_repair_missing_checkout() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();

    let a = identity("https://host/a");
    let checkout = workspace.path_of(&workspace.managed_dependencies()[&a].clone());
    std::fs::remove_dir_all(&checkout).unwrap();

    workspace.load_package_graph().unwrap();
    assert!(checkout.exists());
    assert_eq!(fixture.version_of(&workspace, "https://host/a"), Some(v("1.2.0")));
}

#[test]
fn test_clean_preserves_protected_set() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();

    let data = workspace.data_path().to_path_buf();
    std::fs::create_dir_all(data.join("scratch")).unwrap();
    std::fs::write(data.join("notes.txt"), b"tmp").unwrap();

    workspace.clean().unwrap();
    assert!(data.join("repositories").exists());
    assert!(data.join("checkouts").exists());
    assert!(data.join("workspace-state.json").exists());
    assert!(!data.join("scratch").exists());
    assert!(!data.join("notes.txt").exists());
}

#[test]
fn test_reset_recreates_empty_workspace() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();
    assert!(!workspace.managed_dependencies().is_empty());

    workspace.reset().unwrap();
    assert!(workspace.managed_dependencies().is_empty());
    let data = workspace.data_path();
    assert!(data.join("repositories").exists());
    assert!(data.join("checkouts").exists());
    assert!(!data.join("workspace-state.json").exists());

    // The workspace is usable again after a reset.
    workspace.load_package_graph().unwrap();
    assert_eq!(fixture.version_of(&workspace, "https://host/a"), Some(v("1.2.0")));
}

#[test]
fn test_root_registration_errors() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();

    assert!(matches!(
        workspace.unregister_root(std::path::Path::new("/nowhere")),
        Err(WorkspaceError::PathNotRegistered(_))
    ));

    workspace.unregister_root(&fixture.root.clone()).unwrap();
    assert!(matches!(
        workspace.load_package_graph(),
        Err(WorkspaceError::NoRegisteredPackages)
    ));
}

#[test]
fn test_incompatible_root_tools_version() {
    let fixture = Fixture::new();

    let mut loader = MockManifestLoader::new();
    let mut root_manifest = manifest("root", &fixture.root_url, None, &[]);
    root_manifest.tools_version = ToolsVersion::new(99, 0, 0);
    loader.add(fixture.root_url.clone(), None, root_manifest);

    let config = WorkspaceConfig::new(fixture.tmp.path().join("data"), fixture.pins_path());
    let mut workspace = Workspace::new(
        config,
        fixture.provider.clone(),
        Arc::new(loader),
        Arc::new(MockToolsVersionLoader::default()),
        Arc::new(BasicGraphLoader),
        Arc::new(NullDelegate),
    )
    .unwrap();
    workspace.register_root(fixture.root.clone());

    assert!(matches!(
        workspace.load_package_graph(),
        Err(WorkspaceError::IncompatibleToolsVersion { .. })
    ));
}

#[test]
fn test_auto_pin_writes_pins_on_load() {
    let fixture = Fixture::new();
    let mut config = WorkspaceConfig::new(fixture.tmp.path().join("data"), fixture.pins_path());
    config.auto_pin = true;

    let mut workspace = Workspace::new(
        config,
        fixture.provider.clone(),
        fixture.loader(),
        Arc::new(MockToolsVersionLoader::default()),
        Arc::new(BasicGraphLoader),
        Arc::new(NullDelegate),
    )
    .unwrap();
    workspace.register_root(fixture.root.clone());

    workspace.load_package_graph().unwrap();
    assert!(fixture.pins_path().exists());
    assert_eq!(workspace.pins().count(), 2);
}

#[test]
fn test_state_changes_reflected_in_dependency_states() {
    let fixture = Fixture::new();
    let mut workspace = fixture.workspace();
    workspace.load_package_graph().unwrap();

    for dependency in workspace.managed_dependencies().values() {
        match &dependency.state {
            DependencyState::Checkout { version, revision } => {
                assert!(version.is_some());
                assert!(!revision.as_str().is_empty());
            }
            DependencyState::Edited => panic!("nothing is edited"),
        }
    }
}
