//! In-memory repository provider for testing.

use crate::{FetchError, Repository, RepositoryProvider, Revision, WorkingCheckout};
use harbor_package::FileView;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RepoData {
    tags: BTreeMap<String, Revision>,
    /// revision -> path -> contents
    files: HashMap<String, HashMap<PathBuf, Vec<u8>>>,
}

#[derive(Default)]
struct World {
    repositories: Mutex<HashMap<String, Arc<Mutex<RepoData>>>>,
    clones: Mutex<HashMap<PathBuf, Arc<Mutex<RepoData>>>>,
    checkout_revisions: Mutex<HashMap<PathBuf, Revision>>,
    branches: Mutex<HashMap<PathBuf, BTreeSet<String>>>,
    dirty: Mutex<HashSet<PathBuf>>,
    unpushed: Mutex<HashSet<PathBuf>>,
}

/// An in-memory repository provider for testing.
///
/// Hosted repositories are declared up front with their tags and file
/// contents; clones and checkouts are tracked in memory while still
/// creating their directories on disk, so directory-existence checks in the
/// workspace behave as they would with real clones.
#[derive(Default)]
pub struct MemoryRepositoryProvider {
    world: Arc<World>,
}

impl MemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a hosted repository with `(tag, revision)` pairs.
    pub fn add_repository(&self, url: &str, tags: &[(&str, &str)]) {
        let mut data = RepoData::default();
        for (tag, revision) in tags {
            data.tags
                .insert(tag.to_string(), Revision::new(revision.to_string()));
            data.files.entry(revision.to_string()).or_default();
        }
        self.world
            .repositories
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(Mutex::new(data)));
    }

    /// Place a file into a repository's tree at `revision`.
    pub fn add_file(&self, url: &str, revision: &str, path: &Path, contents: &[u8]) {
        let repositories = self.world.repositories.lock().unwrap();
        let data = repositories.get(url).expect("unknown repository");
        data.lock()
            .unwrap()
            .files
            .entry(revision.to_string())
            .or_default()
            .insert(path.to_path_buf(), contents.to_vec());
    }

    /// Make the checkout at `path` report uncommitted changes.
    pub fn mark_dirty(&self, path: &Path) {
        self.world.dirty.lock().unwrap().insert(path.to_path_buf());
    }

    /// Make the checkout at `path` report unpushed commits.
    pub fn mark_unpushed(&self, path: &Path) {
        self.world.unpushed.lock().unwrap().insert(path.to_path_buf());
    }
}

impl RepositoryProvider for MemoryRepositoryProvider {
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let data = self
            .world
            .repositories
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::UnavailableRepository {
                url: url.to_string(),
                detail: "no such repository".to_string(),
            })?;
        std::fs::create_dir_all(dest)?;
        self.world
            .clones
            .lock()
            .unwrap()
            .insert(dest.to_path_buf(), data);
        Ok(())
    }

    fn open(&self, path: &Path) -> Result<Arc<dyn Repository>, FetchError> {
        let data = self
            .world
            .clones
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::Git(format!("not a repository: {}", path.display())))?;
        Ok(Arc::new(MemoryRepository { data }))
    }

    fn clone_checkout(&self, repository_path: &Path, dest: &Path) -> Result<(), FetchError> {
        let data = self
            .world
            .clones
            .lock()
            .unwrap()
            .get(repository_path)
            .cloned()
            .ok_or_else(|| {
                FetchError::Git(format!("not a repository: {}", repository_path.display()))
            })?;
        std::fs::create_dir_all(dest)?;

        // New checkouts start at the newest tagged revision, if any.
        let initial = data
            .lock()
            .unwrap()
            .tags
            .values()
            .next_back()
            .cloned()
            .unwrap_or_else(|| Revision::new("initial"));
        self.world
            .clones
            .lock()
            .unwrap()
            .insert(dest.to_path_buf(), data);
        self.world
            .checkout_revisions
            .lock()
            .unwrap()
            .insert(dest.to_path_buf(), initial);
        Ok(())
    }

    fn open_checkout(&self, path: &Path) -> Result<Arc<dyn WorkingCheckout>, FetchError> {
        if !self
            .world
            .checkout_revisions
            .lock()
            .unwrap()
            .contains_key(path)
        {
            return Err(FetchError::Git(format!(
                "not a checkout: {}",
                path.display()
            )));
        }
        Ok(Arc::new(MemoryCheckout {
            world: self.world.clone(),
            path: path.to_path_buf(),
        }))
    }
}

struct MemoryRepository {
    data: Arc<Mutex<RepoData>>,
}

impl Repository for MemoryRepository {
    fn tags(&self) -> Result<Vec<String>, FetchError> {
        Ok(self.data.lock().unwrap().tags.keys().cloned().collect())
    }

    fn resolve_revision(&self, reference: &str) -> Result<Revision, FetchError> {
        let data = self.data.lock().unwrap();
        if let Some(revision) = data.tags.get(reference) {
            return Ok(revision.clone());
        }
        if data.files.contains_key(reference)
            || data.tags.values().any(|r| r.as_str() == reference)
        {
            return Ok(Revision::new(reference.to_string()));
        }
        Err(FetchError::InvalidRevision(reference.to_string()))
    }

    fn fetch(&self) -> Result<(), FetchError> {
        Ok(())
    }

    fn open_file_view(&self, revision: &Revision) -> Result<Arc<dyn FileView>, FetchError> {
        let data = self.data.lock().unwrap();
        let files = data
            .files
            .get(revision.as_str())
            .cloned()
            .ok_or_else(|| FetchError::InvalidRevision(revision.to_string()))?;
        Ok(Arc::new(MemoryFileView { files }))
    }
}

struct MemoryFileView {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl FileView for MemoryFileView {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

struct MemoryCheckout {
    world: Arc<World>,
    path: PathBuf,
}

impl WorkingCheckout for MemoryCheckout {
    fn current_revision(&self) -> Result<Revision, FetchError> {
        self.world
            .checkout_revisions
            .lock()
            .unwrap()
            .get(&self.path)
            .cloned()
            .ok_or_else(|| FetchError::Git("checkout has no revision".to_string()))
    }

    fn checkout(&self, revision: &Revision) -> Result<(), FetchError> {
        self.world
            .checkout_revisions
            .lock()
            .unwrap()
            .insert(self.path.clone(), revision.clone());
        Ok(())
    }

    fn checkout_new_branch(&self, name: &str) -> Result<(), FetchError> {
        let mut branches = self.world.branches.lock().unwrap();
        let entry = branches.entry(self.path.clone()).or_default();
        if !entry.insert(name.to_string()) {
            return Err(FetchError::BranchAlreadyExists(name.to_string()));
        }
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool, FetchError> {
        Ok(self.world.dirty.lock().unwrap().contains(&self.path))
    }

    fn has_unpushed_commits(&self) -> Result<bool, FetchError> {
        Ok(self.world.unpushed.lock().unwrap().contains(&self.path))
    }
}
