//! The shared cache of bare repository clones.

use crate::{FetchError, Repository, RepositoryProvider};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use harbor_package::{PackageIdentity, PackageRef, RefKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

/// Notifications emitted while the manager touches the network.
pub trait RepositoryManagerDelegate: Send + Sync {
    /// A repository not present locally is being cloned.
    fn cloning(&self, _url: &str) {}

    /// An existing clone is being updated from its origin.
    fn fetching(&self, _url: &str) {}
}

struct NullDelegate;
impl RepositoryManagerDelegate for NullDelegate {}

/// A repository served out of the manager's cache.
pub struct ManagedRepository {
    /// Location of the bare clone on disk.
    pub path: PathBuf,
    pub repository: Arc<dyn Repository>,
}

/// Owns the `repositories/` directory of bare clones, keyed by package
/// identity.
///
/// Lookups for the same identity collapse: whichever caller arrives first
/// performs the clone while the others block on the entry until it is
/// available. The manager is cheap to clone and shares its state.
#[derive(Clone)]
pub struct RepositoryManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    path: PathBuf,
    provider: Arc<dyn RepositoryProvider>,
    delegate: Arc<dyn RepositoryManagerDelegate>,
    repositories: DashMap<PackageIdentity, Arc<RepositoryEntry>>,
}

struct RepositoryEntry {
    state: Mutex<EntryState>,
    ready: Condvar,
}

enum EntryState {
    Pending,
    Available(PathBuf),
    Failed(String),
}

impl RepositoryManager {
    /// Create a manager rooted at `path` (the `repositories/` directory).
    pub fn new(path: PathBuf, provider: Arc<dyn RepositoryProvider>) -> Self {
        Self::with_delegate(path, provider, Arc::new(NullDelegate))
    }

    pub fn with_delegate(
        path: PathBuf,
        provider: Arc<dyn RepositoryProvider>,
        delegate: Arc<dyn RepositoryManagerDelegate>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                path,
                provider,
                delegate,
                repositories: DashMap::new(),
            }),
        }
    }

    /// The on-disk location the clone for `identity` lives (or would live)
    /// at.
    pub fn repository_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.inner.path.join(identity.cache_dir_name())
    }

    /// Look up the repository for `identity`, cloning it from `url` on first
    /// sight. With `update`, an existing clone is refreshed from its origin
    /// first. Concurrent lookups of the same identity share one clone.
    pub fn lookup(
        &self,
        identity: &PackageIdentity,
        url: &str,
        update: bool,
    ) -> Result<ManagedRepository, FetchError> {
        let (entry, is_creator) = match self.inner.repositories.entry(identity.clone()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                let entry = Arc::new(RepositoryEntry {
                    state: Mutex::new(EntryState::Pending),
                    ready: Condvar::new(),
                });
                vacant.insert(entry.clone());
                (entry, true)
            }
        };

        if is_creator {
            let result = self.clone_or_open(identity, url, update);
            {
                let mut state = entry.state.lock().unwrap();
                *state = match &result {
                    Ok(path) => EntryState::Available(path.clone()),
                    Err(error) => EntryState::Failed(error.to_string()),
                };
                entry.ready.notify_all();
            }
            if result.is_err() {
                // Forget failed entries so a later lookup can retry.
                self.inner.repositories.remove(identity);
            }
            let path = result?;
            return Ok(ManagedRepository {
                repository: self.inner.provider.open(&path)?,
                path,
            });
        }

        let path = {
            let mut state = entry.state.lock().unwrap();
            loop {
                match &*state {
                    EntryState::Pending => state = entry.ready.wait(state).unwrap(),
                    EntryState::Available(path) => break path.clone(),
                    EntryState::Failed(detail) => {
                        return Err(FetchError::UnavailableRepository {
                            url: url.to_string(),
                            detail: detail.clone(),
                        });
                    }
                }
            }
        };
        let repository = self.inner.provider.open(&path)?;
        if update {
            self.inner.delegate.fetching(url);
            repository.fetch()?;
        }
        Ok(ManagedRepository { repository, path })
    }

    /// Start background lookups for every remote reference in `packages`.
    /// Failures are ignored here; they resurface when the container is
    /// actually requested.
    pub fn prefetch(&self, packages: &[PackageRef]) {
        for package in packages {
            if package.kind != RefKind::Remote {
                continue;
            }
            if self.inner.repositories.contains_key(&package.identity) {
                continue;
            }
            let manager = self.clone();
            let identity = package.identity.clone();
            let url = package.location.clone();
            std::thread::spawn(move || {
                let _ = manager.lookup(&identity, &url, false);
            });
        }
    }

    /// Drop all cached state and delete the clones directory.
    pub fn reset(&self) -> Result<(), FetchError> {
        self.inner.repositories.clear();
        if self.inner.path.exists() {
            std::fs::remove_dir_all(&self.inner.path)?;
        }
        std::fs::create_dir_all(&self.inner.path)?;
        Ok(())
    }

    fn clone_or_open(
        &self,
        identity: &PackageIdentity,
        url: &str,
        update: bool,
    ) -> Result<PathBuf, FetchError> {
        let path = self.repository_path(identity);
        if path.exists() {
            if update {
                self.inner.delegate.fetching(url);
                self.inner.provider.open(&path)?.fetch()?;
            }
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.inner.delegate.cloning(url);
        self.inner
            .provider
            .clone_repository(url, &path)
            .map_err(|error| FetchError::UnavailableRepository {
                url: url.to_string(),
                detail: error.to_string(),
            })?;
        Ok(path)
    }

    /// The root directory of the clone cache.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}
