//! The repository abstraction the core is written against.

use crate::FetchError;
use harbor_package::FileView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A source-control revision identifier (a 40-hex commit hash for git).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bare repository in the local cache.
pub trait Repository: Send + Sync {
    /// All tag names known to the repository.
    fn tags(&self) -> Result<Vec<String>, FetchError>;

    /// Resolve a tag or other revision identifier to a concrete revision.
    fn resolve_revision(&self, reference: &str) -> Result<Revision, FetchError>;

    /// Update the repository from its origin.
    fn fetch(&self) -> Result<(), FetchError>;

    /// Open a read-only view of the file tree at `revision`.
    fn open_file_view(&self, revision: &Revision) -> Result<Arc<dyn FileView>, FetchError>;
}

/// A working checkout with a file tree and a current revision.
pub trait WorkingCheckout: Send + Sync {
    /// The revision the checkout currently sits at.
    fn current_revision(&self) -> Result<Revision, FetchError>;

    /// Check out `revision`, detached.
    fn checkout(&self, revision: &Revision) -> Result<(), FetchError>;

    /// Create and check out a new branch at the current revision. Fails
    /// with [`FetchError::BranchAlreadyExists`] when the branch exists.
    fn checkout_new_branch(&self, name: &str) -> Result<(), FetchError>;

    /// Whether the working tree has uncommitted changes (including
    /// untracked files).
    fn has_uncommitted_changes(&self) -> Result<bool, FetchError>;

    /// Whether local commits exist that the upstream branch does not have.
    fn has_unpushed_commits(&self) -> Result<bool, FetchError>;
}

/// Clones and opens repositories.
///
/// The git implementation is [`GitRepositoryProvider`](crate::GitRepositoryProvider);
/// tests use [`MemoryRepositoryProvider`](crate::MemoryRepositoryProvider).
pub trait RepositoryProvider: Send + Sync {
    /// Create a bare clone of `url` at `dest`.
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<(), FetchError>;

    /// Open a previously cloned bare repository.
    fn open(&self, path: &Path) -> Result<Arc<dyn Repository>, FetchError>;

    /// Create a working checkout at `dest` from the bare repository at
    /// `repository_path`.
    fn clone_checkout(&self, repository_path: &Path, dest: &Path) -> Result<(), FetchError>;

    /// Open a previously created working checkout.
    fn open_checkout(&self, path: &Path) -> Result<Arc<dyn WorkingCheckout>, FetchError>;
}
