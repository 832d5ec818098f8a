//! Git implementation of the repository abstraction.

use crate::{FetchError, Repository, RepositoryProvider, Revision, WorkingCheckout};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, Oid, StatusOptions};
use harbor_package::FileView;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Repository provider backed by libgit2.
#[derive(Debug, Default)]
pub struct GitRepositoryProvider;

impl GitRepositoryProvider {
    pub fn new() -> Self {
        Self
    }
}

impl RepositoryProvider for GitRepositoryProvider {
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        RepoBuilder::new()
            .bare(true)
            .clone(url, dest)
            .map_err(|e| FetchError::Git(format!("failed to clone '{}': {}", url, e)))?;
        Ok(())
    }

    fn open(&self, path: &Path) -> Result<Arc<dyn Repository>, FetchError> {
        let repo = git2::Repository::open(path)
            .map_err(|e| FetchError::Git(format!("failed to open repository: {}", e)))?;
        Ok(Arc::new(GitRepository {
            path: path.to_path_buf(),
            repo: Mutex::new(repo),
        }))
    }

    fn clone_checkout(&self, repository_path: &Path, dest: &Path) -> Result<(), FetchError> {
        RepoBuilder::new()
            .clone(&repository_path.to_string_lossy(), dest)
            .map_err(|e| FetchError::Git(format!("failed to clone checkout: {}", e)))?;
        Ok(())
    }

    fn open_checkout(&self, path: &Path) -> Result<Arc<dyn WorkingCheckout>, FetchError> {
        let repo = git2::Repository::open(path)
            .map_err(|e| FetchError::Git(format!("failed to open checkout: {}", e)))?;
        Ok(Arc::new(GitCheckout {
            repo: Mutex::new(repo),
        }))
    }
}

/// A bare git repository.
pub struct GitRepository {
    path: PathBuf,
    repo: Mutex<git2::Repository>,
}

impl Repository for GitRepository {
    fn tags(&self) -> Result<Vec<String>, FetchError> {
        let repo = self.repo.lock().unwrap();
        let names = repo
            .tag_names(None)
            .map_err(|e| FetchError::Git(format!("failed to list tags: {}", e)))?;
        Ok(names.iter().flatten().map(String::from).collect())
    }

    fn resolve_revision(&self, reference: &str) -> Result<Revision, FetchError> {
        let repo = self.repo.lock().unwrap();

        // Prefer an exact tag, then fall back to general revision syntax.
        if let Ok(tag_ref) = repo.find_reference(&format!("refs/tags/{}", reference)) {
            let commit = tag_ref
                .peel_to_commit()
                .map_err(|e| FetchError::Git(format!("failed to peel to commit: {}", e)))?;
            return Ok(Revision::new(commit.id().to_string()));
        }

        let obj = repo
            .revparse_single(reference)
            .map_err(|_| FetchError::InvalidRevision(reference.to_string()))?;
        let commit = obj
            .peel_to_commit()
            .map_err(|e| FetchError::Git(format!("failed to peel to commit: {}", e)))?;
        Ok(Revision::new(commit.id().to_string()))
    }

    fn fetch(&self) -> Result<(), FetchError> {
        let repo = self.repo.lock().unwrap();

        // Fetch in a block so the remote borrow ends
        {
            let mut remote = repo
                .find_remote("origin")
                .map_err(|e| FetchError::Git(format!("failed to find remote: {}", e)))?;

            let mut fetch_options = FetchOptions::new();
            remote
                .fetch(&[] as &[&str], Some(&mut fetch_options), None)
                .map_err(|e| FetchError::Git(format!("failed to fetch: {}", e)))?;
        }

        Ok(())
    }

    fn open_file_view(&self, revision: &Revision) -> Result<Arc<dyn FileView>, FetchError> {
        // Validate the revision up front so later reads can only fail on
        // missing paths.
        let repo = self.repo.lock().unwrap();
        let oid = Oid::from_str(revision.as_str())
            .map_err(|_| FetchError::InvalidRevision(revision.to_string()))?;
        repo.find_commit(oid)
            .map_err(|_| FetchError::InvalidRevision(revision.to_string()))?;

        Ok(Arc::new(GitFileView {
            repo_path: self.path.clone(),
            revision: revision.clone(),
        }))
    }
}

/// A read-only view of one revision of a repository.
///
/// Each read opens the repository fresh; libgit2 objects are not shareable
/// across threads and manifest loads only touch a handful of files.
struct GitFileView {
    repo_path: PathBuf,
    revision: Revision,
}

impl GitFileView {
    fn read_blob(&self, path: &Path) -> Result<Vec<u8>, git2::Error> {
        let repo = git2::Repository::open(&self.repo_path)?;
        let oid = Oid::from_str(self.revision.as_str())?;
        let tree = repo.find_commit(oid)?.tree()?;
        let entry = tree.get_path(path)?;
        let blob = repo.find_blob(entry.id())?;
        Ok(blob.content().to_vec())
    }
}

impl FileView for GitFileView {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.read_blob(path)
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.read_blob(path).is_ok()
    }
}

/// A git working checkout.
pub struct GitCheckout {
    repo: Mutex<git2::Repository>,
}

impl WorkingCheckout for GitCheckout {
    fn current_revision(&self) -> Result<Revision, FetchError> {
        let repo = self.repo.lock().unwrap();
        let commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| FetchError::Git(format!("failed to read HEAD: {}", e)))?;
        Ok(Revision::new(commit.id().to_string()))
    }

    fn checkout(&self, revision: &Revision) -> Result<(), FetchError> {
        let repo = self.repo.lock().unwrap();
        let oid = Oid::from_str(revision.as_str())
            .map_err(|_| FetchError::InvalidRevision(revision.to_string()))?;
        let commit = repo
            .find_commit(oid)
            .map_err(|_| FetchError::InvalidRevision(revision.to_string()))?;

        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(|e| FetchError::Git(format!("failed to checkout: {}", e)))?;
        repo.set_head_detached(oid)
            .map_err(|e| FetchError::Git(format!("failed to set HEAD: {}", e)))?;
        Ok(())
    }

    fn checkout_new_branch(&self, name: &str) -> Result<(), FetchError> {
        let repo = self.repo.lock().unwrap();
        if repo.find_branch(name, git2::BranchType::Local).is_ok() {
            return Err(FetchError::BranchAlreadyExists(name.to_string()));
        }

        let commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| FetchError::Git(format!("failed to read HEAD: {}", e)))?;
        repo.branch(name, &commit, false)
            .map_err(|e| FetchError::Git(format!("failed to create branch: {}", e)))?;
        repo.set_head(&format!("refs/heads/{}", name))
            .map_err(|e| FetchError::Git(format!("failed to set HEAD: {}", e)))?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))
            .map_err(|e| FetchError::Git(format!("failed to checkout branch: {}", e)))?;
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool, FetchError> {
        let repo = self.repo.lock().unwrap();
        let statuses = repo
            .statuses(Some(StatusOptions::new().include_untracked(true)))
            .map_err(|e| FetchError::Git(format!("failed to read status: {}", e)))?;
        Ok(!statuses.is_empty())
    }

    fn has_unpushed_commits(&self) -> Result<bool, FetchError> {
        let repo = self.repo.lock().unwrap();

        let head = match repo.head() {
            Ok(head) => head,
            // Unborn or detached HEAD tracks nothing.
            Err(_) => return Ok(false),
        };
        if !head.is_branch() {
            return Ok(false);
        }
        let branch_name = match head.shorthand() {
            Some(name) => name.to_string(),
            None => return Ok(false),
        };
        let branch = repo
            .find_branch(&branch_name, git2::BranchType::Local)
            .map_err(|e| FetchError::Git(format!("failed to find branch: {}", e)))?;
        let upstream = match branch.upstream() {
            Ok(upstream) => upstream,
            // No upstream configured: nothing to be behind of.
            Err(_) => return Ok(false),
        };

        let local_oid = head
            .target()
            .ok_or_else(|| FetchError::Git("HEAD has no target".to_string()))?;
        let upstream_oid = upstream
            .get()
            .target()
            .ok_or_else(|| FetchError::Git("upstream has no target".to_string()))?;
        let (ahead, _) = repo
            .graph_ahead_behind(local_oid, upstream_oid)
            .map_err(|e| FetchError::Git(format!("failed to compare with upstream: {}", e)))?;
        Ok(ahead > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Initialize a repository with one committed manifest and one tag.
    fn create_test_repo(path: &Path) -> git2::Repository {
        let repo = git2::Repository::init(path).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "tester").unwrap();
            config.set_str("user.email", "tester@example.com").unwrap();
        }
        std::fs::write(path.join("harbor.json"), br#"{ "name": "fixture" }"#).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("harbor.json")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        {
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = repo.signature().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        {
            let head = repo.revparse_single("HEAD").unwrap();
            repo.tag_lightweight("1.0.0", &head, false).unwrap();
        }
        repo
    }

    #[test]
    fn test_tags_and_revisions() {
        let dir = TempDir::new().unwrap();
        create_test_repo(dir.path());

        let provider = GitRepositoryProvider::new();
        let repo = provider.open(dir.path()).unwrap();

        assert_eq!(repo.tags().unwrap(), vec!["1.0.0".to_string()]);

        let revision = repo.resolve_revision("1.0.0").unwrap();
        assert_eq!(revision.as_str().len(), 40);
        assert!(repo.resolve_revision("no-such-tag").is_err());
    }

    #[test]
    fn test_file_view() {
        let dir = TempDir::new().unwrap();
        create_test_repo(dir.path());

        let provider = GitRepositoryProvider::new();
        let repo = provider.open(dir.path()).unwrap();
        let revision = repo.resolve_revision("1.0.0").unwrap();

        let view = repo.open_file_view(&revision).unwrap();
        assert!(view.exists(Path::new("harbor.json")));
        assert!(!view.exists(Path::new("missing.json")));
        let bytes = view.read(Path::new("harbor.json")).unwrap();
        assert_eq!(bytes, br#"{ "name": "fixture" }"#);
    }

    #[test]
    fn test_checkout_and_branching() {
        let dir = TempDir::new().unwrap();
        create_test_repo(dir.path().join("origin").as_path());

        let provider = GitRepositoryProvider::new();
        let checkout_path = dir.path().join("checkout");
        provider
            .clone_checkout(&dir.path().join("origin"), &checkout_path)
            .unwrap();

        let checkout = provider.open_checkout(&checkout_path).unwrap();
        let revision = checkout.current_revision().unwrap();
        assert_eq!(revision.as_str().len(), 40);

        assert!(!checkout.has_uncommitted_changes().unwrap());
        std::fs::write(checkout_path.join("scratch.txt"), b"wip").unwrap();
        assert!(checkout.has_uncommitted_changes().unwrap());
        std::fs::remove_file(checkout_path.join("scratch.txt")).unwrap();

        checkout.checkout_new_branch("feature").unwrap();
        assert!(matches!(
            checkout.checkout_new_branch("feature"),
            Err(FetchError::BranchAlreadyExists(_))
        ));

        // Re-checking out the original revision detaches again.
        checkout.checkout(&revision).unwrap();
        assert_eq!(checkout.current_revision().unwrap(), revision);
    }

    #[test]
    #[ignore] // Requires network access
    fn test_clone_remote() {
        let dir = TempDir::new().unwrap();
        let provider = GitRepositoryProvider::new();
        let result = provider.clone_repository(
            "https://github.com/octocat/Hello-World.git",
            &dir.path().join("repo"),
        );
        assert!(result.is_ok());
    }
}
