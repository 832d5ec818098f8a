//! Read-only file views.

use std::io;
use std::path::{Path, PathBuf};

/// A read-only view of a file tree.
///
/// Manifest and tools-version loaders read through this trait so that they
/// work identically against a checked-out directory, a bare repository
/// pinned at a revision, or an in-memory tree in tests.
pub trait FileView: Send + Sync {
    /// Read the file at `path`, relative to the view's root.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Whether `path` exists in the view.
    fn exists(&self, path: &Path) -> bool;
}

/// A file view over a local directory.
pub struct LocalFileView {
    root: PathBuf,
}

impl LocalFileView {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileView for LocalFileView {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.root.join(path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_view() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), b"contents").unwrap();

        let view = LocalFileView::new(dir.path());
        assert!(view.exists(Path::new("file.txt")));
        assert!(!view.exists(Path::new("missing.txt")));
        assert_eq!(view.read(Path::new("file.txt")).unwrap(), b"contents");
    }
}
