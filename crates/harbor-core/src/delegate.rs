//! Workspace progress notifications.

use harbor_fetch::RepositoryManagerDelegate;
use std::sync::Arc;

/// Fire-and-forget notifications about what the workspace is doing.
///
/// All methods default to no-ops; implementors override what they want to
/// surface. Warnings always flow through here, never as errors.
pub trait WorkspaceDelegate: Send + Sync {
    /// Resolution found repositories that are not yet present locally.
    fn fetching_missing_repositories(&self, _urls: &[String]) {}

    /// An existing clone is being updated from its origin.
    fn fetching(&self, _repository: &str) {}

    /// A repository is being cloned.
    fn cloning(&self, _repository: &str) {}

    /// A checkout is being moved to a reference (a version or revision).
    fn checking_out(&self, _repository: &str, _reference: &str) {}

    /// A no-longer-needed checkout is being removed.
    fn removing(&self, _repository: &str) {}

    /// Something non-fatal deserves the user's attention.
    fn warning(&self, _message: &str) {}
}

/// A delegate that ignores every notification.
#[derive(Debug, Default)]
pub struct NullDelegate;

impl WorkspaceDelegate for NullDelegate {}

/// Adapter forwarding repository-manager notifications to the workspace
/// delegate.
pub(crate) struct ManagerDelegateAdapter(pub Arc<dyn WorkspaceDelegate>);

impl RepositoryManagerDelegate for ManagerDelegateAdapter {
    fn cloning(&self, url: &str) {
        self.0.cloning(url);
    }

    fn fetching(&self, url: &str) {
        self.0.fetching(url);
    }
}
