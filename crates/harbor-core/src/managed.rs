//! The workspace's record of one checked-out dependency.

use harbor_fetch::Revision;
use harbor_package::PackageRef;
use harbor_semver::Version;
use std::path::PathBuf;

/// How a managed dependency currently exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyState {
    /// A checkout under `checkouts/`, at a resolved revision (with the
    /// version it was tagged as, when resolution bound one).
    Checkout {
        version: Option<Version>,
        revision: Revision,
    },
    /// Replaced by an editable overlay under `edits/`.
    Edited,
}

/// One entry of the managed-dependency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDependency {
    pub package: PackageRef,
    /// Location of the working tree, relative to the workspace data
    /// directory.
    pub subpath: PathBuf,
    pub state: DependencyState,
    /// The checkout an edit overlays; restored by `unedit`.
    pub based_on: Option<Box<ManagedDependency>>,
}

impl ManagedDependency {
    /// A freshly resolved checkout.
    pub fn checkout(
        package: PackageRef,
        subpath: PathBuf,
        version: Option<Version>,
        revision: Revision,
    ) -> Self {
        Self {
            package,
            subpath,
            state: DependencyState::Checkout { version, revision },
            based_on: None,
        }
    }

    /// The edit-mode version of this dependency, overlaying it at
    /// `subpath`.
    pub fn editing(&self, subpath: PathBuf) -> Self {
        Self {
            package: self.package.clone(),
            subpath,
            state: DependencyState::Edited,
            based_on: Some(Box::new(self.clone())),
        }
    }

    pub fn is_edited(&self) -> bool {
        matches!(self.state, DependencyState::Edited)
    }

    /// The version resolution bound this dependency to, if any.
    pub fn current_version(&self) -> Option<&Version> {
        match &self.state {
            DependencyState::Checkout { version, .. } => version.as_ref(),
            DependencyState::Edited => None,
        }
    }

    /// The revision the checkout sits at, if not edited.
    pub fn current_revision(&self) -> Option<&Revision> {
        match &self.state {
            DependencyState::Checkout { revision, .. } => Some(revision),
            DependencyState::Edited => None,
        }
    }
}
