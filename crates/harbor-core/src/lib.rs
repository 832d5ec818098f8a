//! Workspace management for Harbor.
//!
//! The [`Workspace`] is the stateful coordinator on top of the resolver and
//! the repository layer: it loads root manifests, computes constraints,
//! drives resolution, performs clones, checkouts and removals, maintains
//! editable overlays, and persists its state in two documents:
//! `workspace-state.json` (the managed-dependency table) and the pin file
//! (`Package.resolved`).

mod changes;
mod delegate;
mod managed;
mod pins;
mod state;
mod workspace;

pub use changes::{compute_package_state_changes, PackageChange, PackageStateChange};
pub use delegate::{NullDelegate, WorkspaceDelegate};
pub use managed::{DependencyState, ManagedDependency};
pub use pins::{Pin, PinState, PinStore, PIN_FILENAME};
pub use state::{WorkspaceState, STATE_FILENAME};
pub use workspace::{Workspace, WorkspaceConfig};

use harbor_fetch::FetchError;
use harbor_package::{ManifestError, ToolsVersion};
use harbor_resolver::ResolveError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no packages are registered")]
    NoRegisteredPackages,

    #[error("path is not registered: {0}")]
    PathNotRegistered(PathBuf),

    #[error("dependency '{0}' is not present in the workspace")]
    UnknownDependency(String),

    #[error("dependency '{0}' is already in edit mode")]
    DependencyAlreadyInEditMode(String),

    #[error("dependency '{0}' is not in edit mode")]
    DependencyNotInEditMode(String),

    #[error("branch already exists: '{0}'")]
    BranchAlreadyExists(String),

    #[error("the checkout at '{0}' has uncommitted changes")]
    HasUncommittedChanges(PathBuf),

    #[error("the checkout at '{0}' has unpushed commits")]
    HasUnpushedCommits(PathBuf),

    #[error("package at '{path}' requires tools version {required}, current is {current}")]
    IncompatibleToolsVersion {
        path: String,
        required: ToolsVersion,
        current: ToolsVersion,
    },

    #[error("corrupt pin file: {0}")]
    CorruptPinFile(String),

    #[error("duplicated pin for package '{0}'")]
    DuplicatedPin(String),

    #[error("corrupt state file: {0}")]
    CorruptStateFile(String),

    #[error("internal inconsistency: {0}")]
    Internal(String),
}
