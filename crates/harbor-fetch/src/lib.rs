//! Repository access for Harbor.
//!
//! This crate provides everything between the resolver and the wire:
//! - the repository abstraction ([`RepositoryProvider`], [`Repository`],
//!   [`WorkingCheckout`]) and its git implementation
//! - the [`RepositoryManager`], which owns the shared cache of bare clones
//!   and collapses concurrent fetches of the same package
//! - repository-backed [`Container`](harbor_resolver::Container)
//!   implementations lent to the resolver

mod container;
mod git;
mod manager;
mod memory;
mod provider;

pub use container::{LocalPackageContainer, RepositoryContainerProvider, RepositoryPackageContainer};
pub use git::GitRepositoryProvider;
pub use manager::{ManagedRepository, RepositoryManager, RepositoryManagerDelegate};
pub use memory::MemoryRepositoryProvider;
pub use provider::{Repository, RepositoryProvider, Revision, WorkingCheckout};

use thiserror::Error;

/// Errors that can occur while accessing repositories.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(String),

    #[error("repository '{url}' is unavailable: {detail}")]
    UnavailableRepository { url: String, detail: String },

    #[error("invalid revision: '{0}'")]
    InvalidRevision(String),

    #[error("branch already exists: '{0}'")]
    BranchAlreadyExists(String),
}
