//! Dependency resolution for Harbor.
//!
//! The resolver takes a list of input [`Constraint`]s and searches for an
//! assignment of every transitively referenced package to a bound version.
//! The search is depth-first and newest-first: at every decision point the
//! newest admissible version of the package under consideration is tried
//! before any older one, and the solver only backtracks on failure. Given a
//! fixed input and fixed containers, the first emitted assignment is fully
//! deterministic.
//!
//! Containers are lent to the resolver by a [`ContainerProvider`]; they load
//! version lists and per-version dependencies lazily and may perform I/O.
//! I/O failures inside the walk are recorded rather than raised: the solver
//! prefers a solution when one exists and only surfaces the first recorded
//! error after exhausting the search.
//!
//! [`Constraint`]: harbor_package::Constraint

mod assignment;
mod constraint_set;
mod container;
mod memory;
mod resolver;

pub use assignment::{AssignmentSet, BoundVersion};
pub use constraint_set::ConstraintSet;
pub use container::{Container, ContainerProvider};
pub use memory::{MemoryContainer, MemoryContainerProvider};
pub use resolver::{ResolvedPackage, Resolver};

use harbor_package::{PackageIdentity, Requirement};
use thiserror::Error;

/// Errors surfaced by resolution.
///
/// The enum is `Clone` so the first error recorded during a lazy walk can be
/// stashed and re-surfaced once the walk is exhausted.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No complete valid assignment exists.
    #[error("dependency graph cannot be resolved")]
    Unsatisfiable,

    /// A conflict among the input constraints, detected before the search
    /// starts.
    #[error("requirement '{requirement}' on package '{identity}' cannot be satisfied")]
    UnsatisfiableRequirement {
        identity: PackageIdentity,
        requirement: Requirement,
    },

    /// The container for a package could not be obtained.
    #[error("repository for package '{identity}' is unavailable: {detail}")]
    UnavailableContainer {
        identity: PackageIdentity,
        detail: String,
    },

    /// Loading the dependencies of one version of one package failed.
    #[error("failed to load dependencies of '{repository}' at '{reference}': {detail}")]
    DependencyLoad {
        repository: String,
        reference: String,
        detail: String,
        /// A hint for the user, e.g. which manifest to fix.
        suggestion: Option<String>,
    },
}
