//! Package model for Harbor.
//!
//! This crate defines how packages are named and demanded:
//! - [`PackageIdentity`]: the canonical key a package is known by
//! - [`PackageRef`]: an addressable package (local path, remote URL, registry)
//! - [`MirrorConfig`]: URL rewrites applied while resolving, undone in pins
//! - [`Requirement`] and [`Constraint`]: per-package version demands
//! - [`Manifest`] and the pluggable loader traits the core consumes

mod fs;
mod graph;
mod identity;
mod manifest;
mod mirrors;
mod reference;
mod requirement;
mod tools_version;

pub use fs::{FileView, LocalFileView};
pub use graph::{BasicGraphLoader, PackageGraph, PackageGraphLoader};
pub use identity::PackageIdentity;
pub use manifest::{
    JsonManifestLoader, JsonToolsVersionLoader, Manifest, ManifestDependency, ManifestError,
    ManifestLoader, MockManifestLoader, MockToolsVersionLoader, ToolsVersionLoader,
    MANIFEST_FILENAME,
};
pub use mirrors::MirrorConfig;
pub use reference::{PackageRef, RefKind};
pub use requirement::{Constraint, Requirement};
pub use tools_version::{ToolsVersion, ToolsVersionParseError};
