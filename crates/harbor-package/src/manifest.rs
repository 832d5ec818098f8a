//! Package manifests and the pluggable loader interfaces.

use crate::{Constraint, FileView, MirrorConfig, PackageRef, ToolsVersion};
use harbor_semver::{Version, VersionSet};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Name of the manifest file at a package root.
pub const MANIFEST_FILENAME: &str = "harbor.json";

/// Errors raised while loading manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no manifest found for '{0}'")]
    MissingManifest(String),

    #[error("invalid manifest for '{url}': {detail}")]
    Invalid { url: String, detail: String },
}

/// A dependency declared by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDependency {
    /// Declared (pre-mirror) repository URL.
    pub url: String,
    /// Admissible versions of the dependency.
    pub versions: VersionSet,
}

/// The loaded contents of a package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Declared package name.
    pub name: String,
    /// Location this manifest was loaded for.
    pub url: String,
    /// The package version the manifest was read at, when known.
    pub version: Option<Version>,
    /// Minimum manifest-format version the manifest requires.
    pub tools_version: ToolsVersion,
    /// Declared dependencies.
    pub dependencies: Vec<ManifestDependency>,
}

impl Manifest {
    /// Map the declared dependencies into resolver constraints, deriving
    /// each child reference under the given mirror configuration.
    pub fn package_constraints(&self, mirrors: &MirrorConfig) -> Vec<Constraint> {
        self.dependencies
            .iter()
            .map(|dep| {
                Constraint::versioned(PackageRef::remote(&dep.url, mirrors), dep.versions.clone())
            })
            .collect()
    }
}

/// Loads a manifest for a package at a given revision.
///
/// Implemented outside the core; [`JsonManifestLoader`] is the stock
/// implementation for the JSON manifest format, [`MockManifestLoader`]
/// serves canned manifests in tests.
pub trait ManifestLoader: Send + Sync {
    fn load(
        &self,
        package_path: &Path,
        base_url: &str,
        version: Option<&Version>,
        fs: &dyn FileView,
    ) -> Result<Manifest, ManifestError>;
}

/// Loads the tools version a package demands.
pub trait ToolsVersionLoader: Send + Sync {
    fn load(&self, package_path: &Path, fs: &dyn FileView) -> Result<ToolsVersion, ManifestError>;
}

// Wire format of `harbor.json`.

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    name: String,
    #[serde(default)]
    version: Option<Version>,
    #[serde(rename = "toolsVersion", default)]
    tools_version: Option<ToolsVersion>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependency {
    url: String,
    /// `[from, next major)`
    #[serde(default)]
    from: Option<Version>,
    #[serde(default)]
    exact: Option<Version>,
    #[serde(default)]
    lower: Option<Version>,
    #[serde(default)]
    upper: Option<Version>,
}

impl RawDependency {
    fn into_dependency(self, manifest_url: &str) -> Result<ManifestDependency, ManifestError> {
        let versions = match (self.exact, self.from, self.lower, self.upper) {
            (Some(v), None, None, None) => VersionSet::exact(v),
            (None, Some(v), None, None) => VersionSet::upto_next_major(v),
            (None, None, Some(lower), Some(upper)) => VersionSet::range(lower, upper),
            (None, None, None, None) => VersionSet::Any,
            _ => {
                return Err(ManifestError::Invalid {
                    url: manifest_url.to_string(),
                    detail: format!(
                        "dependency '{}' must declare exactly one of 'exact', 'from' or 'lower'/'upper'",
                        self.url
                    ),
                });
            }
        };
        Ok(ManifestDependency { url: self.url, versions })
    }
}

fn read_raw_manifest(
    package_path: &Path,
    base_url: &str,
    fs: &dyn FileView,
) -> Result<RawManifest, ManifestError> {
    let manifest_path = package_path.join(MANIFEST_FILENAME);
    if !fs.exists(&manifest_path) {
        return Err(ManifestError::MissingManifest(base_url.to_string()));
    }
    let bytes = fs.read(&manifest_path)?;
    serde_json::from_slice(&bytes).map_err(|e| ManifestError::Invalid {
        url: base_url.to_string(),
        detail: e.to_string(),
    })
}

/// Manifest loader for the JSON manifest format.
#[derive(Debug, Default)]
pub struct JsonManifestLoader;

impl ManifestLoader for JsonManifestLoader {
    fn load(
        &self,
        package_path: &Path,
        base_url: &str,
        version: Option<&Version>,
        fs: &dyn FileView,
    ) -> Result<Manifest, ManifestError> {
        let raw = read_raw_manifest(package_path, base_url, fs)?;
        if raw.name.is_empty() {
            return Err(ManifestError::Invalid {
                url: base_url.to_string(),
                detail: "package name must not be empty".to_string(),
            });
        }
        let dependencies = raw
            .dependencies
            .into_iter()
            .map(|dep| dep.into_dependency(base_url))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Manifest {
            name: raw.name,
            url: base_url.to_string(),
            version: version.cloned().or(raw.version),
            tools_version: raw.tools_version.unwrap_or(ToolsVersion::MINIMUM),
            dependencies,
        })
    }
}

/// Tools-version loader for the JSON manifest format.
#[derive(Debug, Default)]
pub struct JsonToolsVersionLoader;

impl ToolsVersionLoader for JsonToolsVersionLoader {
    fn load(&self, package_path: &Path, fs: &dyn FileView) -> Result<ToolsVersion, ManifestError> {
        let raw = read_raw_manifest(package_path, "<tools-version>", fs)?;
        Ok(raw.tools_version.unwrap_or(ToolsVersion::MINIMUM))
    }
}

/// In-memory manifest loader for testing.
///
/// Manifests are keyed by `(url, version)`; a manifest registered without a
/// version answers for any version not covered by a more specific entry.
#[derive(Debug, Default)]
pub struct MockManifestLoader {
    manifests: HashMap<(String, Option<Version>), Manifest>,
}

impl MockManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manifest for `url` at `version`.
    pub fn add(&mut self, url: impl Into<String>, version: Option<Version>, manifest: Manifest) {
        self.manifests.insert((url.into(), version), manifest);
    }
}

/// A tools-version loader that always answers with a fixed version. For
/// testing.
#[derive(Debug)]
pub struct MockToolsVersionLoader(pub ToolsVersion);

impl Default for MockToolsVersionLoader {
    fn default() -> Self {
        Self(ToolsVersion::MINIMUM)
    }
}

impl ToolsVersionLoader for MockToolsVersionLoader {
    fn load(&self, _package_path: &Path, _fs: &dyn FileView) -> Result<ToolsVersion, ManifestError> {
        Ok(self.0)
    }
}

impl ManifestLoader for MockManifestLoader {
    fn load(
        &self,
        _package_path: &Path,
        base_url: &str,
        version: Option<&Version>,
        _fs: &dyn FileView,
    ) -> Result<Manifest, ManifestError> {
        self.manifests
            .get(&(base_url.to_string(), version.cloned()))
            .or_else(|| self.manifests.get(&(base_url.to_string(), None)))
            .cloned()
            .ok_or_else(|| ManifestError::MissingManifest(base_url.to_string()))
    }
}
