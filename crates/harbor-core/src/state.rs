//! The `workspace-state.json` document.

use crate::{DependencyState, ManagedDependency, WorkspaceError};
use harbor_fetch::Revision;
use harbor_package::{MirrorConfig, PackageIdentity, PackageRef};
use harbor_semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the state file inside the workspace data directory.
pub const STATE_FILENAME: &str = "workspace-state.json";

const SCHEMA_VERSION: u32 = 1;

/// The persistent managed-dependency table.
///
/// Schema version 1. A missing file is an empty table; a file with an
/// unknown schema version is discarded (the next `load_package_graph`
/// rebuilds the state from scratch); anything else malformed is a
/// [`WorkspaceError::CorruptStateFile`].
pub struct WorkspaceState {
    path: PathBuf,
    dependencies: BTreeMap<PackageIdentity, ManagedDependency>,
}

impl WorkspaceState {
    /// Load the state file at `path`.
    pub fn load(path: PathBuf, mirrors: &MirrorConfig) -> Result<Self, WorkspaceError> {
        if !path.exists() {
            return Ok(Self {
                path,
                dependencies: BTreeMap::new(),
            });
        }

        let contents = std::fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| WorkspaceError::CorruptStateFile(e.to_string()))?;

        // Unknown schema versions are discarded wholesale; the workspace
        // self-repairs on the next load.
        let mut dependencies = BTreeMap::new();
        if value.get("version").and_then(|v| v.as_u64()) == Some(SCHEMA_VERSION as u64) {
            let raw: RawState = serde_json::from_value(value)
                .map_err(|e| WorkspaceError::CorruptStateFile(e.to_string()))?;
            for raw_dep in raw.dependencies {
                let dependency = raw_dep.into_managed(mirrors)?;
                dependencies.insert(dependency.package.identity.clone(), dependency);
            }
        }

        Ok(Self { path, dependencies })
    }

    /// Write the state file atomically.
    pub fn save(&self) -> Result<(), WorkspaceError> {
        let raw = RawState {
            version: SCHEMA_VERSION,
            dependencies: self.dependencies.values().map(RawDependency::from).collect(),
        };
        let json = serde_json::to_string_pretty(&raw)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<&ManagedDependency> {
        self.dependencies.get(identity)
    }

    pub fn insert(&mut self, dependency: ManagedDependency) {
        self.dependencies
            .insert(dependency.package.identity.clone(), dependency);
    }

    pub fn remove(&mut self, identity: &PackageIdentity) -> Option<ManagedDependency> {
        self.dependencies.remove(identity)
    }

    pub fn dependencies(&self) -> &BTreeMap<PackageIdentity, ManagedDependency> {
        &self.dependencies
    }

    pub fn clear(&mut self) {
        self.dependencies.clear();
    }
}

// Wire format, spec'd field names.

#[derive(Serialize, Deserialize)]
struct RawState {
    version: u32,
    dependencies: Vec<RawDependency>,
}

#[derive(Serialize, Deserialize)]
struct RawDependency {
    #[serde(rename = "repositoryURL")]
    repository_url: String,
    subpath: String,
    #[serde(rename = "currentVersion")]
    current_version: Option<Version>,
    #[serde(rename = "currentRevision")]
    current_revision: Option<String>,
    #[serde(rename = "basedOn")]
    based_on: Option<Box<RawDependency>>,
}

impl RawDependency {
    fn into_managed(self, mirrors: &MirrorConfig) -> Result<ManagedDependency, WorkspaceError> {
        let package = PackageRef::remote(&self.repository_url, mirrors);
        let based_on = match self.based_on {
            Some(underlying) => Some(Box::new(underlying.into_managed(mirrors)?)),
            None => None,
        };
        let state = if based_on.is_some() {
            DependencyState::Edited
        } else {
            let revision = self.current_revision.ok_or_else(|| {
                WorkspaceError::CorruptStateFile(format!(
                    "dependency '{}' has neither a revision nor an edit overlay",
                    self.repository_url
                ))
            })?;
            DependencyState::Checkout {
                version: self.current_version,
                revision: Revision::new(revision),
            }
        };
        Ok(ManagedDependency {
            package,
            subpath: PathBuf::from(self.subpath),
            state,
            based_on,
        })
    }
}

impl From<&ManagedDependency> for RawDependency {
    fn from(dependency: &ManagedDependency) -> Self {
        let (current_version, current_revision) = match &dependency.state {
            DependencyState::Checkout { version, revision } => {
                (version.clone(), Some(revision.to_string()))
            }
            DependencyState::Edited => (None, None),
        };
        Self {
            repository_url: dependency.package.location.clone(),
            subpath: dependency.subpath.to_string_lossy().into_owned(),
            current_version,
            current_revision,
            based_on: dependency
                .based_on
                .as_deref()
                .map(|underlying| Box::new(RawDependency::from(underlying))),
        }
    }
}
