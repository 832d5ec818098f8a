//! The pin store (`Package.resolved`).

use crate::WorkspaceError;
use harbor_fetch::Revision;
use harbor_package::{MirrorConfig, PackageIdentity, PackageRef};
use harbor_semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default name of the pin file.
pub const PIN_FILENAME: &str = "Package.resolved";

const SCHEMA_VERSION: u32 = 1;

/// What a pin reproduces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinState {
    /// A tagged version and the revision it resolved to.
    Version(Version, Revision),
    /// A branch and the revision its tip had when pinned.
    Branch { name: String, revision: Revision },
    /// A bare revision.
    Revision(Revision),
}

impl PinState {
    pub fn revision(&self) -> &Revision {
        match self {
            PinState::Version(_, revision) => revision,
            PinState::Branch { revision, .. } => revision,
            PinState::Revision(revision) => revision,
        }
    }
}

/// One persisted pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    /// Display name of the package.
    pub name: String,
    /// The package, carrying the effective (post-mirror) location.
    pub package: PackageRef,
    pub state: PinState,
    pub reason: Option<String>,
}

/// The persistent identity → pin map.
///
/// Pins are written with their *original* (pre-mirror) URLs and re-mapped
/// through the active mirror configuration when loading, so changing
/// mirrors never invalidates the file. Saving an empty store deletes the
/// file; anything else is an atomic overwrite with pins sorted by identity.
pub struct PinStore {
    path: PathBuf,
    mirrors: MirrorConfig,
    pins: BTreeMap<PackageIdentity, Pin>,
}

impl PinStore {
    /// Load the pin file at `path`, treating a missing file as empty.
    pub fn load(path: PathBuf, mirrors: MirrorConfig) -> Result<Self, WorkspaceError> {
        let mut store = Self {
            path,
            mirrors,
            pins: BTreeMap::new(),
        };
        if !store.path.exists() {
            return Ok(store);
        }

        let contents = std::fs::read_to_string(&store.path)?;
        let value: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| WorkspaceError::CorruptPinFile(e.to_string()))?;
        if let Some(version) = value.get("version").and_then(|v| v.as_u64())
            && version != SCHEMA_VERSION as u64
        {
            return Err(WorkspaceError::CorruptPinFile(format!(
                "unsupported schema version {}",
                version
            )));
        }
        let raw: RawPinFile = serde_json::from_value(value)
            .map_err(|e| WorkspaceError::CorruptPinFile(e.to_string()))?;

        for raw_pin in raw.pins {
            let pin = raw_pin.into_pin(&store.mirrors)?;
            let identity = pin.package.identity.clone();
            if store.pins.insert(identity.clone(), pin).is_some() {
                return Err(WorkspaceError::DuplicatedPin(identity.to_string()));
            }
        }
        Ok(store)
    }

    /// Pin `package` at `state`, replacing any previous pin for its
    /// identity.
    pub fn pin(&mut self, package: PackageRef, state: PinState, reason: Option<String>) {
        let pin = Pin {
            name: package.display_name().to_string(),
            package,
            state,
            reason,
        };
        self.add(pin);
    }

    pub fn add(&mut self, pin: Pin) {
        self.pins.insert(pin.package.identity.clone(), pin);
    }

    pub fn pin_for(&self, identity: &PackageIdentity) -> Option<&Pin> {
        self.pins.get(identity)
    }

    /// All pins, sorted by identity.
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.pins.values()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn unpin_all(&mut self) {
        self.pins.clear();
    }

    /// Persist the store: delete the file when empty, otherwise overwrite
    /// it atomically.
    pub fn save(&self) -> Result<(), WorkspaceError> {
        if self.pins.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        let raw = RawPinFile {
            version: SCHEMA_VERSION,
            pins: self
                .pins
                .values()
                .map(|pin| RawPin::from_pin(pin, &self.mirrors))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&raw)?;

        let tmp = self.path.with_extension("resolved.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Wire format.

#[derive(Serialize, Deserialize)]
struct RawPinFile {
    version: u32,
    pins: Vec<RawPin>,
}

#[derive(Serialize, Deserialize)]
struct RawPin {
    package: String,
    #[serde(rename = "repositoryURL")]
    repository_url: String,
    state: RawPinState,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RawPinState {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    revision: String,
}

impl RawPin {
    fn into_pin(self, mirrors: &MirrorConfig) -> Result<Pin, WorkspaceError> {
        let revision = Revision::new(self.state.revision);
        let state = match (self.state.version, self.state.branch) {
            (Some(version), None) => PinState::Version(version, revision),
            (None, Some(name)) => PinState::Branch { name, revision },
            (None, None) => PinState::Revision(revision),
            (Some(_), Some(_)) => {
                return Err(WorkspaceError::CorruptPinFile(format!(
                    "pin for '{}' declares both a version and a branch",
                    self.package
                )));
            }
        };
        // The stored URL is pre-mirror; re-derive the effective reference.
        let package = PackageRef::remote(&self.repository_url, mirrors).with_name(&self.package);
        Ok(Pin {
            name: self.package,
            package,
            state,
            reason: self.reason,
        })
    }

    fn from_pin(pin: &Pin, mirrors: &MirrorConfig) -> Self {
        let (version, branch) = match &pin.state {
            PinState::Version(version, _) => (Some(version.clone()), None),
            PinState::Branch { name, .. } => (None, Some(name.clone())),
            PinState::Revision(_) => (None, None),
        };
        Self {
            package: pin.name.clone(),
            repository_url: mirrors.original_url(&pin.package.location),
            state: RawPinState {
                version,
                branch,
                revision: pin.state.revision().to_string(),
            },
            reason: pin.reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin_path(dir: &Path) -> PathBuf {
        dir.join(PIN_FILENAME)
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mirrors = MirrorConfig::new();

        let mut store = PinStore::load(pin_path(dir.path()), mirrors.clone()).unwrap();
        store.pin(
            PackageRef::remote("https://host/a", &mirrors).with_name("A"),
            PinState::Version(v("1.2.0"), Revision::new("aaaa")),
            None,
        );
        store.pin(
            PackageRef::remote("https://host/b", &mirrors).with_name("B"),
            PinState::Branch {
                name: "main".to_string(),
                revision: Revision::new("bbbb"),
            },
            Some("tracking main".to_string()),
        );
        store.save().unwrap();

        let reloaded = PinStore::load(pin_path(dir.path()), mirrors).unwrap();
        let pins: Vec<&Pin> = reloaded.pins().collect();
        assert_eq!(pins.len(), 2);
        assert_eq!(pins[0].name, "A");
        assert_eq!(pins[0].state, PinState::Version(v("1.2.0"), Revision::new("aaaa")));
        assert_eq!(pins[1].state.revision().as_str(), "bbbb");
        assert_eq!(pins[1].reason.as_deref(), Some("tracking main"));
    }

    #[test]
    fn test_empty_store_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mirrors = MirrorConfig::new();

        let mut store = PinStore::load(pin_path(dir.path()), mirrors.clone()).unwrap();
        store.pin(
            PackageRef::remote("https://host/a", &mirrors),
            PinState::Revision(Revision::new("aaaa")),
            None,
        );
        store.save().unwrap();
        assert!(pin_path(dir.path()).exists());

        store.unpin_all();
        store.save().unwrap();
        assert!(!pin_path(dir.path()).exists());
    }

    #[test]
    fn test_mirror_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        let mut mirrors = MirrorConfig::new();
        mirrors.set("https://host/foo.git", "https://mirror/foo.git");

        // Pin while the mirror is active: the in-memory reference points at
        // the mirror.
        let mut store = PinStore::load(pin_path(dir.path()), mirrors.clone()).unwrap();
        let package = PackageRef::remote("https://host/foo.git", &mirrors);
        assert_eq!(package.location, "https://mirror/foo.git");
        store.pin(
            package,
            PinState::Version(v("1.0.0"), Revision::new("cccc")),
            None,
        );
        store.save().unwrap();

        // The file must carry the original URL.
        let contents = std::fs::read_to_string(pin_path(dir.path())).unwrap();
        assert!(contents.contains("https://host/foo.git"));
        assert!(!contents.contains("mirror"));

        // Reloading without the mirror surfaces the original URL.
        let reloaded = PinStore::load(pin_path(dir.path()), MirrorConfig::new()).unwrap();
        let pin = reloaded.pins().next().unwrap();
        assert_eq!(pin.package.location, "https://host/foo.git");

        // Reloading with the mirror maps back to the effective URL.
        let mut active = MirrorConfig::new();
        active.set("https://host/foo.git", "https://mirror/foo.git");
        let remapped = PinStore::load(pin_path(dir.path()), active).unwrap();
        assert_eq!(
            remapped.pins().next().unwrap().package.location,
            "https://mirror/foo.git"
        );
    }

    #[test]
    fn test_duplicate_pins_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            pin_path(dir.path()),
            r#"{
                "version": 1,
                "pins": [
                    { "package": "A", "repositoryURL": "https://host/a",
                      "state": { "version": "1.0.0", "revision": "aaaa" } },
                    { "package": "A", "repositoryURL": "https://host/a.git",
                      "state": { "version": "1.1.0", "revision": "bbbb" } }
                ]
            }"#,
        )
        .unwrap();

        let result = PinStore::load(pin_path(dir.path()), MirrorConfig::new());
        assert!(matches!(result, Err(WorkspaceError::DuplicatedPin(_))));
    }

    #[test]
    fn test_unknown_schema_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(pin_path(dir.path()), r#"{ "version": 9, "pins": [] }"#).unwrap();
        let result = PinStore::load(pin_path(dir.path()), MirrorConfig::new());
        assert!(matches!(result, Err(WorkspaceError::CorruptPinFile(_))));
    }
}
