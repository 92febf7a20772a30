//! Profile persistence.
//!
//! One JSON file per profile under `<base>/profiles/`, with `<base>/mnt/`
//! reserved as the default parent for local mount points. The base directory
//! is passed in explicitly (default `~/.LUKS-VAULT`) so tests can point the
//! store at a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::profile::Profile;

/// Directory under the user's home that holds profiles and mount points.
pub const DEFAULT_BASE_DIR_NAME: &str = ".LUKS-VAULT";

/// Filesystem-backed store of named connection profiles.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    base: PathBuf,
}

impl ProfileStore {
    /// Opens a store rooted at `base`, creating the directory layout if
    /// absent. Safe to call repeatedly.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { base: base.into() };
        for dir in [store.profiles_dir(), store.mount_dir()] {
            fs::create_dir_all(&dir).map_err(|e| Error::StoreIo {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(store)
    }

    /// Opens the store at the default location under the home directory.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_base()?)
    }

    /// Default base directory: `~/.LUKS-VAULT`.
    pub fn default_base() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_BASE_DIR_NAME))
            .ok_or(Error::HomeDirNotFound)
    }

    /// Base directory this store is rooted at.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory holding the per-profile JSON files.
    pub fn profiles_dir(&self) -> PathBuf {
        self.base.join("profiles")
    }

    /// Default parent directory for local mount points.
    pub fn mount_dir(&self) -> PathBuf {
        self.base.join("mnt")
    }

    /// Default local mount point for a profile name.
    pub fn default_local_mount_point(&self, name: &str) -> PathBuf {
        self.mount_dir().join(name)
    }

    /// Names of all stored profiles, sorted. Empty on first run.
    pub fn list_profiles(&self) -> Result<Vec<String>> {
        let dir = self.profiles_dir();
        let entries = fs::read_dir(&dir).map_err(|e| Error::StoreIo {
            path: dir.clone(),
            source: e,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::StoreIo {
                path: dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Loads a profile by name.
    ///
    /// Fails with [`Error::NotFound`] when no file exists for the name and
    /// [`Error::Parse`] when the stored JSON is malformed, is missing a
    /// required field, or fails validation after a manual edit.
    pub fn load_profile(&self, name: &str) -> Result<Profile> {
        let path = self.profile_path(name);
        if !path.exists() {
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|e| Error::StoreIo {
            path: path.clone(),
            source: e,
        })?;

        let profile: Profile = serde_json::from_str(&raw).map_err(|e| Error::Parse {
            path: path.clone(),
            detail: e.to_string(),
        })?;

        if profile.name != name {
            return Err(Error::Parse {
                path,
                detail: format!(
                    "profile file for '{name}' declares name '{}'",
                    profile.name
                ),
            });
        }

        let issues = profile.validate();
        if !issues.is_empty() {
            return Err(Error::Parse {
                path,
                detail: issues.join("; "),
            });
        }

        Ok(profile)
    }

    /// Saves a profile, overwriting any existing one with the same name.
    pub fn save_profile(&self, profile: &Profile) -> Result<()> {
        let dir = self.profiles_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::StoreIo {
            path: dir,
            source: e,
        })?;

        let path = self.profile_path(&profile.name);
        let json = serde_json::to_string_pretty(profile).map_err(|e| Error::Parse {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        fs::write(&path, json + "\n").map_err(|e| Error::StoreIo { path, source: e })
    }

    /// Deletes a stored profile. Fails with [`Error::NotFound`] if absent.
    pub fn delete_profile(&self, name: &str) -> Result<()> {
        let path = self.profile_path(name);
        if !path.exists() {
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        }
        fs::remove_file(&path).map_err(|e| Error::StoreIo { path, source: e })
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::AuthMethod;
    use std::fs;
    use tempfile::tempdir;

    fn sample(name: &str) -> Profile {
        Profile {
            name: name.to_string(),
            host: "203.0.113.7".to_string(),
            port: 22,
            username: "admin".to_string(),
            auth: AuthMethod::KeyBased,
            remote_device: "/dev/sdb1".to_string(),
            remote_mapper_name: format!("{name}map"),
            remote_mount_point: "/mnt/encrypted".to_string(),
            local_mount_point: PathBuf::from("/tmp/mnt").join(name),
        }
    }

    #[test]
    fn test_open_creates_layout_idempotently() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        assert!(store.profiles_dir().is_dir());
        assert!(store.mount_dir().is_dir());
        // Second open over the same directory must not fail.
        ProfileStore::open(dir.path()).unwrap();
    }

    #[test]
    fn test_list_empty_on_first_run() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        assert!(store.list_profiles().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let profile = sample("vault1");
        store.save_profile(&profile).unwrap();
        let loaded = store.load_profile("vault1").unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_save_overwrites_existing() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let mut profile = sample("vault1");
        store.save_profile(&profile).unwrap();
        profile.host = "198.51.100.9".to_string();
        store.save_profile(&profile).unwrap();
        assert_eq!(store.load_profile("vault1").unwrap().host, "198.51.100.9");
        assert_eq!(store.list_profiles().unwrap(), vec!["vault1"]);
    }

    #[test]
    fn test_list_is_sorted() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        for name in ["zeta", "alpha", "mid"] {
            store.save_profile(&sample(name)).unwrap();
        }
        assert_eq!(store.list_profiles().unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_profile("ghost"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_malformed_is_parse_error() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        fs::write(store.profiles_dir().join("bad.json"), "{ not json").unwrap();
        assert!(matches!(
            store.load_profile("bad"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_required_field_is_parse_error() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        // No "host" field.
        fs::write(
            store.profiles_dir().join("partial.json"),
            r#"{"name": "partial", "username": "u", "auth": "key_based"}"#,
        )
        .unwrap();
        assert!(matches!(
            store.load_profile("partial"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_load_rejects_name_mismatch() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let profile = sample("inner");
        let json = serde_json::to_string(&profile).unwrap();
        fs::write(store.profiles_dir().join("outer.json"), json).unwrap();
        assert!(matches!(
            store.load_profile("outer"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_delete_profile() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        store.save_profile(&sample("vault1")).unwrap();
        store.delete_profile("vault1").unwrap();
        assert!(store.list_profiles().unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.delete_profile("ghost"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_default_local_mount_point() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        assert_eq!(
            store.default_local_mount_point("vault1"),
            dir.path().join("mnt").join("vault1")
        );
    }
}
