//! Flat-file JSON collection store.
//!
//! # Storage layout
//!
//! ```text
//! <data_root>/
//!   sites/
//!     <domain>.json     (one record per key — mode 0600)
//!   publishers/ …       (same layout; instantiated by the API layer)
//! ```
//!
//! One [`Collection`] per named sub-collection, exposing get / put / del /
//! keys. Writes are atomic: serialize → `.json.tmp` sibling → rename. The
//! `.tmp` lives in the same directory as the target (same filesystem — no
//! EXDEV surprises).

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, StoreError};

/// A named sub-collection of JSON records keyed by string.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    dir: PathBuf,
    _record: PhantomData<T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open (creating if needed) `<data_root>/<name>/`.
    pub fn open(data_root: &Path, name: &str) -> Result<Self, StoreError> {
        let dir = data_root.join(name);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            set_dir_permissions(&dir)?;
        }
        Ok(Self {
            dir,
            _record: PhantomData,
        })
    }

    /// `<data_root>/<name>/<key>.json` — pure, no I/O.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load the record stored under `key`.
    ///
    /// Returns [`StoreError::NotFound`] if absent,
    /// [`StoreError::Parse`] (with path context) if malformed JSON.
    pub fn get(&self, key: &str) -> Result<T, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(StoreError::NotFound {
                key: key.to_owned(),
            });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
    }

    /// Atomically store `record` under `key`.
    pub fn put(&self, key: &str, record: &T) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Remove the record under `key`. Removing a missing key is not an error.
    pub fn del(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = std::fs::read_dir(&self.dir)
            .map_err(|e| io_err(&self.dir, e))?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(str::to_owned)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u32,
    }

    fn rec(name: &str, count: u32) -> Record {
        Record {
            name: name.to_owned(),
            count,
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let root = TempDir::new().expect("tempdir");
        let sites: Collection<Record> = Collection::open(root.path(), "sites").expect("open");
        sites.put("example.com", &rec("example", 2)).expect("put");
        let loaded = sites.get("example.com").expect("get");
        assert_eq!(loaded, rec("example", 2));
    }

    #[test]
    fn get_missing_returns_not_found() {
        let root = TempDir::new().expect("tempdir");
        let sites: Collection<Record> = Collection::open(root.path(), "sites").expect("open");
        let err = sites.get("nope.com").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn del_is_idempotent() {
        let root = TempDir::new().expect("tempdir");
        let sites: Collection<Record> = Collection::open(root.path(), "sites").expect("open");
        sites.put("example.com", &rec("example", 1)).expect("put");
        sites.del("example.com").expect("del");
        sites.del("example.com").expect("del again");
        assert!(sites.keys().expect("keys").is_empty());
    }

    #[test]
    fn keys_are_sorted_and_stripped() {
        let root = TempDir::new().expect("tempdir");
        let sites: Collection<Record> = Collection::open(root.path(), "sites").expect("open");
        for key in ["zeta.com", "alpha.com", "mid.org"] {
            sites.put(key, &rec(key, 0)).expect("put");
        }
        assert_eq!(
            sites.keys().expect("keys"),
            vec!["alpha.com", "mid.org", "zeta.com"]
        );
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let root = TempDir::new().expect("tempdir");
        let sites: Collection<Record> = Collection::open(root.path(), "sites").expect("open");
        sites.put("example.com", &rec("example", 1)).expect("put");
        let tmp = sites.path_for("example.com").with_extension("json.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn overwrite_replaces_record() {
        let root = TempDir::new().expect("tempdir");
        let sites: Collection<Record> = Collection::open(root.path(), "sites").expect("open");
        sites.put("example.com", &rec("first", 1)).expect("put");
        sites.put("example.com", &rec("second", 2)).expect("put");
        assert_eq!(sites.get("example.com").expect("get"), rec("second", 2));
    }
}
