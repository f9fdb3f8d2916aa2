//! Manifest-based folder mirroring for the Hyper backend.
//!
//! Persists a SHA-256 manifest per drive at
//! `<hyper_root>/manifests/<site_id>.json` and diffs the local folder
//! against it, yielding the minimal change sequence: a `Put` for every new
//! or modified file, a `Delete` for every manifest entry missing locally.
//! Changes are produced lazily (files are hashed as the plan is consumed)
//! so the caller can log and apply them as they stream. Re-running after an
//! interruption recomputes only the remaining changes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, ProtocolError};

/// In-memory manifest: relative file path → last-mirrored SHA-256 digest.
pub type Manifest = HashMap<String, String>;

/// On-disk manifest payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestFile {
    pub synced_at: DateTime<Utc>,
    pub files: Manifest,
}

/// A single mirror operation, in apply order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorChange {
    /// Upload `source` to the drive under `key`; `digest` is its new hash.
    Put {
        key: String,
        source: PathBuf,
        digest: String,
    },
    /// Remove `key` from the drive.
    Delete { key: String },
}

impl MirrorChange {
    pub fn key(&self) -> &str {
        match self {
            MirrorChange::Put { key, .. } | MirrorChange::Delete { key } => key,
        }
    }
}

/// `<hyper_root>/manifests/<site_id>.json`
pub fn manifest_path_at(root: &Path, site_id: &str) -> PathBuf {
    root.join("manifests").join(format!("{site_id}.json"))
}

/// Load the manifest for `site_id`; empty if none exists yet.
pub fn load_at(root: &Path, site_id: &str) -> Result<ManifestFile, ProtocolError> {
    let path = manifest_path_at(root, site_id);
    if !path.exists() {
        return Ok(ManifestFile {
            synced_at: Utc::now(),
            files: HashMap::new(),
        });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save the manifest atomically (`.tmp` sibling + rename).
pub fn save_at(root: &Path, site_id: &str, manifest: &ManifestFile) -> Result<(), ProtocolError> {
    let path = manifest_path_at(root, site_id);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid manifest path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(manifest)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Lazy change sequence: local files are hashed one at a time as the plan
/// is consumed; unchanged files are skipped.
pub struct MirrorPlan {
    local: Vec<(PathBuf, String)>,
    prior: Manifest,
    deletes: Vec<String>,
    cursor: usize,
}

/// Diff the folder at `local_root` against `prior`.
pub fn plan(local_root: &Path, prior: &Manifest) -> Result<MirrorPlan, ProtocolError> {
    let local = walk_files(local_root)?;
    let local_keys: HashSet<&str> = local.iter().map(|(_, key)| key.as_str()).collect();

    let mut deletes: Vec<String> = prior
        .keys()
        .filter(|key| !local_keys.contains(key.as_str()))
        .cloned()
        .collect();
    deletes.sort();
    deletes.reverse(); // popped from the back, applied in sorted order

    Ok(MirrorPlan {
        local,
        prior: prior.clone(),
        deletes,
        cursor: 0,
    })
}

impl Iterator for MirrorPlan {
    type Item = Result<MirrorChange, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.local.len() {
            let (path, key) = self.local[self.cursor].clone();
            self.cursor += 1;

            let digest = match hash_file(&path) {
                Ok(digest) => digest,
                Err(err) => return Some(Err(err)),
            };
            if self.prior.get(&key) == Some(&digest) {
                continue; // unchanged
            }
            return Some(Ok(MirrorChange::Put {
                key,
                source: path,
                digest,
            }));
        }

        self.deletes
            .pop()
            .map(|key| Ok(MirrorChange::Delete { key }))
    }
}

fn hash_file(path: &Path) -> Result<String, ProtocolError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// `(absolute, relative)` paths of every regular file, sorted by relative
/// path. A missing root is treated as empty.
fn walk_files(root: &Path) -> Result<Vec<(PathBuf, String)>, ProtocolError> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            let ty = entry.file_type().map_err(|e| io_err(&path, e))?;
            if ty.is_dir() {
                pending.push(path);
            } else if ty.is_file() {
                let key = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                files.push((path, key));
            }
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    fn collect(plan: MirrorPlan) -> Vec<MirrorChange> {
        plan.map(|c| c.expect("change")).collect()
    }

    #[test]
    fn fresh_folder_is_all_puts() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "index.html", "<html>");
        write(dir.path(), "css/site.css", "body{}");

        let changes = collect(plan(dir.path(), &Manifest::new()).expect("plan"));
        let keys: Vec<&str> = changes.iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec!["css/site.css", "index.html"]);
        assert!(changes
            .iter()
            .all(|c| matches!(c, MirrorChange::Put { .. })));
    }

    #[test]
    fn unchanged_files_are_skipped() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "index.html", "<html>");

        let first = collect(plan(dir.path(), &Manifest::new()).expect("plan"));
        let mut manifest = Manifest::new();
        for change in &first {
            if let MirrorChange::Put { key, digest, .. } = change {
                manifest.insert(key.clone(), digest.clone());
            }
        }

        let second = collect(plan(dir.path(), &manifest).expect("plan"));
        assert!(second.is_empty(), "identical content must produce no changes");
    }

    #[test]
    fn removed_files_become_deletes_after_puts() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "kept.html", "hi");

        let mut manifest = Manifest::new();
        manifest.insert("kept.html".into(), "stale-digest".into());
        manifest.insert("gone.html".into(), "whatever".into());
        manifest.insert("also/gone.css".into(), "whatever".into());

        let changes = collect(plan(dir.path(), &manifest).expect("plan"));
        assert_eq!(changes.len(), 3);
        assert!(matches!(&changes[0], MirrorChange::Put { key, .. } if key == "kept.html"));
        assert_eq!(changes[1], MirrorChange::Delete { key: "also/gone.css".into() });
        assert_eq!(changes[2], MirrorChange::Delete { key: "gone.html".into() });
    }

    #[test]
    fn manifest_roundtrip_and_tmp_cleanup() {
        let root = TempDir::new().expect("tempdir");
        let mut files = Manifest::new();
        files.insert("index.html".into(), "deadbeef".into());
        let manifest = ManifestFile {
            synced_at: Utc::now(),
            files,
        };

        save_at(root.path(), "example.com", &manifest).expect("save");
        let loaded = load_at(root.path(), "example.com").expect("load");
        assert_eq!(loaded.files, manifest.files);

        let tmp = manifest_path_at(root.path(), "example.com").with_extension("json.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after save");
    }

    #[test]
    fn missing_manifest_loads_empty() {
        let root = TempDir::new().expect("tempdir");
        let loaded = load_at(root.path(), "nonexistent").expect("load");
        assert!(loaded.files.is_empty());
    }
}
