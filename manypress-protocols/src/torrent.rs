//! Torrent metainfo and mutable-record machinery for the BitTorrent backend.
//!
//! Builds v1 metainfo dictionaries from a local folder (single-file or
//! multi-file layout, 256 KiB pieces, SHA-1 piece hashes streamed across
//! file boundaries), computes the infohash, derives the per-site ed25519
//! keypair from a master seed, and signs BEP 46 mutable records so the
//! swarm can follow republished content under a stable public key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signer, SigningKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{io_err, ProtocolError};

/// Piece length for generated torrents. 256 KiB keeps piece counts small
/// for typical static sites while staying client-friendly.
pub const PIECE_LENGTH: usize = 256 * 1024;

const CREATED_BY: &str = "manypress";

// ---------------------------------------------------------------------------
// Bencoding
// ---------------------------------------------------------------------------

/// A bencode value. Dictionary keys are kept in a `BTreeMap` so encoding is
/// canonical (sorted) by construction, which the infohash depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bencode {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Bencode>),
    Dict(BTreeMap<Vec<u8>, Bencode>),
}

impl Bencode {
    pub fn str(value: &str) -> Self {
        Bencode::Bytes(value.as_bytes().to_vec())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Bencode::Int(n) => {
                out.extend_from_slice(format!("i{n}e").as_bytes());
            }
            Bencode::Bytes(bytes) => {
                out.extend_from_slice(format!("{}:", bytes.len()).as_bytes());
                out.extend_from_slice(bytes);
            }
            Bencode::List(items) => {
                out.push(b'l');
                for item in items {
                    item.encode_into(out);
                }
                out.push(b'e');
            }
            Bencode::Dict(entries) => {
                out.push(b'd');
                for (key, value) in entries {
                    out.extend_from_slice(format!("{}:", key.len()).as_bytes());
                    out.extend_from_slice(key);
                    value.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Metainfo
// ---------------------------------------------------------------------------

/// A built torrent: the full metainfo dictionary plus the infohash of its
/// `info` dictionary.
#[derive(Debug, Clone)]
pub struct Metainfo {
    pub metainfo: Bencode,
    pub info_hash: [u8; 20],
}

impl Metainfo {
    pub fn encode(&self) -> Vec<u8> {
        self.metainfo.encode()
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

/// Build v1 metainfo for the content under `folder`, named `name`.
/// Returns `None` when the folder holds no regular files.
pub fn build_metainfo(folder: &Path, name: &str) -> Result<Option<Metainfo>, ProtocolError> {
    let files = walk_files(folder)?;
    if files.is_empty() {
        return Ok(None);
    }

    // Pieces run across file boundaries in file order.
    let mut pieces: Vec<u8> = Vec::new();
    let mut hasher = Sha1::new();
    let mut filled = 0usize;
    let mut lengths = Vec::with_capacity(files.len());

    for (abs, _) in &files {
        let bytes = std::fs::read(abs).map_err(|e| io_err(abs, e))?;
        lengths.push(bytes.len() as i64);
        let mut rest = bytes.as_slice();
        while !rest.is_empty() {
            let take = (PIECE_LENGTH - filled).min(rest.len());
            hasher.update(&rest[..take]);
            filled += take;
            rest = &rest[take..];
            if filled == PIECE_LENGTH {
                pieces.extend_from_slice(&hasher.finalize_reset());
                filled = 0;
            }
        }
    }
    if filled > 0 {
        pieces.extend_from_slice(&hasher.finalize_reset());
    }

    let mut info = BTreeMap::new();
    info.insert(b"name".to_vec(), Bencode::str(name));
    info.insert(b"piece length".to_vec(), Bencode::Int(PIECE_LENGTH as i64));
    info.insert(b"pieces".to_vec(), Bencode::Bytes(pieces));

    if files.len() == 1 && files[0].1.len() == 1 {
        // Single top-level file: single-file layout.
        info.insert(b"length".to_vec(), Bencode::Int(lengths[0]));
    } else {
        let entries = files
            .iter()
            .zip(&lengths)
            .map(|((_, rel), len)| {
                let mut entry = BTreeMap::new();
                entry.insert(b"length".to_vec(), Bencode::Int(*len));
                entry.insert(
                    b"path".to_vec(),
                    Bencode::List(rel.iter().map(|part| Bencode::str(part)).collect()),
                );
                Bencode::Dict(entry)
            })
            .collect();
        info.insert(b"files".to_vec(), Bencode::List(entries));
    }

    let info = Bencode::Dict(info);
    let info_hash: [u8; 20] = Sha1::digest(info.encode()).into();

    let mut metainfo = BTreeMap::new();
    metainfo.insert(b"comment".to_vec(), Bencode::str(&format!("Content for bittorrent://{name}/")));
    metainfo.insert(b"created by".to_vec(), Bencode::str(CREATED_BY));
    metainfo.insert(b"info".to_vec(), info);

    Ok(Some(Metainfo {
        metainfo: Bencode::Dict(metainfo),
        info_hash,
    }))
}

/// `(absolute, relative-components)` for every regular file, sorted by
/// relative path. A missing folder is treated as empty.
fn walk_files(folder: &Path) -> Result<Vec<(PathBuf, Vec<String>)>, ProtocolError> {
    let mut files = Vec::new();
    if !folder.exists() {
        return Ok(files);
    }

    let mut pending = vec![folder.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            let ty = entry.file_type().map_err(|e| io_err(&path, e))?;
            if ty.is_dir() {
                pending.push(path);
            } else if ty.is_file() {
                let rel: Vec<String> = path
                    .strip_prefix(folder)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push((path, rel));
            }
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

// ---------------------------------------------------------------------------
// Keys and mutable records (BEP 44 / BEP 46)
// ---------------------------------------------------------------------------

/// Deterministically derive the signing key for `site_id` from the master
/// seed: `SHA-256(seed || site_id)` is the ed25519 secret.
pub fn derive_site_key(master_seed: &[u8], site_id: &str) -> SigningKey {
    let mut hasher = Sha256::new();
    hasher.update(master_seed);
    hasher.update(site_id.as_bytes());
    let secret: [u8; 32] = hasher.finalize().into();
    SigningKey::from_bytes(&secret)
}

/// A signed BEP 44 mutable record pointing at a torrent infohash.
#[derive(Debug, Clone)]
pub struct MutableRecord {
    pub public_key: [u8; 32],
    pub seq: i64,
    /// Bencoded `{"ih": <20-byte infohash>}`.
    pub value: Vec<u8>,
    pub signature: [u8; 64],
}

impl MutableRecord {
    /// Sign a record for `seq` pointing at `info_hash`.
    pub fn sign(key: &SigningKey, seq: i64, info_hash: &[u8; 20]) -> Self {
        let mut dict = BTreeMap::new();
        dict.insert(b"ih".to_vec(), Bencode::Bytes(info_hash.to_vec()));
        let value = Bencode::Dict(dict).encode();

        // BEP 44 signs the bencoded fragment `3:seqi<seq>e1:v<value>`
        // without a salt.
        let mut payload = format!("3:seqi{seq}e1:v").into_bytes();
        payload.extend_from_slice(&value);
        let signature = key.sign(&payload).to_bytes();

        Self {
            public_key: key.verifying_key().to_bytes(),
            seq,
            value,
            signature,
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    pub fn signature_hex(&self) -> String {
        hex::encode(self.signature)
    }
}

/// BEP 46 magnet link for a mutable torrent.
pub fn magnet_link(info_hash: &[u8; 20], public_key: &[u8; 32]) -> String {
    format!(
        "magnet:?xt=urn:btih:{}&xs=urn:btpk:{}",
        hex::encode(info_hash),
        hex::encode(public_key)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    #[test]
    fn bencode_primitives() {
        assert_eq!(Bencode::Int(42).encode(), b"i42e");
        assert_eq!(Bencode::Int(-7).encode(), b"i-7e");
        assert_eq!(Bencode::str("spam").encode(), b"4:spam");
        assert_eq!(
            Bencode::List(vec![Bencode::str("a"), Bencode::Int(1)]).encode(),
            b"l1:ai1ee"
        );
    }

    #[test]
    fn bencode_dict_keys_are_sorted() {
        let mut dict = BTreeMap::new();
        dict.insert(b"zz".to_vec(), Bencode::Int(2));
        dict.insert(b"aa".to_vec(), Bencode::Int(1));
        assert_eq!(Bencode::Dict(dict).encode(), b"d2:aai1e2:zzi2ee");
    }

    #[test]
    fn empty_folder_builds_no_metainfo() {
        let dir = TempDir::new().expect("tempdir");
        assert!(build_metainfo(dir.path(), "example.com")
            .expect("build")
            .is_none());
    }

    #[test]
    fn single_file_layout() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "index.html", b"<html>");

        let torrent = build_metainfo(dir.path(), "example.com")
            .expect("build")
            .expect("some");
        let encoded = torrent.encode();
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("6:lengthi6e"), "single-file length: {text}");
        assert!(!text.contains("5:files"), "no files list for one file");
        assert!(text.contains("4:name11:example.com"));
    }

    #[test]
    fn multi_file_layout_and_piece_count() {
        let dir = TempDir::new().expect("tempdir");
        // Two files spanning one piece boundary: 256 KiB + 10 bytes.
        write(dir.path(), "big.bin", &vec![0xabu8; PIECE_LENGTH]);
        write(dir.path(), "css/site.css", b"body {}\n\n");

        let torrent = build_metainfo(dir.path(), "example.com")
            .expect("build")
            .expect("some");
        let encoded = torrent.encode();
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("5:files"));
        // 256 KiB + 9 bytes → 2 pieces → 40 bytes of hashes.
        assert!(text.contains("6:pieces40:"), "piece hashes: {text}");
    }

    #[test]
    fn infohash_is_stable_for_identical_content() {
        let a = TempDir::new().expect("tempdir");
        let b = TempDir::new().expect("tempdir");
        write(a.path(), "index.html", b"<html>");
        write(b.path(), "index.html", b"<html>");

        let ta = build_metainfo(a.path(), "example.com").unwrap().unwrap();
        let tb = build_metainfo(b.path(), "example.com").unwrap().unwrap();
        assert_eq!(ta.info_hash, tb.info_hash);
    }

    #[test]
    fn derived_keys_are_deterministic_and_distinct() {
        let seed = [7u8; 32];
        let a1 = derive_site_key(&seed, "a.example.com");
        let a2 = derive_site_key(&seed, "a.example.com");
        let b = derive_site_key(&seed, "b.example.com");
        assert_eq!(a1.to_bytes(), a2.to_bytes());
        assert_ne!(a1.to_bytes(), b.to_bytes());
    }

    #[test]
    fn mutable_record_signature_verifies() {
        let key = derive_site_key(&[1u8; 32], "example.com");
        let info_hash = [0x42u8; 20];
        let record = MutableRecord::sign(&key, 3, &info_hash);

        let mut payload = b"3:seqi3e1:v".to_vec();
        payload.extend_from_slice(&record.value);
        let signature = ed25519_dalek::Signature::from_bytes(&record.signature);
        key.verifying_key()
            .verify(&payload, &signature)
            .expect("valid signature");
        assert_eq!(record.value, {
            let mut dict = BTreeMap::new();
            dict.insert(b"ih".to_vec(), Bencode::Bytes(info_hash.to_vec()));
            Bencode::Dict(dict).encode()
        });
    }

    #[test]
    fn magnet_link_format() {
        let link = magnet_link(&[0u8; 20], &[0xffu8; 32]);
        assert_eq!(
            link,
            format!(
                "magnet:?xt=urn:btih:{}&xs=urn:btpk:{}",
                "00".repeat(20),
                "ff".repeat(32)
            )
        );
    }
}
