// src/store/directory.rs

//! Directory-backed packet store
//!
//! Packets live under `root/ab/cdef...` where `abcdef...` is the hex
//! content digest; the two-character fan-out keeps directories small.
//! Writes go to a temp file and rename into place, so a crash never leaves
//! a half-written packet at its final path. Reads re-hash the decoded
//! packet and refuse to return bytes that no longer match their address.

use crate::digest::Digest;
use crate::name::Name;
use crate::packet::Packet;
use crate::store::{PacketStore, StoreError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Content-addressed packet storage in a local directory.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn packet_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// All digests currently stored, reconstructed from the fan-out paths.
    pub fn list(&self) -> Result<Vec<Digest>, StoreError> {
        let mut digests = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let (Some(prefix), Some(suffix)) = (
                entry.path().parent().and_then(|p| p.file_name()),
                entry.path().file_name(),
            ) else {
                continue;
            };
            let hex = format!("{}{}", prefix.to_string_lossy(), suffix.to_string_lossy());
            if let Ok(digest) = Digest::from_hex(Default::default(), &hex) {
                digests.push(digest);
            }
        }
        Ok(digests)
    }
}

impl PacketStore for DirectoryStore {
    fn get(&self, _name: Option<&Name>, digest: &Digest) -> Result<Packet, StoreError> {
        let path = self.packet_path(digest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::not_found(digest))
            }
            Err(e) => return Err(e.into()),
        };
        let packet = Packet::decode(&bytes)?;
        if packet.digest() != digest {
            return Err(StoreError::DigestMismatch {
                expected: digest.to_string(),
                found: packet.digest().to_string(),
            });
        }
        Ok(packet)
    }

    fn put(&mut self, packet: &Packet) -> Result<bool, StoreError> {
        let path = self.packet_path(packet.digest());
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(packet.wire_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        debug!(digest = %packet.digest().short_hex(), bytes = packet.wire_len(), "stored packet");
        Ok(true)
    }

    fn contains(&self, digest: &Digest) -> bool {
        self.packet_path(digest).exists()
    }

    fn len(&self) -> usize {
        self.list().map(|d| d.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();

        let packet = Packet::data(None, b"chunk bytes".to_vec()).unwrap();
        assert!(store.put(&packet).unwrap());
        assert!(!store.put(&packet).unwrap());
        assert!(store.contains(packet.digest()));

        let back = store.get(None, packet.digest()).unwrap();
        assert_eq!(back, packet);
    }

    #[test]
    fn fan_out_layout() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();

        let packet = Packet::data(None, b"x".to_vec()).unwrap();
        store.put(&packet).unwrap();

        let hex = packet.digest().to_hex();
        assert!(dir.path().join(&hex[..2]).join(&hex[2..]).is_file());
    }

    #[test]
    fn list_reconstructs_digests() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();

        let a = Packet::data(None, b"a".to_vec()).unwrap();
        let b = Packet::data(None, b"b".to_vec()).unwrap();
        store.put(&a).unwrap();
        store.put(&b).unwrap();

        let mut listed = store.list().unwrap();
        listed.sort();
        let mut expected = vec![a.digest().clone(), b.digest().clone()];
        expected.sort();
        assert_eq!(listed, expected);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn corrupted_packet_refused() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();

        let packet = Packet::data(None, b"pristine".to_vec()).unwrap();
        store.put(&packet).unwrap();

        // Replace the stored bytes with a different valid packet.
        let other = Packet::data(None, b"swapped".to_vec()).unwrap();
        let hex = packet.digest().to_hex();
        fs::write(
            dir.path().join(&hex[..2]).join(&hex[2..]),
            other.wire_bytes(),
        )
        .unwrap();

        assert!(matches!(
            store.get(None, packet.digest()).unwrap_err(),
            StoreError::DigestMismatch { .. }
        ));
    }

    #[test]
    fn missing_packet_not_found() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get(None, &Digest::sha256_of(b"nope")).unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
