// src/store/memory.rs

//! In-memory packet store, primarily for tests and small trees.

use crate::digest::Digest;
use crate::name::Name;
use crate::packet::Packet;
use crate::store::{PacketStore, StoreError};
use std::collections::HashMap;

/// Packets held in a map keyed by content digest.
#[derive(Debug, Default)]
pub struct MemoryStore {
    packets: HashMap<Digest, Packet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate over all stored packets in no particular order.
    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.packets.values()
    }
}

impl PacketStore for MemoryStore {
    fn get(&self, _name: Option<&Name>, digest: &Digest) -> Result<Packet, StoreError> {
        self.packets
            .get(digest)
            .cloned()
            .ok_or_else(|| StoreError::not_found(digest))
    }

    fn put(&mut self, packet: &Packet) -> Result<bool, StoreError> {
        Ok(self
            .packets
            .insert(packet.digest().clone(), packet.clone())
            .is_none())
    }

    fn contains(&self, digest: &Digest) -> bool {
        self.packets.contains_key(digest)
    }

    fn len(&self) -> usize {
        self.packets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let mut store = MemoryStore::new();
        let packet = Packet::data(None, b"payload".to_vec()).unwrap();

        assert!(store.put(&packet).unwrap());
        assert!(!store.put(&packet).unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.contains(packet.digest()));

        let back = store.get(None, packet.digest()).unwrap();
        assert_eq!(back, packet);
    }

    #[test]
    fn missing_digest_is_not_found() {
        let store = MemoryStore::new();
        let digest = Digest::sha256_of(b"absent");
        assert!(matches!(
            store.get(None, &digest).unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
