// src/store/mod.rs

//! Packet stores
//!
//! The builder writes packets through a [`PacketStore`] and the traversal
//! engine reads them back. Both provided stores are content-addressed: the
//! digest is the lookup key and a request's name is advisory. Network
//! backends with real name-based retrieval live outside this crate behind
//! the same trait.

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use crate::digest::Digest;
use crate::name::Name;
use crate::packet::Packet;
use crate::tlv::CodecError;
use thiserror::Error;

/// Errors from packet storage and retrieval.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("packet {digest} not found")]
    NotFound { digest: String },

    #[error("stored packet hashes to {found}, expected {expected}")]
    DigestMismatch { expected: String, found: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn not_found(digest: &Digest) -> Self {
        Self::NotFound {
            digest: digest.to_string(),
        }
    }
}

/// Read/write access to packets by content digest.
pub trait PacketStore {
    /// Fetch the packet addressed by `digest`. The optional `name` is the
    /// retrieval name derived by the active naming scheme; stores that
    /// only understand digests may ignore it.
    fn get(&self, name: Option<&Name>, digest: &Digest) -> Result<Packet, StoreError>;

    /// Store a packet. Returns `false` if the digest was already present.
    fn put(&mut self, packet: &Packet) -> Result<bool, StoreError>;

    fn contains(&self, digest: &Digest) -> bool;

    /// Number of packets held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
