// src/traverse/mod.rs

//! Traversal: reconstructing a stream from its root manifest
//!
//! The engine walks the tree in preorder from an already-fetched root
//! packet, resolving every pointer through the packet store, decrypting
//! encrypted nodes through the key store, and appending data payloads to
//! the output sink. Because pointers were recorded in preorder and data
//! groups precede indirect groups, the concatenated payloads reproduce the
//! source stream exactly.
//!
//! Any failure — a pointer the store cannot resolve, a validation
//! failure, a bad tag, missing key material — aborts the whole traversal.
//! There is no partial or best-effort output.

use crate::crypto::{CryptoError, KeyStore, NodeDecryptor, Verifier};
use crate::digest::{Digest, StreamDigester};
use crate::manifest::{
    ConstructorTable, Manifest, ManifestBody, Node, SecurityCtx, DEFAULT_NC_ID,
};
use crate::packet::{Packet, PayloadType};
use crate::store::PacketStore;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, trace};

/// Traversal-specific failures.
#[derive(Error, Debug)]
pub enum TraverseError {
    #[error("manifest is encrypted but no key store was provided")]
    NoKeyStore,

    #[error("reconstructed stream is {got} bytes, root manifest says {expected}")]
    SizeMismatch { expected: u64, got: u64 },

    #[error("reconstructed stream digest does not match the root manifest")]
    DigestMismatch,

    #[error("I/O error writing reconstructed data: {0}")]
    Sink(#[from] std::io::Error),
}

/// Checks every fetched packet before it is interpreted.
pub trait PacketValidator {
    fn validate(&self, packet: &Packet) -> crate::Result<()>;
}

/// Validates packet signatures/checksums through a [`Verifier`].
///
/// With `require` set, an unsigned packet is itself a failure; otherwise
/// unsigned packets pass (their content addressing already pinned them).
pub struct SignatureValidator<'a> {
    verifier: &'a dyn Verifier,
    require: bool,
}

impl<'a> SignatureValidator<'a> {
    pub fn new(verifier: &'a dyn Verifier) -> Self {
        Self {
            verifier,
            require: false,
        }
    }

    pub fn require_signatures(mut self) -> Self {
        self.require = true;
        self
    }
}

impl PacketValidator for SignatureValidator<'_> {
    fn validate(&self, packet: &Packet) -> crate::Result<()> {
        match packet.validation() {
            Some((alg, payload)) => {
                self.verifier
                    .verify(packet.signed_bytes(), alg, payload)
                    .map_err(Into::into)
            }
            None if self.require => Err(CryptoError::NotSigned.into()),
            None => Ok(()),
        }
    }
}

/// What a completed traversal reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalSummary {
    /// Every packet visited, manifests included.
    pub packets_visited: u64,
    /// Payload bytes written to the sink.
    pub bytes_written: u64,
}

/// Cache key for the last-used decryptor: context kind, key number, key id.
type MemoKey = (u8, u64, Option<Digest>);

fn memo_key(ctx: &SecurityCtx) -> MemoKey {
    match ctx {
        SecurityCtx::Aead(aead) => (0, aead.key_number, None),
        SecurityCtx::RsaOaep(oaep) => (1, 0, Some(oaep.key_id.clone())),
    }
}

/// Preorder tree walker.
pub struct Traverser<'a> {
    store: &'a dyn PacketStore,
    keys: Option<&'a KeyStore>,
    validator: Option<&'a dyn PacketValidator>,
    visited: u64,
    /// Last-used decryptor, keyed by (algorithm, key id, key number).
    memo: Option<(MemoKey, Box<dyn NodeDecryptor>)>,
    /// Stream size and digest promised by the root manifest, when present.
    expected: Option<(Option<u64>, Option<Digest>)>,
}

impl<'a> Traverser<'a> {
    pub fn new(store: &'a dyn PacketStore) -> Self {
        Self {
            store,
            keys: None,
            validator: None,
            visited: 0,
            memo: None,
            expected: None,
        }
    }

    /// Provide key material for encrypted manifests.
    pub fn with_keys(mut self, keys: &'a KeyStore) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Run `validator` on every fetched packet.
    pub fn with_validator(mut self, validator: &'a dyn PacketValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Packets visited so far; a running total usable mid-traversal.
    #[inline]
    pub fn visited(&self) -> u64 {
        self.visited
    }

    /// Walk the tree under `root`, writing reconstructed payload bytes to
    /// `sink`. The root packet is validated and counted like every other.
    pub fn traverse(
        &mut self,
        root: &Packet,
        sink: &mut dyn Write,
    ) -> crate::Result<TraversalSummary> {
        let mut out = CountingSink::new(sink);
        let table = ConstructorTable::new();
        self.visit(root, &table, &mut out)?;

        let (bytes_written, digest) = out.finish();
        if let Some((expected_size, expected_digest)) = self.expected.take() {
            if let Some(expected) = expected_size {
                if expected != bytes_written {
                    return Err(TraverseError::SizeMismatch {
                        expected,
                        got: bytes_written,
                    }
                    .into());
                }
            }
            if let Some(expected) = expected_digest {
                if expected != digest {
                    return Err(TraverseError::DigestMismatch.into());
                }
            }
        }

        debug!(
            packets = self.visited,
            bytes = bytes_written,
            "traversal complete"
        );
        Ok(TraversalSummary {
            packets_visited: self.visited,
            bytes_written,
        })
    }

    fn visit(
        &mut self,
        packet: &Packet,
        table: &ConstructorTable,
        out: &mut CountingSink<'_>,
    ) -> crate::Result<()> {
        self.visited += 1;
        if let Some(validator) = self.validator {
            validator.validate(packet)?;
        }

        match packet.payload_type() {
            PayloadType::Data => {
                trace!(
                    digest = %packet.digest().short_hex(),
                    bytes = packet.payload().len(),
                    "data packet"
                );
                out.write_payload(packet.payload())?;
                Ok(())
            }
            PayloadType::Manifest => {
                let manifest = Manifest::decode(packet.payload())?;
                let node = self.open(&manifest)?;
                self.descend(&node, table, out)
            }
        }
    }

    /// Recover the plaintext node, decrypting through the memoized
    /// decryptor when the manifest is encrypted.
    fn open(&mut self, manifest: &Manifest) -> crate::Result<Node> {
        match &manifest.body {
            ManifestBody::Node(node) => Ok(node.clone()),
            ManifestBody::Encrypted(encrypted) => {
                // Decode guarantees context and tag accompany a ciphertext.
                let (Some(ctx), Some(tag)) = (&manifest.security_ctx, &manifest.auth_tag) else {
                    return Err(crate::tlv::CodecError::MissingField("security context").into());
                };
                let keys = self.keys.ok_or(TraverseError::NoKeyStore)?;

                let key = memo_key(ctx);
                match self.memo.take() {
                    Some((cached_key, decryptor)) if cached_key == key => {
                        let node = decryptor.decrypt(ctx, encrypted, tag)?;
                        self.memo = Some((cached_key, decryptor));
                        Ok(node)
                    }
                    _ => {
                        let decryptor = keys.decryptor_for(ctx)?;
                        let node = decryptor.decrypt(ctx, encrypted, tag)?;
                        self.memo = Some((key, decryptor));
                        Ok(node)
                    }
                }
            }
        }
    }

    fn descend(
        &mut self,
        node: &Node,
        table: &ConstructorTable,
        out: &mut CountingSink<'_>,
    ) -> crate::Result<()> {
        if self.expected.is_none() {
            if let Some(meta) = &node.meta {
                self.expected = Some((meta.subtree_size, meta.subtree_digest.clone()));
            }
        }

        // New definitions fork a branch-local copy of the table; siblings
        // and ancestors keep the table they already hold.
        let forked;
        let table = match &node.meta {
            Some(meta) if !meta.nc_defs.is_empty() => {
                forked = table.fork_with(&meta.nc_defs);
                &forked
            }
            _ => table,
        };

        for group in node.groups() {
            let (nc_id, start_segment) = match &group.meta {
                Some(meta) => (
                    meta.nc_id.unwrap_or(DEFAULT_NC_ID),
                    meta.start_segment_id,
                ),
                None => (DEFAULT_NC_ID, None),
            };
            let constructor = table.get(nc_id)?;

            for (offset, pointer) in group.pointers.iter().enumerate() {
                let name = if constructor.uses_name_id() {
                    let segment = start_segment
                        .ok_or(crate::manifest::NameError::MissingSegmentId(nc_id))?
                        + offset as u64;
                    constructor.name_for(Some(segment))?
                } else {
                    constructor.name_for(None)?
                };
                let child = self.store.get(name.as_ref(), pointer)?;
                self.visit(&child, table, out)?;
            }
        }
        Ok(())
    }
}

/// Write-through sink tracking byte count and stream digest.
struct CountingSink<'a> {
    inner: &'a mut dyn Write,
    digester: StreamDigester,
}

impl<'a> CountingSink<'a> {
    fn new(inner: &'a mut dyn Write) -> Self {
        Self {
            inner,
            digester: StreamDigester::new(),
        }
    }

    fn write_payload(&mut self, payload: &[u8]) -> Result<(), TraverseError> {
        self.inner.write_all(payload)?;
        self.digester.update(payload);
        Ok(())
    }

    fn finish(self) -> (u64, Digest) {
        let (digest, bytes) = self.digester.finalize();
        (bytes, digest)
    }
}
