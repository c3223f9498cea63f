// src/crypto/mod.rs

//! Cryptographic collaborators
//!
//! The tree builder and traversal engine consume cryptography through four
//! narrow traits: [`Signer`]/[`Verifier`] for packet validation and
//! [`NodeEncryptor`]/[`NodeDecryptor`] for manifest-node encryption. The
//! providers here implement them with AES-GCM (directly keyed or behind an
//! RSA-OAEP-wrapped content key), Ed25519 signatures, and a CRC32
//! checksum validator.

mod aead;
mod keystore;
mod rsa_oaep;
mod signing;

pub use aead::{AeadCipher, AeadKey};
pub use keystore::KeyStore;
pub use rsa_oaep::{RsaOaepDecryptor, RsaOaepEncryptor};
pub use signing::{Crc32Validator, Ed25519Signer, Ed25519Verifier};

use crate::manifest::{AuthTag, EncryptedNode, Node, SecurityCtx};
use crate::packet::ValidationAlg;
use crate::tlv::CodecError;
use thiserror::Error;

/// Errors from signing, verification, encryption, and decryption.
///
/// Decryption and validation failures are fatal to the operation that hit
/// them; retrying cannot change key availability or make a bad tag good.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("authentication tag mismatch")]
    TagMismatch,

    #[error("no key material for {0}")]
    MissingKey(String),

    #[error("wrong key length: expected {expected} bytes, got {got}")]
    WrongKeyLength { expected: usize, got: usize },

    #[error("security context does not match this decryptor: {0}")]
    ContextMismatch(String),

    #[error("encryption failed: {0}")]
    EncryptFailed(String),

    #[error("signature check failed: {0}")]
    SignatureInvalid(String),

    #[error("packet carries no validation data")]
    NotSigned,

    #[error("validation algorithm mismatch: expected {expected}, found {found}")]
    AlgorithmMismatch { expected: String, found: String },

    #[error("RSA operation failed: {0}")]
    Rsa(String),

    #[error("bad key file: {0}")]
    KeyFile(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces a packet's validation payload.
pub trait Signer {
    /// The algorithm descriptor to embed in the packet.
    fn validation_alg(&self) -> ValidationAlg;

    /// Sign the packet's authenticated region (body ∥ validation-alg).
    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Checks a packet's validation payload.
pub trait Verifier {
    fn verify(
        &self,
        bytes: &[u8],
        alg: &ValidationAlg,
        payload: &[u8],
    ) -> Result<(), CryptoError>;
}

/// Turns a plaintext node into ciphertext plus the context and tag that
/// travel with it.
pub trait NodeEncryptor {
    fn encrypt(&self, node: &Node) -> Result<(SecurityCtx, EncryptedNode, AuthTag), CryptoError>;

    /// Worst-case growth of an encrypted manifest over its plaintext node,
    /// used when measuring the per-packet pointer budget.
    fn overhead(&self) -> usize;
}

/// Recovers a plaintext node from an encrypted manifest.
pub trait NodeDecryptor: std::fmt::Debug {
    fn decrypt(
        &self,
        ctx: &SecurityCtx,
        node: &EncryptedNode,
        tag: &AuthTag,
    ) -> Result<Node, CryptoError>;
}
