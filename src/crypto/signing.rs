// src/crypto/signing.rs

//! Packet signing and checksum validation
//!
//! Ed25519 signatures authenticate root manifests; the CRC32 validator is
//! the cheap integrity check for deployments that only need corruption
//! detection. Both sides of each scheme implement the [`Signer`] and
//! [`Verifier`] traits, and key pairs persist as JSON files with
//! base64-encoded key material.

use crate::crypto::{CryptoError, Signer, Verifier};
use crate::digest::Digest;
use crate::packet::ValidationAlg;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// An Ed25519 signing key pair.
pub struct Ed25519Signer {
    signing_key: SigningKey,
    key_id: Digest,
}

impl Ed25519Signer {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let key_id = Digest::sha256_of(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            key_id,
        }
    }

    /// SHA-256 of the public key bytes.
    #[inline]
    pub fn key_id(&self) -> &Digest {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The matching verifier.
    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier::new(self.verifying_key())
    }

    /// Persist the key pair as JSON.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        let stored = StoredKeyPair {
            kind: KEY_KIND.to_string(),
            secret_key: BASE64.encode(self.signing_key.to_bytes()),
            public_key: BASE64.encode(self.verifying_key().as_bytes()),
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| CryptoError::KeyFile(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a key pair saved with [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let json = fs::read_to_string(path)?;
        let stored: StoredKeyPair =
            serde_json::from_str(&json).map_err(|e| CryptoError::KeyFile(e.to_string()))?;
        if stored.kind != KEY_KIND {
            return Err(CryptoError::KeyFile(format!(
                "unexpected key kind {:?}",
                stored.kind
            )));
        }
        let bytes = BASE64
            .decode(&stored.secret_key)
            .map_err(|e| CryptoError::KeyFile(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::KeyFile("secret key must be 32 bytes".to_string()))?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes)))
    }
}

const KEY_KIND: &str = "ed25519";

#[derive(Serialize, Deserialize)]
struct StoredKeyPair {
    kind: String,
    secret_key: String,
    public_key: String,
}

impl Signer for Ed25519Signer {
    fn validation_alg(&self) -> ValidationAlg {
        ValidationAlg::Ed25519 {
            key_id: Some(self.key_id.clone()),
        }
    }

    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.signing_key.sign(bytes).to_bytes().to_vec())
    }
}

/// Verifies Ed25519 packet signatures.
pub struct Ed25519Verifier {
    verifying_key: VerifyingKey,
    key_id: Digest,
}

impl Ed25519Verifier {
    pub fn new(verifying_key: VerifyingKey) -> Self {
        let key_id = Digest::sha256_of(verifying_key.as_bytes());
        Self {
            verifying_key,
            key_id,
        }
    }

    #[inline]
    pub fn key_id(&self) -> &Digest {
        &self.key_id
    }
}

impl Verifier for Ed25519Verifier {
    fn verify(
        &self,
        bytes: &[u8],
        alg: &ValidationAlg,
        payload: &[u8],
    ) -> Result<(), CryptoError> {
        let key_id = match alg {
            ValidationAlg::Ed25519 { key_id } => key_id,
            other => {
                return Err(CryptoError::AlgorithmMismatch {
                    expected: "ed25519".to_string(),
                    found: other.to_string(),
                })
            }
        };
        if let Some(key_id) = key_id {
            if key_id != &self.key_id {
                return Err(CryptoError::MissingKey(format!(
                    "signing key {}",
                    key_id.short_hex()
                )));
            }
        }
        let sig: [u8; 64] = payload
            .try_into()
            .map_err(|_| CryptoError::SignatureInvalid("signature must be 64 bytes".to_string()))?;
        self.verifying_key
            .verify(bytes, &Signature::from_bytes(&sig))
            .map_err(|e| CryptoError::SignatureInvalid(e.to_string()))
    }
}

/// CRC32 checksum as both signer and verifier.
///
/// Detects corruption, not tampering; pair it with content-addressed
/// fetching for anything stronger.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32Validator;

impl Crc32Validator {
    pub fn new() -> Self {
        Self
    }
}

impl Signer for Crc32Validator {
    fn validation_alg(&self) -> ValidationAlg {
        ValidationAlg::Crc32
    }

    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(crc32fast::hash(bytes).to_be_bytes().to_vec())
    }
}

impl Verifier for Crc32Validator {
    fn verify(
        &self,
        bytes: &[u8],
        alg: &ValidationAlg,
        payload: &[u8],
    ) -> Result<(), CryptoError> {
        if !matches!(alg, ValidationAlg::Crc32) {
            return Err(CryptoError::AlgorithmMismatch {
                expected: "crc32".to_string(),
                found: alg.to_string(),
            });
        }
        let expected = crc32fast::hash(bytes).to_be_bytes();
        if payload != expected {
            return Err(CryptoError::SignatureInvalid(format!(
                "crc32 mismatch: expected {}, got {}",
                hex::encode(expected),
                hex::encode(payload)
            )));
        }
        Ok(())
    }
}
