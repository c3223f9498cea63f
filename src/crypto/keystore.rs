// src/crypto/keystore.rs

//! Key material for decryption
//!
//! A key store maps key numbers to pre-shared AEAD keys and key ids to RSA
//! private keys. The traversal engine asks it for a decryptor matching a
//! manifest's security context; a context naming key material the store
//! does not hold is a fatal decryption error.
//!
//! Stores persist as JSON with base64-encoded key bytes (RSA keys as
//! PKCS#8 DER).

use crate::crypto::aead::{AeadCipher, AeadKey};
use crate::crypto::rsa_oaep::{rsa_key_id, RsaOaepDecryptor};
use crate::crypto::{CryptoError, NodeDecryptor};
use crate::digest::Digest;
use crate::manifest::{AeadMode, SecurityCtx};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Pre-shared AEAD keys by number plus RSA private keys by key id.
#[derive(Default)]
pub struct KeyStore {
    aead_keys: BTreeMap<u64, AeadKey>,
    rsa_keys: Vec<(Digest, RsaPrivateKey)>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-shared key under `key_number`, replacing any
    /// previous key with that number.
    pub fn add_aead_key(&mut self, key_number: u64, key: AeadKey) {
        self.aead_keys.insert(key_number, key);
    }

    /// Register an RSA private key; returns the key id it is filed under.
    pub fn add_rsa_key(&mut self, private_key: RsaPrivateKey) -> Result<Digest, CryptoError> {
        let key_id = rsa_key_id(&private_key.to_public_key())?;
        self.rsa_keys.push((key_id.clone(), private_key));
        Ok(key_id)
    }

    pub fn aead_key(&self, key_number: u64) -> Option<&AeadKey> {
        self.aead_keys.get(&key_number)
    }

    pub fn rsa_key(&self, key_id: &Digest) -> Option<&RsaPrivateKey> {
        self.rsa_keys
            .iter()
            .find(|(id, _)| id == key_id)
            .map(|(_, key)| key)
    }

    pub fn is_empty(&self) -> bool {
        self.aead_keys.is_empty() && self.rsa_keys.is_empty()
    }

    /// Build a decryptor able to open nodes under `ctx`.
    pub fn decryptor_for(
        &self,
        ctx: &SecurityCtx,
    ) -> Result<Box<dyn NodeDecryptor>, CryptoError> {
        match ctx {
            SecurityCtx::Aead(aead) => {
                let key = self.aead_key(aead.key_number).ok_or_else(|| {
                    CryptoError::MissingKey(format!("aead key #{}", aead.key_number))
                })?;
                if key.mode() != aead.mode {
                    return Err(CryptoError::ContextMismatch(format!(
                        "key #{} is {}, context wants {}",
                        aead.key_number,
                        key.mode(),
                        aead.mode
                    )));
                }
                Ok(Box::new(AeadCipher::new(aead.key_number, key.clone())))
            }
            SecurityCtx::RsaOaep(oaep) => {
                let key = self.rsa_key(&oaep.key_id).ok_or_else(|| {
                    CryptoError::MissingKey(format!("rsa key {}", oaep.key_id.short_hex()))
                })?;
                Ok(Box::new(RsaOaepDecryptor::new(key.clone())?))
            }
        }
    }

    /// Persist all keys as JSON.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        let stored = StoredKeyStore {
            aead: self
                .aead_keys
                .iter()
                .map(|(number, key)| StoredAeadKey {
                    key_number: *number,
                    mode: key.mode().name().to_string(),
                    key: BASE64.encode(key.as_bytes()),
                })
                .collect(),
            rsa: self
                .rsa_keys
                .iter()
                .map(|(_, key)| {
                    key.to_pkcs8_der()
                        .map(|der| BASE64.encode(der.as_bytes()))
                        .map_err(|e| CryptoError::KeyFile(e.to_string()))
                })
                .collect::<Result<_, _>>()?,
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| CryptoError::KeyFile(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a store saved with [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let json = fs::read_to_string(path)?;
        let stored: StoredKeyStore =
            serde_json::from_str(&json).map_err(|e| CryptoError::KeyFile(e.to_string()))?;

        let mut store = Self::new();
        for entry in stored.aead {
            let mode = parse_mode(&entry.mode)?;
            let bytes = BASE64
                .decode(&entry.key)
                .map_err(|e| CryptoError::KeyFile(e.to_string()))?;
            store.add_aead_key(entry.key_number, AeadKey::new(mode, bytes)?);
        }
        for der in stored.rsa {
            let bytes = BASE64
                .decode(&der)
                .map_err(|e| CryptoError::KeyFile(e.to_string()))?;
            let key = RsaPrivateKey::from_pkcs8_der(&bytes)
                .map_err(|e| CryptoError::KeyFile(e.to_string()))?;
            store.add_rsa_key(key)?;
        }
        Ok(store)
    }
}

fn parse_mode(name: &str) -> Result<AeadMode, CryptoError> {
    match name {
        "aes-gcm-128" => Ok(AeadMode::AesGcm128),
        "aes-gcm-256" => Ok(AeadMode::AesGcm256),
        other => Err(CryptoError::KeyFile(format!("unknown aead mode {other:?}"))),
    }
}

#[derive(Serialize, Deserialize)]
struct StoredKeyStore {
    #[serde(default)]
    aead: Vec<StoredAeadKey>,
    #[serde(default)]
    rsa: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct StoredAeadKey {
    key_number: u64,
    mode: String,
    key: String,
}
