// src/crypto/aead.rs

//! Directly keyed AES-GCM node encryption
//!
//! An [`AeadCipher`] seals a node under a pre-shared key identified by a
//! key number. The nonce is derived from the key number and the plaintext,
//! so rebuilding the same tree with the same key yields byte-identical
//! packets. The security context's own serialization is bound in as
//! associated data; tampering with any context field fails the tag check.

use crate::crypto::{CryptoError, NodeDecryptor, NodeEncryptor};
use crate::manifest::security::{NONCE_LEN, TAG_LEN};
use crate::manifest::{AeadCtx, AeadMode, AuthTag, EncryptedNode, Node, SecurityCtx};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use sha2::{Digest as _, Sha256};

/// A symmetric key tagged with its AEAD mode.
#[derive(Clone)]
pub struct AeadKey {
    mode: AeadMode,
    bytes: Vec<u8>,
}

impl AeadKey {
    pub fn new(mode: AeadMode, bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != mode.key_len() {
            return Err(CryptoError::WrongKeyLength {
                expected: mode.key_len(),
                got: bytes.len(),
            });
        }
        Ok(Self { mode, bytes })
    }

    /// Fresh random key for `mode`.
    pub fn generate(mode: AeadMode) -> Self {
        let mut bytes = vec![0u8; mode.key_len()];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
        Self { mode, bytes }
    }

    #[inline]
    pub fn mode(&self) -> AeadMode {
        self.mode
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes stay out of debug output.
        write!(f, "AeadKey({})", self.mode)
    }
}

/// Seal `plaintext`, returning ciphertext and detached tag.
pub(crate) fn seal(
    key: &AeadKey,
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, AuthTag), CryptoError> {
    let payload = Payload {
        msg: plaintext,
        aad,
    };
    let mut sealed = match key.mode {
        AeadMode::AesGcm128 => Aes128Gcm::new_from_slice(&key.bytes)
            .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?
            .encrypt(Nonce::from_slice(nonce), payload),
        AeadMode::AesGcm256 => Aes256Gcm::new_from_slice(&key.bytes)
            .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?
            .encrypt(Nonce::from_slice(nonce), payload),
    }
    .map_err(|_| CryptoError::EncryptFailed("aead seal".to_string()))?;

    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    Ok((sealed, AuthTag::new(tag)?))
}

/// Open ciphertext ∥ tag, failing on any mismatch.
pub(crate) fn open(
    key: &AeadKey,
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &AuthTag,
) -> Result<Vec<u8>, CryptoError> {
    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag.as_bytes());
    let payload = Payload {
        msg: &sealed,
        aad,
    };
    match key.mode {
        AeadMode::AesGcm128 => Aes128Gcm::new_from_slice(&key.bytes)
            .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?
            .decrypt(Nonce::from_slice(nonce), payload),
        AeadMode::AesGcm256 => Aes256Gcm::new_from_slice(&key.bytes)
            .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?
            .decrypt(Nonce::from_slice(nonce), payload),
    }
    .map_err(|_| CryptoError::TagMismatch)
}

/// Nonce derived from the key number and plaintext. Identical builds
/// produce identical packets, which content addressing requires.
pub(crate) fn derive_nonce(domain: &[u8], key_number: u64, plaintext: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(key_number.to_be_bytes());
    hasher.update(plaintext);
    hasher.finalize()[..NONCE_LEN].to_vec()
}

/// AES-GCM node encryptor/decryptor around one pre-shared key.
#[derive(Debug, Clone)]
pub struct AeadCipher {
    key_number: u64,
    key: AeadKey,
}

impl AeadCipher {
    pub fn new(key_number: u64, key: AeadKey) -> Self {
        Self { key_number, key }
    }

    #[inline]
    pub fn key_number(&self) -> u64 {
        self.key_number
    }
}

impl NodeEncryptor for AeadCipher {
    fn encrypt(&self, node: &Node) -> Result<(SecurityCtx, EncryptedNode, AuthTag), CryptoError> {
        let plaintext = node.encode();
        let nonce = derive_nonce(b"aead-node", self.key_number, &plaintext);
        let ctx = SecurityCtx::Aead(AeadCtx {
            key_number: self.key_number,
            nonce: nonce.clone(),
            mode: self.key.mode(),
        });
        let aad = ctx.associated_data();
        let (ciphertext, tag) = seal(&self.key, &nonce, &aad, &plaintext)?;
        Ok((ctx, EncryptedNode::new(ciphertext), tag))
    }

    fn overhead(&self) -> usize {
        // Context TLV plus detached tag TLV; the ciphertext itself is the
        // same length as the plaintext node.
        let ctx = SecurityCtx::Aead(AeadCtx {
            key_number: u64::MAX,
            nonce: vec![0; NONCE_LEN],
            mode: self.key.mode(),
        });
        ctx.wire_len() + crate::tlv::TLV_HEADER_LEN + TAG_LEN
    }
}

impl NodeDecryptor for AeadCipher {
    fn decrypt(
        &self,
        ctx: &SecurityCtx,
        node: &EncryptedNode,
        tag: &AuthTag,
    ) -> Result<Node, CryptoError> {
        let aead = match ctx {
            SecurityCtx::Aead(aead) => aead,
            SecurityCtx::RsaOaep(_) => {
                return Err(CryptoError::ContextMismatch(
                    "rsa-oaep context offered to a pre-shared-key decryptor".to_string(),
                ))
            }
        };
        if aead.key_number != self.key_number {
            return Err(CryptoError::ContextMismatch(format!(
                "key number {} does not match {}",
                aead.key_number, self.key_number
            )));
        }
        if aead.mode != self.key.mode() {
            return Err(CryptoError::ContextMismatch(format!(
                "mode {} does not match key mode {}",
                aead.mode,
                self.key.mode()
            )));
        }
        let aad = ctx.associated_data();
        let plaintext = open(&self.key, &aead.nonce, &aad, node.ciphertext(), tag)?;
        Ok(Node::decode_value(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use crate::manifest::{HashGroup, PointerList};

    fn sample_node() -> Node {
        let pointers = PointerList::new(vec![
            Digest::sha256_of(b"one"),
            Digest::sha256_of(b"two"),
            Digest::sha256_of(b"three"),
        ])
        .unwrap();
        Node::new(None, vec![HashGroup::new(None, pointers)]).unwrap()
    }

    fn cipher(mode: AeadMode) -> AeadCipher {
        let key = AeadKey::new(mode, vec![0x42; mode.key_len()]).unwrap();
        AeadCipher::new(77, key)
    }

    #[test]
    fn roundtrip_both_modes() {
        for mode in [AeadMode::AesGcm128, AeadMode::AesGcm256] {
            let cipher = cipher(mode);
            let node = sample_node();
            let (ctx, enc, tag) = cipher.encrypt(&node).unwrap();
            assert_eq!(ctx.mode(), mode);
            let back = cipher.decrypt(&ctx, &enc, &tag).unwrap();
            assert_eq!(back, node);
        }
    }

    #[test]
    fn encryption_is_deterministic() {
        let cipher = cipher(AeadMode::AesGcm128);
        let node = sample_node();
        let (ctx_a, enc_a, tag_a) = cipher.encrypt(&node).unwrap();
        let (ctx_b, enc_b, tag_b) = cipher.encrypt(&node).unwrap();
        assert_eq!(ctx_a, ctx_b);
        assert_eq!(enc_a, enc_b);
        assert_eq!(tag_a, tag_b);
    }

    #[test]
    fn ciphertext_tamper_detected() {
        let cipher = cipher(AeadMode::AesGcm128);
        let (ctx, enc, tag) = cipher.encrypt(&sample_node()).unwrap();

        let mut bytes = enc.ciphertext().to_vec();
        bytes[0] ^= 0x01;
        let err = cipher
            .decrypt(&ctx, &EncryptedNode::new(bytes), &tag)
            .unwrap_err();
        assert!(matches!(err, CryptoError::TagMismatch));
    }

    #[test]
    fn tag_tamper_detected() {
        let cipher = cipher(AeadMode::AesGcm128);
        let (ctx, enc, tag) = cipher.encrypt(&sample_node()).unwrap();

        let mut bytes = tag.as_bytes().to_vec();
        bytes[TAG_LEN - 1] ^= 0x80;
        let err = cipher
            .decrypt(&ctx, &enc, &AuthTag::new(bytes).unwrap())
            .unwrap_err();
        assert!(matches!(err, CryptoError::TagMismatch));
    }

    #[test]
    fn associated_data_tamper_detected() {
        let cipher = cipher(AeadMode::AesGcm128);
        let (ctx, enc, tag) = cipher.encrypt(&sample_node()).unwrap();

        // Same decryptor key, but the context (the associated data) claims
        // a different nonce byte.
        let tampered = match &ctx {
            SecurityCtx::Aead(aead) => {
                let mut nonce = aead.nonce.clone();
                nonce[0] ^= 0xFF;
                SecurityCtx::Aead(AeadCtx {
                    key_number: aead.key_number,
                    nonce,
                    mode: aead.mode,
                })
            }
            _ => unreachable!(),
        };
        let err = cipher.decrypt(&tampered, &enc, &tag).unwrap_err();
        assert!(matches!(err, CryptoError::TagMismatch));
    }

    #[test]
    fn wrong_key_number_refused() {
        let cipher_a = cipher(AeadMode::AesGcm128);
        let (ctx, enc, tag) = cipher_a.encrypt(&sample_node()).unwrap();

        let other = AeadCipher::new(
            78,
            AeadKey::new(AeadMode::AesGcm128, vec![0x42; 16]).unwrap(),
        );
        let err = other.decrypt(&ctx, &enc, &tag).unwrap_err();
        assert!(matches!(err, CryptoError::ContextMismatch(_)));
    }

    #[test]
    fn wrong_key_bytes_fail_tag() {
        let cipher_a = cipher(AeadMode::AesGcm128);
        let (ctx, enc, tag) = cipher_a.encrypt(&sample_node()).unwrap();

        let other = AeadCipher::new(
            77,
            AeadKey::new(AeadMode::AesGcm128, vec![0x43; 16]).unwrap(),
        );
        let err = other.decrypt(&ctx, &enc, &tag).unwrap_err();
        assert!(matches!(err, CryptoError::TagMismatch));
    }

    #[test]
    fn key_length_checked() {
        assert!(AeadKey::new(AeadMode::AesGcm128, vec![0; 32]).is_err());
        assert!(AeadKey::new(AeadMode::AesGcm256, vec![0; 16]).is_err());
    }
}
