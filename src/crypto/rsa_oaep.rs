// src/crypto/rsa_oaep.rs

//! RSA-OAEP-wrapped node encryption
//!
//! Each encrypted node gets a fresh random content key; the node is sealed
//! with AES-GCM under that key, and the key itself is OAEP-wrapped to an
//! RSA public key. The wrapping key is addressed by the SHA-256 of its DER
//! encoding, which is what the security context carries.
//!
//! Unlike the pre-shared-key path, OAEP wrapping is randomized, so trees
//! encrypted this way are not byte-reproducible across builds.

use crate::crypto::aead::{open, seal, AeadKey};
use crate::crypto::{CryptoError, NodeDecryptor, NodeEncryptor};
use crate::digest::Digest;
use crate::manifest::security::{NONCE_LEN, TAG_LEN};
use crate::manifest::{AeadMode, AuthTag, EncryptedNode, Node, RsaOaepCtx, SecurityCtx};
use rsa::pkcs8::EncodePublicKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// SHA-256 of a public key's DER encoding, used as its key id.
pub fn rsa_key_id(public_key: &RsaPublicKey) -> Result<Digest, CryptoError> {
    let der = public_key
        .to_public_key_der()
        .map_err(|e| CryptoError::Rsa(e.to_string()))?;
    Ok(Digest::sha256_of(der.as_bytes()))
}

/// Encrypts nodes to an RSA public key.
pub struct RsaOaepEncryptor {
    public_key: RsaPublicKey,
    key_id: Digest,
    mode: AeadMode,
}

impl RsaOaepEncryptor {
    pub fn new(public_key: RsaPublicKey, mode: AeadMode) -> Result<Self, CryptoError> {
        let key_id = rsa_key_id(&public_key)?;
        Ok(Self {
            public_key,
            key_id,
            mode,
        })
    }

    #[inline]
    pub fn key_id(&self) -> &Digest {
        &self.key_id
    }

    fn wrapped_key_len(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.public_key.size()
    }
}

impl NodeEncryptor for RsaOaepEncryptor {
    fn encrypt(&self, node: &Node) -> Result<(SecurityCtx, EncryptedNode, AuthTag), CryptoError> {
        let mut rng = rand::rngs::OsRng;

        let content_key = AeadKey::generate(self.mode);
        let wrapped_key = self
            .public_key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), content_key.as_bytes())
            .map_err(|e| CryptoError::Rsa(e.to_string()))?;

        let mut nonce = vec![0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rng, &mut nonce);

        let ctx = SecurityCtx::RsaOaep(RsaOaepCtx {
            key_id: self.key_id.clone(),
            wrapped_key,
            nonce: nonce.clone(),
            mode: self.mode,
        });
        let aad = ctx.associated_data();
        let plaintext = node.encode();
        let (ciphertext, tag) = seal(&content_key, &nonce, &aad, &plaintext)?;
        Ok((ctx, EncryptedNode::new(ciphertext), tag))
    }

    fn overhead(&self) -> usize {
        let ctx = SecurityCtx::RsaOaep(RsaOaepCtx {
            key_id: self.key_id.clone(),
            wrapped_key: vec![0; self.wrapped_key_len()],
            nonce: vec![0; NONCE_LEN],
            mode: self.mode,
        });
        ctx.wire_len() + crate::tlv::TLV_HEADER_LEN + TAG_LEN
    }
}

/// Decrypts nodes with an RSA private key.
#[derive(Debug)]
pub struct RsaOaepDecryptor {
    private_key: RsaPrivateKey,
    key_id: Digest,
}

impl RsaOaepDecryptor {
    pub fn new(private_key: RsaPrivateKey) -> Result<Self, CryptoError> {
        let key_id = rsa_key_id(&private_key.to_public_key())?;
        Ok(Self {
            private_key,
            key_id,
        })
    }

    #[inline]
    pub fn key_id(&self) -> &Digest {
        &self.key_id
    }
}

impl NodeDecryptor for RsaOaepDecryptor {
    fn decrypt(
        &self,
        ctx: &SecurityCtx,
        node: &EncryptedNode,
        tag: &AuthTag,
    ) -> Result<Node, CryptoError> {
        let oaep = match ctx {
            SecurityCtx::RsaOaep(oaep) => oaep,
            SecurityCtx::Aead(_) => {
                return Err(CryptoError::ContextMismatch(
                    "pre-shared-key context offered to an rsa-oaep decryptor".to_string(),
                ))
            }
        };
        if oaep.key_id != self.key_id {
            return Err(CryptoError::MissingKey(format!(
                "rsa key {}",
                oaep.key_id.short_hex()
            )));
        }
        let key_bytes = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), &oaep.wrapped_key)
            .map_err(|_| CryptoError::TagMismatch)?;
        let content_key = AeadKey::new(oaep.mode, key_bytes)?;

        let aad = ctx.associated_data();
        let plaintext = open(&content_key, &oaep.nonce, &aad, node.ciphertext(), tag)?;
        Ok(Node::decode_value(&plaintext)?)
    }
}
