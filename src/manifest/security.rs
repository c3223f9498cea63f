// src/manifest/security.rs

//! Security context, encrypted nodes, and authentication tags
//!
//! An encrypted manifest replaces its node TLV with an opaque ciphertext
//! blob and describes the key material in a security context: either a
//! directly keyed AEAD (key number + nonce + mode) or an RSA-OAEP-wrapped
//! content key addressed by the digest of the wrapping public key. The
//! AEAD tag travels separately as the manifest's auth tag.
//!
//! The context is a closed set of tagged variants dispatched by TLV type;
//! an unknown context type is a parse error.

use crate::digest::Digest;
use crate::tlv::{decode_uint, encode_uint, push_tlv, read_u8, CodecError, TlvReader, TLV_HEADER_LEN};
use std::fmt;

const T_AEAD_CTX: u16 = 0x0001;
const T_RSA_OAEP_CTX: u16 = 0x0002;

const T_SEC_KEY_NUMBER: u16 = 0x0001;
const T_SEC_NONCE: u16 = 0x0002;
const T_SEC_MODE: u16 = 0x0003;
const T_SEC_KEY_ID: u16 = 0x0004;
const T_SEC_WRAPPED_KEY: u16 = 0x0005;

/// AEAD nonce length on the wire.
pub const NONCE_LEN: usize = 12;
/// AEAD authentication tag length.
pub const TAG_LEN: usize = 16;

/// AEAD cipher selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AeadMode {
    AesGcm128 = 1,
    AesGcm256 = 2,
}

impl AeadMode {
    pub fn from_wire(b: u8) -> Result<Self, CodecError> {
        match b {
            1 => Ok(Self::AesGcm128),
            2 => Ok(Self::AesGcm256),
            other => Err(CodecError::UnknownType {
                found: other as u16,
                context: "aead mode",
            }),
        }
    }

    /// Key length in bytes.
    #[inline]
    pub const fn key_len(&self) -> usize {
        match self {
            Self::AesGcm128 => 16,
            Self::AesGcm256 => 32,
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AesGcm128 => "aes-gcm-128",
            Self::AesGcm256 => "aes-gcm-256",
        }
    }
}

impl fmt::Display for AeadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Directly keyed AEAD context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadCtx {
    /// Which pre-shared key encrypted this node.
    pub key_number: u64,
    pub nonce: Vec<u8>,
    pub mode: AeadMode,
}

/// RSA-OAEP-wrapped content-key context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaOaepCtx {
    /// SHA-256 of the wrapping public key (DER).
    pub key_id: Digest,
    /// Content key, OAEP-wrapped to the public key.
    pub wrapped_key: Vec<u8>,
    pub nonce: Vec<u8>,
    pub mode: AeadMode,
}

/// The manifest's optional security context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityCtx {
    Aead(AeadCtx),
    RsaOaep(RsaOaepCtx),
}

impl SecurityCtx {
    fn encode_fields(&self) -> (u16, Vec<u8>) {
        match self {
            Self::Aead(ctx) => {
                let mut value = Vec::new();
                push_tlv(&mut value, T_SEC_KEY_NUMBER, &encode_uint(ctx.key_number));
                push_tlv(&mut value, T_SEC_NONCE, &ctx.nonce);
                push_tlv(&mut value, T_SEC_MODE, &[ctx.mode as u8]);
                (T_AEAD_CTX, value)
            }
            Self::RsaOaep(ctx) => {
                let mut value = Vec::new();
                let mut id = Vec::new();
                ctx.key_id.encode_into(&mut id);
                push_tlv(&mut value, T_SEC_KEY_ID, &id);
                push_tlv(&mut value, T_SEC_WRAPPED_KEY, &ctx.wrapped_key);
                push_tlv(&mut value, T_SEC_NONCE, &ctx.nonce);
                push_tlv(&mut value, T_SEC_MODE, &[ctx.mode as u8]);
                (T_RSA_OAEP_CTX, value)
            }
        }
    }

    /// Serialized length as a security-context TLV (used both for packet
    /// budget measurement and buffer sizing).
    pub fn wire_len(&self) -> usize {
        let (_, value) = self.encode_fields();
        2 * TLV_HEADER_LEN + value.len()
    }

    /// Encode as `envelope { variant { fields } }`.
    pub fn encode_into(&self, envelope: u16, out: &mut Vec<u8>) {
        let (typ, value) = self.encode_fields();
        let mut inner = Vec::new();
        push_tlv(&mut inner, typ, &value);
        push_tlv(out, envelope, &inner);
    }

    /// Decode from the value bytes of a security-context TLV.
    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let (typ, fields) = reader.next()?;
        reader.finish("security context")?;
        match typ {
            T_AEAD_CTX => {
                let mut r = TlvReader::new(fields);
                let key_number = decode_uint(r.expect(T_SEC_KEY_NUMBER)?)?;
                let nonce = check_nonce(r.expect(T_SEC_NONCE)?)?;
                let mode = AeadMode::from_wire(read_u8(r.expect(T_SEC_MODE)?)?)?;
                r.finish("aead context")?;
                Ok(Self::Aead(AeadCtx {
                    key_number,
                    nonce,
                    mode,
                }))
            }
            T_RSA_OAEP_CTX => {
                let mut r = TlvReader::new(fields);
                let id_value = r.expect(T_SEC_KEY_ID)?;
                let mut id = TlvReader::new(id_value);
                let (t, v) = id.next()?;
                id.finish("key id")?;
                let key_id = Digest::from_tlv(t, v)?;
                let wrapped_key = r.expect(T_SEC_WRAPPED_KEY)?.to_vec();
                let nonce = check_nonce(r.expect(T_SEC_NONCE)?)?;
                let mode = AeadMode::from_wire(read_u8(r.expect(T_SEC_MODE)?)?)?;
                r.finish("rsa-oaep context")?;
                Ok(Self::RsaOaep(RsaOaepCtx {
                    key_id,
                    wrapped_key,
                    nonce,
                    mode,
                }))
            }
            other => Err(CodecError::UnknownType {
                found: other,
                context: "security context",
            }),
        }
    }

    pub fn mode(&self) -> AeadMode {
        match self {
            Self::Aead(ctx) => ctx.mode,
            Self::RsaOaep(ctx) => ctx.mode,
        }
    }

    pub fn nonce(&self) -> &[u8] {
        match self {
            Self::Aead(ctx) => &ctx.nonce,
            Self::RsaOaep(ctx) => &ctx.nonce,
        }
    }

    /// The bytes bound into the AEAD as associated data: the context's own
    /// serialized form. Tampering with any context field breaks the tag.
    pub fn associated_data(&self) -> Vec<u8> {
        let (typ, value) = self.encode_fields();
        let mut out = Vec::new();
        push_tlv(&mut out, typ, &value);
        out
    }
}

fn check_nonce(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if bytes.len() != NONCE_LEN {
        return Err(CodecError::InvalidLength {
            what: "aead nonce",
            len: bytes.len(),
        });
    }
    Ok(bytes.to_vec())
}

impl fmt::Display for SecurityCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aead(ctx) => write!(f, "{} key #{}", ctx.mode, ctx.key_number),
            Self::RsaOaep(ctx) => {
                write!(f, "rsa-oaep({}) key {}", ctx.mode, ctx.key_id.short_hex())
            }
        }
    }
}

/// Opaque ciphertext standing in for a node TLV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedNode(Vec<u8>);

impl EncryptedNode {
    pub fn new(ciphertext: Vec<u8>) -> Self {
        Self(ciphertext)
    }

    #[inline]
    pub fn ciphertext(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// AEAD authentication tag carried beside the encrypted node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTag(Vec<u8>);

impl AuthTag {
    pub fn new(tag: Vec<u8>) -> Result<Self, CodecError> {
        if tag.len() != TAG_LEN {
            return Err(CodecError::InvalidLength {
                what: "auth tag",
                len: tag.len(),
            });
        }
        Ok(Self(tag))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T_ENVELOPE: u16 = 0x0001;

    fn roundtrip(ctx: &SecurityCtx) -> SecurityCtx {
        let mut buf = Vec::new();
        ctx.encode_into(T_ENVELOPE, &mut buf);
        assert_eq!(buf.len(), ctx.wire_len());
        let (tlv, _) = crate::tlv::Tlv::decode(&buf).unwrap();
        SecurityCtx::decode_value(tlv.value()).unwrap()
    }

    #[test]
    fn aead_ctx_roundtrip() {
        let ctx = SecurityCtx::Aead(AeadCtx {
            key_number: 77,
            nonce: vec![9; NONCE_LEN],
            mode: AeadMode::AesGcm128,
        });
        assert_eq!(roundtrip(&ctx), ctx);
    }

    #[test]
    fn rsa_ctx_roundtrip() {
        let ctx = SecurityCtx::RsaOaep(RsaOaepCtx {
            key_id: Digest::sha256_of(b"public key der"),
            wrapped_key: vec![0xAB; 256],
            nonce: vec![1; NONCE_LEN],
            mode: AeadMode::AesGcm256,
        });
        assert_eq!(roundtrip(&ctx), ctx);
    }

    #[test]
    fn bad_nonce_length_rejected() {
        let ctx = SecurityCtx::Aead(AeadCtx {
            key_number: 1,
            nonce: vec![0; 8],
            mode: AeadMode::AesGcm128,
        });
        let mut buf = Vec::new();
        ctx.encode_into(T_ENVELOPE, &mut buf);
        let (tlv, _) = crate::tlv::Tlv::decode(&buf).unwrap();
        assert!(matches!(
            SecurityCtx::decode_value(tlv.value()).unwrap_err(),
            CodecError::InvalidLength { what: "aead nonce", .. }
        ));
    }

    #[test]
    fn associated_data_tracks_fields() {
        let a = SecurityCtx::Aead(AeadCtx {
            key_number: 1,
            nonce: vec![0; NONCE_LEN],
            mode: AeadMode::AesGcm128,
        });
        let b = SecurityCtx::Aead(AeadCtx {
            key_number: 2,
            nonce: vec![0; NONCE_LEN],
            mode: AeadMode::AesGcm128,
        });
        assert_ne!(a.associated_data(), b.associated_data());
    }

    #[test]
    fn auth_tag_length_enforced() {
        assert!(AuthTag::new(vec![0; TAG_LEN]).is_ok());
        assert!(AuthTag::new(vec![0; 12]).is_err());
    }

    #[test]
    fn mode_key_lengths() {
        assert_eq!(AeadMode::AesGcm128.key_len(), 16);
        assert_eq!(AeadMode::AesGcm256.key_len(), 32);
    }
}
