// src/packet/validation.rs

//! Packet validation algorithm descriptor
//!
//! A packet may carry a validation-algorithm TLV and a validation-payload
//! TLV; both are present together or both absent. The algorithm descriptor
//! names the scheme (CRC32 checksum or Ed25519 signature) and, for
//! signatures, the key id of the signing key. The payload bytes themselves
//! are opaque at this layer; producing and checking them is the signer's
//! and verifier's job.

use crate::digest::Digest;
use crate::tlv::{push_tlv, CodecError, TlvReader, TLV_HEADER_LEN};
use std::fmt;

/// Validation-algorithm TLV.
pub const T_VALIDATION_ALG: u16 = 0x0003;
/// Validation-payload TLV.
pub const T_VALIDATION_PAYLOAD: u16 = 0x0004;

const T_ALG_CRC32: u16 = 0x0001;
const T_ALG_ED25519: u16 = 0x0002;
const T_KEY_ID: u16 = 0x0009;

/// The validation scheme a packet's payload was produced under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationAlg {
    /// CRC32 checksum over the authenticated bytes.
    Crc32,
    /// Ed25519 signature, optionally naming the signing key by digest.
    Ed25519 { key_id: Option<Digest> },
}

impl ValidationAlg {
    pub fn wire_len(&self) -> usize {
        TLV_HEADER_LEN + self.inner_len()
    }

    fn inner_len(&self) -> usize {
        match self {
            Self::Crc32 => TLV_HEADER_LEN,
            Self::Ed25519 { key_id } => {
                TLV_HEADER_LEN
                    + key_id
                        .as_ref()
                        .map(|k| TLV_HEADER_LEN + k.wire_len())
                        .unwrap_or(0)
            }
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let mut value = Vec::new();
        match self {
            Self::Crc32 => push_tlv(&mut value, T_ALG_CRC32, &[]),
            Self::Ed25519 { key_id } => {
                let mut inner = Vec::new();
                if let Some(key_id) = key_id {
                    let mut id_value = Vec::new();
                    key_id.encode_into(&mut id_value);
                    push_tlv(&mut inner, T_KEY_ID, &id_value);
                }
                push_tlv(&mut value, T_ALG_ED25519, &inner);
            }
        }
        push_tlv(out, T_VALIDATION_ALG, &value);
    }

    /// Decode from the value bytes of a validation-algorithm TLV.
    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let (typ, inner) = reader.next()?;
        reader.finish("validation algorithm")?;
        match typ {
            T_ALG_CRC32 => {
                if !inner.is_empty() {
                    return Err(CodecError::InvalidLength {
                        what: "crc32 descriptor",
                        len: inner.len(),
                    });
                }
                Ok(Self::Crc32)
            }
            T_ALG_ED25519 => {
                let mut fields = TlvReader::new(inner);
                let key_id = match fields.next_if(T_KEY_ID)? {
                    Some(id_value) => {
                        let mut id = TlvReader::new(id_value);
                        let (t, v) = id.next()?;
                        id.finish("key id")?;
                        Some(Digest::from_tlv(t, v)?)
                    }
                    None => None,
                };
                fields.finish("ed25519 descriptor")?;
                Ok(Self::Ed25519 { key_id })
            }
            other => Err(CodecError::UnknownType {
                found: other,
                context: "validation algorithm",
            }),
        }
    }
}

impl fmt::Display for ValidationAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crc32 => f.write_str("crc32"),
            Self::Ed25519 { key_id: None } => f.write_str("ed25519"),
            Self::Ed25519 { key_id: Some(id) } => write!(f, "ed25519:{}", id.short_hex()),
        }
    }
}
