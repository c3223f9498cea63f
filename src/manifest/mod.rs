// src/manifest/mod.rs

//! Manifest data model
//!
//! A manifest is the payload of a content object whose payload type is
//! "manifest": an optional security context, a node (or its encrypted
//! stand-in), and an optional authentication tag. All structures here are
//! built bottom-up during tree construction, are write-once, and are
//! reconstructed read-only from fetched bytes during traversal.

pub mod group;
pub mod nc;
pub mod node;
pub mod security;

pub use group::{GroupMeta, HashGroup, PointerList, POINTER_WIRE_COST};
pub use nc::{ConstructorTable, NameConstructor, NameError, NcDef, DEFAULT_NC_ID};
pub use node::{Node, NodeMeta};
pub use security::{AeadCtx, AeadMode, AuthTag, EncryptedNode, RsaOaepCtx, SecurityCtx};

use crate::tlv::{push_tlv, CodecError, TlvReader, TLV_HEADER_LEN};

/// Security context TLV.
pub const T_SECURITY_CTX: u16 = 0x0001;
/// Plaintext node TLV.
pub const T_NODE: u16 = 0x0002;
/// Encrypted node TLV.
pub const T_ENCRYPTED_NODE: u16 = 0x0003;
/// Authentication tag TLV.
pub const T_AUTH_TAG: u16 = 0x0004;

/// The node-or-ciphertext alternative inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestBody {
    Node(Node),
    Encrypted(EncryptedNode),
}

/// Optional security context + node (or encrypted node) + optional tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub security_ctx: Option<SecurityCtx>,
    pub body: ManifestBody,
    pub auth_tag: Option<AuthTag>,
}

impl Manifest {
    /// A plaintext manifest around `node`.
    pub fn plain(node: Node) -> Self {
        Self {
            security_ctx: None,
            body: ManifestBody::Node(node),
            auth_tag: None,
        }
    }

    /// An encrypted manifest from an encryptor's output triple.
    pub fn encrypted(ctx: SecurityCtx, node: EncryptedNode, tag: AuthTag) -> Self {
        Self {
            security_ctx: Some(ctx),
            body: ManifestBody::Encrypted(node),
            auth_tag: Some(tag),
        }
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        matches!(self.body, ManifestBody::Encrypted(_))
    }

    /// The plaintext node, if this manifest is not encrypted.
    pub fn node(&self) -> Option<&Node> {
        match &self.body {
            ManifestBody::Node(node) => Some(node),
            ManifestBody::Encrypted(_) => None,
        }
    }

    /// Serialized payload length.
    pub fn wire_len(&self) -> usize {
        let mut len = 0;
        if let Some(ctx) = &self.security_ctx {
            len += ctx.wire_len();
        }
        len += TLV_HEADER_LEN
            + match &self.body {
                ManifestBody::Node(node) => node.value_len(),
                ManifestBody::Encrypted(enc) => enc.len(),
            };
        if let Some(tag) = &self.auth_tag {
            len += TLV_HEADER_LEN + tag.as_bytes().len();
        }
        len
    }

    /// Encode to the payload bytes of a manifest packet.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        if let Some(ctx) = &self.security_ctx {
            ctx.encode_into(T_SECURITY_CTX, &mut out);
        }
        match &self.body {
            ManifestBody::Node(node) => {
                let mut value = Vec::new();
                node.encode_value(&mut value);
                push_tlv(&mut out, T_NODE, &value);
            }
            ManifestBody::Encrypted(enc) => {
                push_tlv(&mut out, T_ENCRYPTED_NODE, enc.ciphertext());
            }
        }
        if let Some(tag) = &self.auth_tag {
            push_tlv(&mut out, T_AUTH_TAG, tag.as_bytes());
        }
        out
    }

    /// Decode from the payload bytes of a manifest packet.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(bytes);
        let security_ctx = match reader.next_if(T_SECURITY_CTX)? {
            Some(v) => Some(SecurityCtx::decode_value(v)?),
            None => None,
        };
        let body = match reader.peek_type()? {
            Some(T_NODE) => {
                let (_, v) = reader.next()?;
                ManifestBody::Node(Node::decode_value(v)?)
            }
            Some(T_ENCRYPTED_NODE) => {
                let (_, v) = reader.next()?;
                ManifestBody::Encrypted(EncryptedNode::new(v.to_vec()))
            }
            Some(other) => {
                return Err(CodecError::UnexpectedType {
                    expected: T_NODE,
                    found: other,
                })
            }
            None => return Err(CodecError::MissingField("manifest node")),
        };
        let auth_tag = match reader.next_if(T_AUTH_TAG)? {
            Some(v) => Some(AuthTag::new(v.to_vec())?),
            None => None,
        };
        reader.finish("manifest")?;

        if matches!(body, ManifestBody::Encrypted(_)) {
            if security_ctx.is_none() {
                return Err(CodecError::MissingField("security context"));
            }
            if auth_tag.is_none() {
                return Err(CodecError::MissingField("auth tag"));
            }
        }

        Ok(Self {
            security_ctx,
            body,
            auth_tag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;

    fn sample_node() -> Node {
        let pointers =
            PointerList::new(vec![Digest::sha256_of(b"a"), Digest::sha256_of(b"b")]).unwrap();
        Node::new(None, vec![HashGroup::new(None, pointers)]).unwrap()
    }

    #[test]
    fn plain_roundtrip() {
        let manifest = Manifest::plain(sample_node());
        let bytes = manifest.encode();
        assert_eq!(bytes.len(), manifest.wire_len());
        let back = Manifest::decode(&bytes).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.encode(), bytes);
        assert!(!back.is_encrypted());
        assert!(back.node().is_some());
    }

    #[test]
    fn encrypted_roundtrip() {
        let ctx = SecurityCtx::Aead(AeadCtx {
            key_number: 77,
            nonce: vec![3; security::NONCE_LEN],
            mode: AeadMode::AesGcm128,
        });
        let manifest = Manifest::encrypted(
            ctx,
            EncryptedNode::new(vec![0xC1; 40]),
            AuthTag::new(vec![0x7A; security::TAG_LEN]).unwrap(),
        );
        let bytes = manifest.encode();
        let back = Manifest::decode(&bytes).unwrap();
        assert_eq!(back, manifest);
        assert!(back.is_encrypted());
        assert!(back.node().is_none());
    }

    #[test]
    fn encrypted_without_ctx_rejected() {
        let mut bytes = Vec::new();
        push_tlv(&mut bytes, T_ENCRYPTED_NODE, &[0u8; 16]);
        push_tlv(&mut bytes, T_AUTH_TAG, &[0u8; security::TAG_LEN]);
        assert!(matches!(
            Manifest::decode(&bytes).unwrap_err(),
            CodecError::MissingField("security context")
        ));
    }

    #[test]
    fn missing_node_rejected() {
        assert!(matches!(
            Manifest::decode(&[]).unwrap_err(),
            CodecError::MissingField("manifest node")
        ));
    }

    #[test]
    fn truncated_payload_rejected() {
        let bytes = Manifest::plain(sample_node()).encode();
        assert!(Manifest::decode(&bytes[..bytes.len() - 3]).is_err());
    }
}
