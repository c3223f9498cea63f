// src/manifest/group.rs

//! Hash groups: ordered pointer lists with optional aggregate metadata
//!
//! A hash group is the unit a node is made of: exactly one pointer list,
//! preceded by an optional metadata block recording aggregate sizes and
//! digests for the subtree the group covers, the name-constructor id its
//! pointers resolve under, and the starting segment id for segmented
//! naming. Pointer order is semantically significant: it is traversal
//! order.

use crate::digest::Digest;
use crate::tlv::{
    decode_uint, encode_uint, push_tlv, CodecError, TlvReader, TLV_HEADER_LEN,
};

/// Group metadata TLV.
pub const T_GROUP_META: u16 = 0x0001;
/// Pointer list TLV.
pub const T_POINTERS: u16 = 0x0002;

const T_GM_SUBTREE_SIZE: u16 = 0x0001;
const T_GM_SUBTREE_DIGEST: u16 = 0x0002;
const T_GM_LEAF_SIZE: u16 = 0x0003;
const T_GM_LEAF_DIGEST: u16 = 0x0004;
const T_GM_NC_ID: u16 = 0x0005;
const T_GM_START_SEGMENT: u16 = 0x0006;

/// Serialized cost of one SHA-256 pointer inside a pointer list.
pub const POINTER_WIRE_COST: usize = TLV_HEADER_LEN + 32;

/// An ordered, non-empty sequence of digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerList {
    pointers: Vec<Digest>,
}

impl PointerList {
    /// Wrap a pointer vector; an empty list is a construction error.
    pub fn new(pointers: Vec<Digest>) -> Result<Self, CodecError> {
        if pointers.is_empty() {
            return Err(CodecError::InvalidValue(
                "pointer list must not be empty".to_string(),
            ));
        }
        Ok(Self { pointers })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Digest> {
        self.pointers.iter()
    }

    pub fn wire_len(&self) -> usize {
        TLV_HEADER_LEN + self.pointers.iter().map(Digest::wire_len).sum::<usize>()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let mut value = Vec::new();
        for d in &self.pointers {
            d.encode_into(&mut value);
        }
        push_tlv(out, T_POINTERS, &value);
    }

    /// Decode from the value bytes of a pointer-list TLV.
    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let mut pointers = Vec::new();
        while let Some(typ) = reader.peek_type()? {
            let (_, v) = reader.next()?;
            pointers.push(Digest::from_tlv(typ, v)?);
        }
        Self::new(pointers)
    }
}

impl<'a> IntoIterator for &'a PointerList {
    type Item = &'a Digest;
    type IntoIter = std::slice::Iter<'a, Digest>;

    fn into_iter(self) -> Self::IntoIter {
        self.pointers.iter()
    }
}

/// Optional per-group aggregate metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupMeta {
    /// Total payload bytes reachable through this group.
    pub subtree_size: Option<u64>,
    /// Digest of the bytes reachable through this group.
    pub subtree_digest: Option<Digest>,
    /// Payload bytes directly pointed at (leaf data only).
    pub leaf_size: Option<u64>,
    /// Digest of the directly pointed-at bytes.
    pub leaf_digest: Option<Digest>,
    /// Name-constructor id this group's pointers resolve under.
    pub nc_id: Option<u64>,
    /// Segment id of the first pointer, for segmented naming.
    pub start_segment_id: Option<u64>,
}

impl GroupMeta {
    pub fn is_empty(&self) -> bool {
        self.subtree_size.is_none()
            && self.subtree_digest.is_none()
            && self.leaf_size.is_none()
            && self.leaf_digest.is_none()
            && self.nc_id.is_none()
            && self.start_segment_id.is_none()
    }

    /// Fully populated metadata, used to measure worst-case packet
    /// overhead before any real group exists.
    pub fn worst_case() -> Self {
        let digest = Digest::sha256_of(&[]);
        Self {
            subtree_size: Some(u64::MAX),
            subtree_digest: Some(digest.clone()),
            leaf_size: Some(u64::MAX),
            leaf_digest: Some(digest),
            nc_id: Some(u64::MAX),
            start_segment_id: Some(u64::MAX),
        }
    }

    fn encode_fields(&self) -> Vec<u8> {
        let mut value = Vec::new();
        if let Some(v) = self.subtree_size {
            push_tlv(&mut value, T_GM_SUBTREE_SIZE, &encode_uint(v));
        }
        if let Some(d) = &self.subtree_digest {
            let mut inner = Vec::new();
            d.encode_into(&mut inner);
            push_tlv(&mut value, T_GM_SUBTREE_DIGEST, &inner);
        }
        if let Some(v) = self.leaf_size {
            push_tlv(&mut value, T_GM_LEAF_SIZE, &encode_uint(v));
        }
        if let Some(d) = &self.leaf_digest {
            let mut inner = Vec::new();
            d.encode_into(&mut inner);
            push_tlv(&mut value, T_GM_LEAF_DIGEST, &inner);
        }
        if let Some(v) = self.nc_id {
            push_tlv(&mut value, T_GM_NC_ID, &encode_uint(v));
        }
        if let Some(v) = self.start_segment_id {
            push_tlv(&mut value, T_GM_START_SEGMENT, &encode_uint(v));
        }
        value
    }

    pub fn wire_len(&self) -> usize {
        TLV_HEADER_LEN + self.encode_fields().len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        push_tlv(out, T_GROUP_META, &self.encode_fields());
    }

    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let mut meta = Self::default();
        while let Some(typ) = reader.peek_type()? {
            let (_, v) = reader.next()?;
            match typ {
                T_GM_SUBTREE_SIZE => meta.subtree_size = Some(decode_uint(v)?),
                T_GM_SUBTREE_DIGEST => meta.subtree_digest = Some(decode_digest(v)?),
                T_GM_LEAF_SIZE => meta.leaf_size = Some(decode_uint(v)?),
                T_GM_LEAF_DIGEST => meta.leaf_digest = Some(decode_digest(v)?),
                T_GM_NC_ID => meta.nc_id = Some(decode_uint(v)?),
                T_GM_START_SEGMENT => meta.start_segment_id = Some(decode_uint(v)?),
                other => {
                    return Err(CodecError::UnknownType {
                        found: other,
                        context: "group metadata",
                    })
                }
            }
        }
        Ok(meta)
    }
}

fn decode_digest(value: &[u8]) -> Result<Digest, CodecError> {
    let mut reader = TlvReader::new(value);
    let (typ, v) = reader.next()?;
    reader.finish("digest")?;
    Digest::from_tlv(typ, v)
}

/// Optional metadata plus exactly one pointer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashGroup {
    pub meta: Option<GroupMeta>,
    pub pointers: PointerList,
}

impl HashGroup {
    pub fn new(meta: Option<GroupMeta>, pointers: PointerList) -> Self {
        let meta = meta.filter(|m| !m.is_empty());
        Self { meta, pointers }
    }

    /// Serialized length of the group's value bytes (metadata + pointers,
    /// without the enclosing hash-group TLV header).
    pub fn value_len(&self) -> usize {
        self.meta.as_ref().map(GroupMeta::wire_len).unwrap_or(0) + self.pointers.wire_len()
    }

    /// Encode the group's value bytes.
    pub fn encode_value(&self, out: &mut Vec<u8>) {
        if let Some(meta) = &self.meta {
            meta.encode_into(out);
        }
        self.pointers.encode_into(out);
    }

    /// Decode from the value bytes of a hash-group TLV.
    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let meta = match reader.next_if(T_GROUP_META)? {
            Some(v) => Some(GroupMeta::decode_value(v)?),
            None => None,
        };
        let pointers = PointerList::decode_value(reader.expect(T_POINTERS)?)?;
        reader.finish("hash group")?;
        Ok(Self::new(meta, pointers))
    }
}
