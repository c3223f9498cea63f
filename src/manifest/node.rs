// src/manifest/node.rs

//! Nodes: the pointer-holding structure inside a manifest
//!
//! A node is optional node-level metadata followed by one or more hash
//! groups. When data pointers and manifest pointers use different naming
//! schemes they are carried in two groups, data group first; otherwise a
//! single merged group holds both, data pointers before manifest pointers.
//!
//! Node metadata on a root manifest may carry name-constructor definitions
//! that apply to the whole subtree below it. Vendor-range TLVs inside the
//! metadata are preserved verbatim across a decode/encode round trip.

use crate::digest::Digest;
use crate::manifest::group::HashGroup;
use crate::manifest::nc::NcDef;
use crate::name::{Name, T_NAME};
use crate::tlv::{decode_uint, encode_uint, push_tlv, CodecError, Tlv, TlvReader, TLV_HEADER_LEN};

/// Node metadata TLV.
pub const T_NODE_META: u16 = 0x0001;
/// Hash group TLV (repeats).
pub const T_HASH_GROUP: u16 = 0x0002;

const T_NM_SUBTREE_SIZE: u16 = 0x0001;
const T_NM_SUBTREE_DIGEST: u16 = 0x0002;
const T_NM_LOCATOR: u16 = 0x0003;
const T_NM_NC_DEF: u16 = 0x0004;

/// First TLV type of the vendor-extension range inside node metadata.
pub const VENDOR_RANGE_START: u16 = 0x1000;
/// Last TLV type of the vendor-extension range.
pub const VENDOR_RANGE_END: u16 = 0x1FFF;

/// Optional node-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeMeta {
    /// Total payload bytes reachable below this node.
    pub subtree_size: Option<u64>,
    /// Digest of the payload bytes reachable below this node.
    pub subtree_digest: Option<Digest>,
    /// Alternative places the subtree's packets may be fetched from.
    pub locators: Vec<Name>,
    /// Name-constructor definitions scoped to this node's branch.
    pub nc_defs: Vec<NcDef>,
    /// Vendor-range extensions, preserved but not interpreted.
    pub vendor: Vec<Tlv>,
}

impl NodeMeta {
    pub fn is_empty(&self) -> bool {
        self.subtree_size.is_none()
            && self.subtree_digest.is_none()
            && self.locators.is_empty()
            && self.nc_defs.is_empty()
            && self.vendor.is_empty()
    }

    fn encode_fields(&self) -> Vec<u8> {
        let mut value = Vec::new();
        if let Some(v) = self.subtree_size {
            push_tlv(&mut value, T_NM_SUBTREE_SIZE, &encode_uint(v));
        }
        if let Some(d) = &self.subtree_digest {
            let mut inner = Vec::new();
            d.encode_into(&mut inner);
            push_tlv(&mut value, T_NM_SUBTREE_DIGEST, &inner);
        }
        for locator in &self.locators {
            let mut inner = Vec::new();
            locator.encode_into(&mut inner);
            push_tlv(&mut value, T_NM_LOCATOR, &inner);
        }
        for def in &self.nc_defs {
            def.encode_into(T_NM_NC_DEF, &mut value);
        }
        for tlv in &self.vendor {
            tlv.encode_into(&mut value);
        }
        value
    }

    pub fn wire_len(&self) -> usize {
        TLV_HEADER_LEN + self.encode_fields().len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        push_tlv(out, T_NODE_META, &self.encode_fields());
    }

    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let mut meta = Self::default();
        while let Some(typ) = reader.peek_type()? {
            let (_, v) = reader.next()?;
            match typ {
                T_NM_SUBTREE_SIZE => meta.subtree_size = Some(decode_uint(v)?),
                T_NM_SUBTREE_DIGEST => {
                    let mut inner = TlvReader::new(v);
                    let (t, dv) = inner.next()?;
                    inner.finish("subtree digest")?;
                    meta.subtree_digest = Some(Digest::from_tlv(t, dv)?);
                }
                T_NM_LOCATOR => {
                    let mut inner = TlvReader::new(v);
                    let name_value = inner.expect(T_NAME)?;
                    inner.finish("locator")?;
                    meta.locators.push(Name::decode_value(name_value)?);
                }
                T_NM_NC_DEF => meta.nc_defs.push(NcDef::decode_value(v)?),
                t if (VENDOR_RANGE_START..=VENDOR_RANGE_END).contains(&t) => {
                    meta.vendor.push(Tlv::new(t, v.to_vec())?);
                }
                other => {
                    return Err(CodecError::UnknownType {
                        found: other,
                        context: "node metadata",
                    })
                }
            }
        }
        Ok(meta)
    }
}

/// Node metadata plus one or more hash groups, in traversal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub meta: Option<NodeMeta>,
    groups: Vec<HashGroup>,
}

impl Node {
    /// Build a node; at least one hash group is required.
    pub fn new(meta: Option<NodeMeta>, groups: Vec<HashGroup>) -> Result<Self, CodecError> {
        if groups.is_empty() {
            return Err(CodecError::InvalidValue(
                "node requires at least one hash group".to_string(),
            ));
        }
        let meta = meta.filter(|m| !m.is_empty());
        Ok(Self { meta, groups })
    }

    #[inline]
    pub fn groups(&self) -> &[HashGroup] {
        &self.groups
    }

    /// Total pointers across all groups.
    pub fn pointer_count(&self) -> usize {
        self.groups.iter().map(|g| g.pointers.len()).sum()
    }

    /// Serialized length of the node's value bytes.
    pub fn value_len(&self) -> usize {
        self.meta.as_ref().map(NodeMeta::wire_len).unwrap_or(0)
            + self
                .groups
                .iter()
                .map(|g| TLV_HEADER_LEN + g.value_len())
                .sum::<usize>()
    }

    /// Encode the node's value bytes (metadata TLV then group TLVs).
    pub fn encode_value(&self, out: &mut Vec<u8>) {
        if let Some(meta) = &self.meta {
            meta.encode_into(out);
        }
        for group in &self.groups {
            let mut value = Vec::new();
            group.encode_value(&mut value);
            push_tlv(out, T_HASH_GROUP, &value);
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.value_len());
        self.encode_value(&mut out);
        out
    }

    /// Decode from the value bytes of a node TLV.
    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let meta = match reader.next_if(T_NODE_META)? {
            Some(v) => Some(NodeMeta::decode_value(v)?),
            None => None,
        };
        let mut groups = Vec::new();
        while let Some(v) = reader.next_if(T_HASH_GROUP)? {
            groups.push(HashGroup::decode_value(v)?);
        }
        reader.finish("node")?;
        Self::new(meta, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::group::{GroupMeta, PointerList};
    use crate::manifest::nc::NameConstructor;

    fn group(n: usize, salt: u8) -> HashGroup {
        let ptrs = (0..n)
            .map(|i| Digest::sha256_of(&[salt, i as u8]))
            .collect();
        HashGroup::new(None, PointerList::new(ptrs).unwrap())
    }

    #[test]
    fn node_requires_groups() {
        assert!(Node::new(None, Vec::new()).is_err());
    }

    #[test]
    fn bare_node_roundtrip() {
        let node = Node::new(None, vec![group(3, 0)]).unwrap();
        let bytes = node.encode();
        assert_eq!(bytes.len(), node.value_len());
        let back = Node::decode_value(&bytes).unwrap();
        assert_eq!(back, node);
        assert_eq!(back.encode(), bytes);
    }

    #[test]
    fn two_group_order_survives() {
        let node = Node::new(None, vec![group(2, 1), group(4, 2)]).unwrap();
        let back = Node::decode_value(&node.encode()).unwrap();
        assert_eq!(back.groups().len(), 2);
        assert_eq!(back.groups()[0], node.groups()[0]);
        assert_eq!(back.groups()[1], node.groups()[1]);
        assert_eq!(back.pointer_count(), 6);
    }

    #[test]
    fn full_metadata_roundtrip() {
        let meta = NodeMeta {
            subtree_size: Some(4096),
            subtree_digest: Some(Digest::sha256_of(b"stream")),
            locators: vec!["/mirror/a".parse().unwrap(), "/mirror/b".parse().unwrap()],
            nc_defs: vec![NcDef::new(
                1,
                NameConstructor::Segmented("/tree".parse().unwrap()),
            )],
            vendor: vec![Tlv::new(VENDOR_RANGE_START + 5, vec![0xDE, 0xAD]).unwrap()],
        };
        let node = Node::new(
            Some(meta.clone()),
            vec![HashGroup::new(
                Some(GroupMeta {
                    nc_id: Some(1),
                    start_segment_id: Some(0),
                    ..Default::default()
                }),
                PointerList::new(vec![Digest::sha256_of(b"child")]).unwrap(),
            )],
        )
        .unwrap();

        let bytes = node.encode();
        let back = Node::decode_value(&bytes).unwrap();
        assert_eq!(back.meta.as_ref(), Some(&meta));
        assert_eq!(back.encode(), bytes);
    }

    #[test]
    fn empty_meta_is_dropped() {
        let node = Node::new(Some(NodeMeta::default()), vec![group(1, 3)]).unwrap();
        assert!(node.meta.is_none());
    }

    #[test]
    fn unknown_meta_field_rejected() {
        let mut meta_value = Vec::new();
        push_tlv(&mut meta_value, 0x0999, b"?");
        let mut node_value = Vec::new();
        push_tlv(&mut node_value, T_NODE_META, &meta_value);
        let mut g = Vec::new();
        group(1, 4).encode_value(&mut g);
        push_tlv(&mut node_value, T_HASH_GROUP, &g);

        assert!(matches!(
            Node::decode_value(&node_value).unwrap_err(),
            CodecError::UnknownType { .. }
        ));
    }
}
