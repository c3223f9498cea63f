// src/manifest/nc.rs

//! Name-constructor schemas
//!
//! A name constructor is the rule for deriving a retrieval name for a
//! packet: hash-addressed (nameless), a fixed prefix shared by every
//! packet, or a prefix plus a numeric segment-id suffix. Constructors are
//! defined once, given a numeric id, and referenced from group metadata by
//! that id.
//!
//! Definitions are scoped: a node whose metadata carries new definitions
//! overrides the constructor table for its own branch only. The table is
//! therefore copy-on-write — [`ConstructorTable::fork_with`] produces an
//! independent value and never mutates the parent's table.

use crate::name::Name;
use crate::tlv::{decode_uint, encode_uint, push_tlv, CodecError, TlvReader, TLV_HEADER_LEN};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

const T_NC_ID: u16 = 0x0001;
const T_NC_HASHED: u16 = 0x0002;
const T_NC_PREFIX: u16 = 0x0003;
const T_NC_SEGMENTED: u16 = 0x0004;

/// The constructor id every table starts with, bound to hash-addressed
/// naming.
pub const DEFAULT_NC_ID: u64 = 0;

/// Errors raised while resolving names through a constructor table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("no name constructor defined for id {0}")]
    UnknownId(u64),

    #[error("constructor {0} requires a segment id but none was available")]
    MissingSegmentId(u64),
}

/// How retrieval names are derived for one class of packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameConstructor {
    /// Nameless: packets are addressed purely by digest.
    Hashed,
    /// Every packet carries the same fixed name.
    Prefix(Name),
    /// Prefix plus a numeric segment-id suffix per packet.
    Segmented(Name),
}

impl NameConstructor {
    /// Whether names derived under this constructor embed a numeric id.
    #[inline]
    pub fn uses_name_id(&self) -> bool {
        matches!(self, Self::Segmented(_))
    }

    /// Derive the retrieval name for `segment_id` under this constructor.
    pub fn name_for(&self, segment_id: Option<u64>) -> Result<Option<Name>, NameError> {
        match self {
            Self::Hashed => Ok(None),
            Self::Prefix(name) => Ok(Some(name.clone())),
            Self::Segmented(prefix) => match segment_id {
                Some(id) => Ok(Some(prefix.with_segment_id(id))),
                None => Err(NameError::MissingSegmentId(0)),
            },
        }
    }

    /// Worst-case wire length of a name derived under this constructor.
    pub fn max_name_len(&self) -> usize {
        match self {
            Self::Hashed => 0,
            Self::Prefix(name) => name.wire_len(),
            // Prefix plus a segment-id component holding a full u64.
            Self::Segmented(prefix) => prefix.wire_len() + TLV_HEADER_LEN + 8,
        }
    }
}

impl fmt::Display for NameConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hashed => f.write_str("hashed"),
            Self::Prefix(name) => write!(f, "prefix {name}"),
            Self::Segmented(name) => write!(f, "segmented {name}"),
        }
    }
}

/// A numbered constructor definition, as carried in node metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcDef {
    pub id: u64,
    pub constructor: NameConstructor,
}

impl NcDef {
    pub fn new(id: u64, constructor: NameConstructor) -> Self {
        Self { id, constructor }
    }

    fn encode_fields(&self) -> Vec<u8> {
        let mut value = Vec::new();
        push_tlv(&mut value, T_NC_ID, &encode_uint(self.id));
        match &self.constructor {
            NameConstructor::Hashed => push_tlv(&mut value, T_NC_HASHED, &[]),
            NameConstructor::Prefix(name) => {
                let mut inner = Vec::new();
                name.encode_into(&mut inner);
                push_tlv(&mut value, T_NC_PREFIX, &inner);
            }
            NameConstructor::Segmented(name) => {
                let mut inner = Vec::new();
                name.encode_into(&mut inner);
                push_tlv(&mut value, T_NC_SEGMENTED, &inner);
            }
        }
        value
    }

    pub fn wire_len(&self) -> usize {
        TLV_HEADER_LEN + self.encode_fields().len()
    }

    /// Encode as a TLV of type `envelope` (the node-metadata field type).
    pub fn encode_into(&self, envelope: u16, out: &mut Vec<u8>) {
        push_tlv(out, envelope, &self.encode_fields());
    }

    /// Decode from the value bytes of a definition TLV.
    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let id = decode_uint(reader.expect(T_NC_ID)?)?;
        let (typ, inner) = reader.next()?;
        reader.finish("name constructor definition")?;
        let constructor = match typ {
            T_NC_HASHED => {
                if !inner.is_empty() {
                    return Err(CodecError::InvalidLength {
                        what: "hashed constructor",
                        len: inner.len(),
                    });
                }
                NameConstructor::Hashed
            }
            T_NC_PREFIX => NameConstructor::Prefix(decode_name(inner)?),
            T_NC_SEGMENTED => NameConstructor::Segmented(decode_name(inner)?),
            other => {
                return Err(CodecError::UnknownType {
                    found: other,
                    context: "name constructor",
                })
            }
        };
        Ok(Self { id, constructor })
    }
}

fn decode_name(value: &[u8]) -> Result<Name, CodecError> {
    let mut reader = TlvReader::new(value);
    let v = reader.expect(crate::name::T_NAME)?;
    reader.finish("constructor name")?;
    Name::decode_value(v)
}

/// Id-to-constructor table active for one branch of a tree.
///
/// Cloning is the scoping mechanism: traversal and building fork the table
/// when a node introduces new definitions, leaving sibling and ancestor
/// branches on the table they already hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorTable {
    entries: BTreeMap<u64, NameConstructor>,
}

impl Default for ConstructorTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(DEFAULT_NC_ID, NameConstructor::Hashed);
        Self { entries }
    }
}

impl ConstructorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defs(defs: &[NcDef]) -> Self {
        Self::default().fork_with(defs)
    }

    /// Independent copy of this table with `defs` applied on top.
    pub fn fork_with(&self, defs: &[NcDef]) -> Self {
        let mut forked = self.clone();
        for def in defs {
            forked
                .entries
                .insert(def.id, def.constructor.clone());
        }
        forked
    }

    pub fn get(&self, id: u64) -> Result<&NameConstructor, NameError> {
        self.entries.get(&id).ok_or(NameError::UnknownId(id))
    }

    /// Whether names under `id` embed a numeric segment id.
    pub fn uses_name_id(&self, id: u64) -> Result<bool, NameError> {
        Ok(self.get(id)?.uses_name_id())
    }

    /// Derive the retrieval name for a pointer under constructor `id`.
    pub fn resolve(&self, id: u64, segment_id: Option<u64>) -> Result<Option<Name>, NameError> {
        match self.get(id)?.name_for(segment_id) {
            Err(NameError::MissingSegmentId(_)) => Err(NameError::MissingSegmentId(id)),
            other => other,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T_ENVELOPE: u16 = 0x0004;

    fn roundtrip(def: &NcDef) -> NcDef {
        let mut buf = Vec::new();
        def.encode_into(T_ENVELOPE, &mut buf);
        assert_eq!(buf.len(), def.wire_len());
        let (tlv, _) = crate::tlv::Tlv::decode(&buf).unwrap();
        assert_eq!(tlv.typ(), T_ENVELOPE);
        NcDef::decode_value(tlv.value()).unwrap()
    }

    #[test]
    fn def_roundtrips() {
        for def in [
            NcDef::new(0, NameConstructor::Hashed),
            NcDef::new(1, NameConstructor::Prefix("/a/b".parse().unwrap())),
            NcDef::new(2, NameConstructor::Segmented("/c".parse().unwrap())),
        ] {
            assert_eq!(roundtrip(&def), def);
        }
    }

    #[test]
    fn resolve_per_scheme() {
        let table = ConstructorTable::from_defs(&[
            NcDef::new(1, NameConstructor::Prefix("/fixed".parse().unwrap())),
            NcDef::new(2, NameConstructor::Segmented("/seg".parse().unwrap())),
        ]);

        assert_eq!(table.resolve(DEFAULT_NC_ID, None).unwrap(), None);
        assert_eq!(
            table.resolve(1, None).unwrap(),
            Some("/fixed".parse().unwrap())
        );
        assert_eq!(
            table.resolve(2, Some(9)).unwrap(),
            Some("/seg/seg=9".parse().unwrap())
        );
        assert_eq!(
            table.resolve(2, None).unwrap_err(),
            NameError::MissingSegmentId(2)
        );
        assert_eq!(table.resolve(7, None).unwrap_err(), NameError::UnknownId(7));
    }

    #[test]
    fn uses_name_id_only_for_segmented() {
        let table = ConstructorTable::from_defs(&[
            NcDef::new(1, NameConstructor::Prefix("/p".parse().unwrap())),
            NcDef::new(2, NameConstructor::Segmented("/s".parse().unwrap())),
        ]);
        assert!(!table.uses_name_id(0).unwrap());
        assert!(!table.uses_name_id(1).unwrap());
        assert!(table.uses_name_id(2).unwrap());
    }

    #[test]
    fn fork_is_scoped() {
        let base = ConstructorTable::from_defs(&[NcDef::new(
            1,
            NameConstructor::Prefix("/old".parse().unwrap()),
        )]);

        let forked = base.fork_with(&[NcDef::new(
            1,
            NameConstructor::Prefix("/new".parse().unwrap()),
        )]);

        // The fork sees the override; the parent is untouched.
        assert_eq!(
            forked.resolve(1, None).unwrap(),
            Some("/new".parse().unwrap())
        );
        assert_eq!(
            base.resolve(1, None).unwrap(),
            Some("/old".parse().unwrap())
        );
    }

    #[test]
    fn segmented_max_name_len_bounds_real_names() {
        let prefix: Name = "/video/stream".parse().unwrap();
        let ctor = NameConstructor::Segmented(prefix.clone());
        for id in [0u64, 1, u32::MAX as u64, u64::MAX] {
            let name = ctor.name_for(Some(id)).unwrap().unwrap();
            assert!(name.wire_len() <= ctor.max_name_len());
        }
    }
}
