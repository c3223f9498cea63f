// src/name.rs

//! Hierarchical packet names
//!
//! A name is an ordered list of components: opaque byte strings plus an
//! optional numeric segment-id suffix used by segmented naming schemes.
//! Names render as `/`-joined paths (`/video/part/seg=17`) and serialize
//! as a name TLV containing one TLV per component.

use crate::tlv::{decode_uint, encode_uint, push_tlv, CodecError, TlvReader, TLV_HEADER_LEN};
use std::fmt;
use std::str::FromStr;

/// TLV type of a whole name.
pub const T_NAME: u16 = 0x0000;
/// Generic (opaque bytes) name component.
pub const T_NAME_COMPONENT: u16 = 0x0001;
/// Numeric segment-id component, used as a naming suffix.
pub const T_SEGMENT_ID: u16 = 0x0010;

/// One component of a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameComponent {
    Generic(Vec<u8>),
    SegmentId(u64),
}

impl NameComponent {
    fn wire_len(&self) -> usize {
        TLV_HEADER_LEN
            + match self {
                Self::Generic(bytes) => bytes.len(),
                Self::SegmentId(id) => encode_uint(*id).len(),
            }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Generic(bytes) => push_tlv(out, T_NAME_COMPONENT, bytes),
            Self::SegmentId(id) => push_tlv(out, T_SEGMENT_ID, &encode_uint(*id)),
        }
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) if !s.is_empty() && s.chars().all(|c| !c.is_control() && c != '/') => {
                    f.write_str(s)
                }
                _ => write!(f, "0x{}", hex::encode(bytes)),
            },
            Self::SegmentId(id) => write!(f, "seg={id}"),
        }
    }
}

/// An ordered, possibly empty list of name components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    pub fn new(components: Vec<NameComponent>) -> Self {
        Self { components }
    }

    /// Build a name from UTF-8 path segments.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        Self {
            components: segments
                .iter()
                .map(|s| NameComponent::Generic(s.as_ref().as_bytes().to_vec()))
                .collect(),
        }
    }

    #[inline]
    pub fn components(&self) -> &[NameComponent] {
        &self.components
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Copy of this name with a segment-id component appended.
    pub fn with_segment_id(&self, id: u64) -> Self {
        let mut components = self.components.clone();
        components.push(NameComponent::SegmentId(id));
        Self { components }
    }

    /// Trailing segment id, if the name ends in one.
    pub fn segment_id(&self) -> Option<u64> {
        match self.components.last() {
            Some(NameComponent::SegmentId(id)) => Some(*id),
            _ => None,
        }
    }

    /// Serialized length as a name TLV.
    pub fn wire_len(&self) -> usize {
        TLV_HEADER_LEN + self.components.iter().map(NameComponent::wire_len).sum::<usize>()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let mut value = Vec::new();
        for c in &self.components {
            c.encode_into(&mut value);
        }
        push_tlv(out, T_NAME, &value);
    }

    /// Decode from the value bytes of a name TLV.
    pub fn decode_value(value: &[u8]) -> Result<Self, CodecError> {
        let mut reader = TlvReader::new(value);
        let mut components = Vec::new();
        while let Some(typ) = reader.peek_type()? {
            let (_, v) = reader.next()?;
            match typ {
                T_NAME_COMPONENT => components.push(NameComponent::Generic(v.to_vec())),
                T_SEGMENT_ID => components.push(NameComponent::SegmentId(decode_uint(v)?)),
                other => {
                    return Err(CodecError::UnknownType {
                        found: other,
                        context: "name component",
                    })
                }
            }
        }
        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for c in &self.components {
            write!(f, "/{c}")?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = CodecError;

    /// Parse a `/`-joined path. A trailing `seg=N` parses as a segment id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.starts_with('/') {
            return Err(CodecError::InvalidValue(format!(
                "name must start with '/': {s:?}"
            )));
        }
        let mut components = Vec::new();
        for part in trimmed.split('/').filter(|p| !p.is_empty()) {
            if let Some(id) = part.strip_prefix("seg=") {
                let id = id
                    .parse::<u64>()
                    .map_err(|_| CodecError::InvalidValue(format!("bad segment id: {part:?}")))?;
                components.push(NameComponent::SegmentId(id));
            } else {
                components.push(NameComponent::Generic(part.as_bytes().to_vec()));
            }
        }
        Ok(Self { components })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::Tlv;

    #[test]
    fn display_and_parse() {
        let name: Name = "/video/part".parse().unwrap();
        assert_eq!(name.to_string(), "/video/part");
        assert_eq!(name.components().len(), 2);

        let with_seg = name.with_segment_id(17);
        assert_eq!(with_seg.to_string(), "/video/part/seg=17");
        assert_eq!(with_seg.segment_id(), Some(17));
        assert_eq!(with_seg, "/video/part/seg=17".parse().unwrap());
    }

    #[test]
    fn rejects_relative_paths() {
        assert!("video/part".parse::<Name>().is_err());
    }

    #[test]
    fn tlv_roundtrip_bytes() {
        let name = Name::from_segments(&["a", "bb"]).with_segment_id(300);
        let mut buf = Vec::new();
        name.encode_into(&mut buf);
        assert_eq!(buf.len(), name.wire_len());

        let (tlv, used) = Tlv::decode(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(tlv.typ(), T_NAME);
        let back = Name::decode_value(tlv.value()).unwrap();

        let mut again = Vec::new();
        back.encode_into(&mut again);
        assert_eq!(again, buf);
    }

    #[test]
    fn empty_name_roundtrip() {
        let name = Name::default();
        let mut buf = Vec::new();
        name.encode_into(&mut buf);
        let (tlv, _) = Tlv::decode(&buf).unwrap();
        assert_eq!(Name::decode_value(tlv.value()).unwrap(), name);
        assert_eq!(name.to_string(), "/");
    }

    #[test]
    fn unknown_component_type_rejected() {
        let mut value = Vec::new();
        push_tlv(&mut value, 0x0BAD, b"x");
        assert!(matches!(
            Name::decode_value(&value).unwrap_err(),
            CodecError::UnknownType { .. }
        ));
    }

    #[test]
    fn non_utf8_component_renders_as_hex() {
        let name = Name::new(vec![NameComponent::Generic(vec![0xFF, 0x00])]);
        assert_eq!(name.to_string(), "/0xff00");
    }
}
