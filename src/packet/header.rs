// src/packet/header.rs

//! Fixed 8-byte packet header
//!
//! Layout: `version:u8=1, packet_type:u8, packet_length:u16-be,
//! fields:3 bytes, header_length:u8=8`. The three `fields` bytes are
//! reserved and must be zero on the wire.

use crate::tlv::CodecError;

/// Wire format version carried in byte 0.
pub const WIRE_VERSION: u8 = 1;
/// Serialized header length in bytes.
pub const FIXED_HEADER_LEN: usize = 8;

/// Packet type carried in byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Content = 1,
}

impl PacketType {
    pub fn from_wire(b: u8) -> Result<Self, CodecError> {
        match b {
            1 => Ok(Self::Content),
            other => Err(CodecError::UnknownType {
                found: other as u16,
                context: "packet type",
            }),
        }
    }
}

/// Decoded fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    /// Total packet length, header included.
    pub packet_length: u16,
}

impl FixedHeader {
    pub fn new(packet_type: PacketType, packet_length: usize) -> Result<Self, CodecError> {
        let packet_length = u16::try_from(packet_length)
            .map_err(|_| CodecError::ValueTooLong { len: packet_length })?;
        Ok(Self {
            packet_type,
            packet_length,
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(WIRE_VERSION);
        out.push(self.packet_type as u8);
        out.extend_from_slice(&self.packet_length.to_be_bytes());
        out.extend_from_slice(&[0, 0, 0]);
        out.push(FIXED_HEADER_LEN as u8);
    }

    /// Decode the header at the front of `bytes` and cross-check the
    /// declared packet length against the buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: FIXED_HEADER_LEN,
                remaining: bytes.len(),
            });
        }
        if bytes[0] != WIRE_VERSION {
            return Err(CodecError::InvalidValue(format!(
                "unsupported wire version {}",
                bytes[0]
            )));
        }
        let packet_type = PacketType::from_wire(bytes[1])?;
        let packet_length = u16::from_be_bytes([bytes[2], bytes[3]]);
        if bytes[7] as usize != FIXED_HEADER_LEN {
            return Err(CodecError::InvalidValue(format!(
                "unsupported header length {}",
                bytes[7]
            )));
        }
        if (packet_length as usize) < FIXED_HEADER_LEN {
            return Err(CodecError::InvalidValue(format!(
                "packet length {packet_length} shorter than its header"
            )));
        }
        if packet_length as usize > bytes.len() {
            return Err(CodecError::LengthOverrun {
                declared: packet_length as usize,
                remaining: bytes.len(),
            });
        }
        Ok(Self {
            packet_type,
            packet_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let header = FixedHeader::new(PacketType::Content, 100).unwrap();
        let mut buf = Vec::new();
        header.encode_into(&mut buf);
        assert_eq!(buf, vec![1, 1, 0, 100, 0, 0, 0, 8]);
    }

    #[test]
    fn decode_roundtrip() {
        let header = FixedHeader::new(PacketType::Content, 8).unwrap();
        let mut buf = Vec::new();
        header.encode_into(&mut buf);
        assert_eq!(FixedHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn bad_version_rejected() {
        let buf = vec![2, 1, 0, 8, 0, 0, 0, 8];
        assert!(FixedHeader::decode(&buf).is_err());
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(matches!(
            FixedHeader::decode(&[1, 1, 0]).unwrap_err(),
            CodecError::Truncated { .. }
        ));
    }

    #[test]
    fn declared_length_beyond_buffer_rejected() {
        let buf = vec![1, 1, 0, 200, 0, 0, 0, 8];
        assert!(matches!(
            FixedHeader::decode(&buf).unwrap_err(),
            CodecError::LengthOverrun { .. }
        ));
    }
}
