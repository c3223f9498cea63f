// src/packet/content.rs

//! Content objects
//!
//! A packet is a fixed header followed by a body TLV (optional name,
//! payload type, payload) and an optional validation-algorithm /
//! validation-payload pair. The content-addressing digest is SHA-256 over
//! body ∥ validation-algorithm ∥ validation-payload; it is computed once at
//! construction and is what pointer lists reference. Packets are immutable:
//! every constructor produces the final wire bytes, and changing anything
//! means building a new packet.

use crate::crypto::Signer;
use crate::digest::Digest;
use crate::name::{Name, T_NAME};
use crate::packet::header::{FixedHeader, PacketType, FIXED_HEADER_LEN};
use crate::packet::validation::{ValidationAlg, T_VALIDATION_ALG, T_VALIDATION_PAYLOAD};
use crate::packet::PayloadType;
use crate::tlv::{push_tlv, read_u8, CodecError, TlvReader};

/// Body TLV wrapping one content object.
pub const T_OBJECT: u16 = 0x0002;
/// Payload bytes.
pub const T_PAYLOAD: u16 = 0x0001;
/// Payload type discriminator (one byte).
pub const T_PAYLOAD_TYPE: u16 = 0x0005;

/// An immutable, content-addressed wire packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    name: Option<Name>,
    payload_type: PayloadType,
    payload: Vec<u8>,
    validation: Option<(ValidationAlg, Vec<u8>)>,
    digest: Digest,
    wire: Vec<u8>,
    /// End of the signed region (body ∥ validation-alg) within `wire`.
    signed_end: usize,
}

impl Packet {
    /// Build an unsigned packet.
    pub fn new(
        name: Option<Name>,
        payload_type: PayloadType,
        payload: Vec<u8>,
    ) -> Result<Self, CodecError> {
        Self::assemble(name, payload_type, payload, None)
    }

    /// Build a data packet.
    pub fn data(name: Option<Name>, payload: Vec<u8>) -> Result<Self, CodecError> {
        Self::new(name, PayloadType::Data, payload)
    }

    /// Build a packet signed by `signer`. The signature covers the body
    /// and the validation-algorithm descriptor.
    pub fn signed(
        name: Option<Name>,
        payload_type: PayloadType,
        payload: Vec<u8>,
        signer: &dyn Signer,
    ) -> crate::Result<Self> {
        let alg = signer.validation_alg();
        let body = Self::encode_body(&name, payload_type, &payload)?;

        let mut signed_region = body.clone();
        alg.encode_into(&mut signed_region);
        let sig = signer.sign(&signed_region)?;

        Ok(Self::finish_wire(
            name,
            payload_type,
            payload,
            body,
            Some((alg, sig)),
        )?)
    }

    fn assemble(
        name: Option<Name>,
        payload_type: PayloadType,
        payload: Vec<u8>,
        validation: Option<(ValidationAlg, Vec<u8>)>,
    ) -> Result<Self, CodecError> {
        let body = Self::encode_body(&name, payload_type, &payload)?;
        Self::finish_wire(name, payload_type, payload, body, validation)
    }

    fn encode_body(
        name: &Option<Name>,
        payload_type: PayloadType,
        payload: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        if payload.len() > u16::MAX as usize {
            return Err(CodecError::ValueTooLong { len: payload.len() });
        }
        let mut object = Vec::new();
        if let Some(name) = name {
            name.encode_into(&mut object);
        }
        push_tlv(&mut object, T_PAYLOAD_TYPE, &[payload_type as u8]);
        push_tlv(&mut object, T_PAYLOAD, payload);
        if object.len() > u16::MAX as usize {
            return Err(CodecError::ValueTooLong { len: object.len() });
        }

        let mut body = Vec::new();
        push_tlv(&mut body, T_OBJECT, &object);
        Ok(body)
    }

    fn finish_wire(
        name: Option<Name>,
        payload_type: PayloadType,
        payload: Vec<u8>,
        body: Vec<u8>,
        validation: Option<(ValidationAlg, Vec<u8>)>,
    ) -> Result<Self, CodecError> {
        let mut tail = body;
        let signed_end;
        if let Some((alg, sig)) = &validation {
            alg.encode_into(&mut tail);
            signed_end = FIXED_HEADER_LEN + tail.len();
            push_tlv(&mut tail, T_VALIDATION_PAYLOAD, sig);
        } else {
            signed_end = FIXED_HEADER_LEN + tail.len();
        }

        let digest = Digest::sha256_of(&tail);
        let total = FIXED_HEADER_LEN + tail.len();
        let header = FixedHeader::new(PacketType::Content, total)?;

        let mut wire = Vec::with_capacity(total);
        header.encode_into(&mut wire);
        wire.extend_from_slice(&tail);

        Ok(Self {
            name,
            payload_type,
            payload,
            validation,
            digest,
            wire,
            signed_end,
        })
    }

    /// Decode a packet from its wire bytes. Trailing bytes beyond the
    /// declared packet length are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let header = FixedHeader::decode(bytes)?;
        if bytes.len() != header.packet_length as usize {
            return Err(CodecError::TrailingBytes {
                count: bytes.len() - header.packet_length as usize,
                context: "packet",
            });
        }
        let tail = &bytes[FIXED_HEADER_LEN..];

        let mut reader = TlvReader::new(tail);
        let object = reader.expect(T_OBJECT)?;
        let body_end = FIXED_HEADER_LEN + (tail.len() - reader.remaining());

        let validation = match reader.next_if(T_VALIDATION_ALG)? {
            Some(alg_value) => {
                let alg = ValidationAlg::decode_value(alg_value)?;
                let sig = reader
                    .expect(T_VALIDATION_PAYLOAD)
                    .map_err(|_| CodecError::MissingField("validation payload"))?;
                Some((alg, sig.to_vec()))
            }
            None => None,
        };
        reader.finish("packet")?;

        let signed_end = match &validation {
            Some((_, sig)) => bytes.len() - (crate::tlv::TLV_HEADER_LEN + sig.len()),
            None => body_end,
        };

        // Body contents: optional name, payload type, payload.
        let mut fields = TlvReader::new(object);
        let name = match fields.next_if(T_NAME)? {
            Some(value) => Some(Name::decode_value(value)?),
            None => None,
        };
        let payload_type = PayloadType::from_wire(read_u8(fields.expect(T_PAYLOAD_TYPE)?)?)?;
        let payload = fields.expect(T_PAYLOAD)?.to_vec();
        fields.finish("content object")?;

        let digest = Digest::sha256_of(tail);

        Ok(Self {
            name,
            payload_type,
            payload,
            validation,
            digest,
            wire: bytes.to_vec(),
            signed_end,
        })
    }

    #[inline]
    pub fn name(&self) -> Option<&Name> {
        self.name.as_ref()
    }

    #[inline]
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn validation(&self) -> Option<(&ValidationAlg, &[u8])> {
        self.validation.as_ref().map(|(a, p)| (a, p.as_slice()))
    }

    /// Content-addressing digest over body ∥ validation bytes.
    #[inline]
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Complete wire encoding, fixed header included.
    #[inline]
    pub fn wire_bytes(&self) -> &[u8] {
        &self.wire
    }

    #[inline]
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// The region a signature covers: body ∥ validation-algorithm.
    #[inline]
    pub fn signed_bytes(&self) -> &[u8] {
        &self.wire[FIXED_HEADER_LEN..self.signed_end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_roundtrip() {
        let name: Name = "/demo/object".parse().unwrap();
        let packet = Packet::new(Some(name.clone()), PayloadType::Data, b"payload".to_vec())
            .unwrap();

        let back = Packet::decode(packet.wire_bytes()).unwrap();
        assert_eq!(back, packet);
        assert_eq!(back.name(), Some(&name));
        assert_eq!(back.payload(), b"payload");
        assert_eq!(back.payload_type(), PayloadType::Data);
        assert_eq!(back.digest(), packet.digest());
        assert!(back.validation().is_none());
    }

    #[test]
    fn nameless_packet_roundtrip() {
        let packet = Packet::data(None, vec![1, 2, 3]).unwrap();
        let back = Packet::decode(packet.wire_bytes()).unwrap();
        assert!(back.name().is_none());
        assert_eq!(back.wire_bytes(), packet.wire_bytes());
    }

    #[test]
    fn digest_covers_payload() {
        let a = Packet::data(None, vec![0; 8]).unwrap();
        let b = Packet::data(None, vec![1; 8]).unwrap();
        assert_ne!(a.digest(), b.digest());

        // Same content twice addresses identically.
        let c = Packet::data(None, vec![0; 8]).unwrap();
        assert_eq!(a.digest(), c.digest());
        assert_eq!(a.wire_bytes(), c.wire_bytes());
    }

    #[test]
    fn empty_payload_allowed() {
        let packet = Packet::data(None, Vec::new()).unwrap();
        let back = Packet::decode(packet.wire_bytes()).unwrap();
        assert!(back.payload().is_empty());
    }

    #[test]
    fn validation_payload_without_alg_rejected() {
        let packet = Packet::data(None, b"x".to_vec()).unwrap();
        // Splice a bare validation-payload TLV onto the wire bytes.
        let mut bytes = packet.wire_bytes().to_vec();
        push_tlv(&mut bytes, T_VALIDATION_PAYLOAD, b"sig");
        let new_len = bytes.len() as u16;
        bytes[2..4].copy_from_slice(&new_len.to_be_bytes());
        assert!(Packet::decode(&bytes).is_err());
    }

    #[test]
    fn truncated_packet_rejected() {
        let packet = Packet::data(None, b"hello".to_vec()).unwrap();
        let bytes = packet.wire_bytes();
        assert!(Packet::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn payload_type_survives() {
        let packet = Packet::new(None, PayloadType::Manifest, b"m".to_vec()).unwrap();
        let back = Packet::decode(packet.wire_bytes()).unwrap();
        assert_eq!(back.payload_type(), PayloadType::Manifest);
    }
}
