// src/digest.rs

//! Content digests used as pointer values
//!
//! Every packet is addressed by the SHA-256 digest of its authenticated
//! bytes, and every pointer in a manifest carries such a digest. A digest
//! serializes as a TLV whose type number is the algorithm tag, so equality
//! and hashing over the struct's fields are equality and hashing over the
//! serialized bytes.

use crate::tlv::{push_tlv, CodecError, TLV_HEADER_LEN};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::{self, Read};

/// Digest algorithms understood on the wire.
///
/// The enum is closed: an unknown algorithm tag is a parse error, not a
/// passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DigestAlgorithm {
    /// SHA-256, the only algorithm currently defined.
    #[default]
    Sha256,
}

impl DigestAlgorithm {
    /// TLV type number carrying a digest of this algorithm.
    #[inline]
    pub const fn wire_type(&self) -> u16 {
        match self {
            Self::Sha256 => 0x0001,
        }
    }

    /// Digest output length in bytes.
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    pub fn from_wire_type(typ: u16) -> Result<Self, CodecError> {
        match typ {
            0x0001 => Ok(Self::Sha256),
            other => Err(CodecError::UnknownType {
                found: other,
                context: "digest algorithm",
            }),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An algorithm tag plus the raw digest bytes.
///
/// Immutable once constructed; used as a map key and as the pointer value
/// inside hash groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    bytes: Vec<u8>,
}

impl Digest {
    /// Wrap raw digest bytes, validating the length for the algorithm.
    pub fn new(algorithm: DigestAlgorithm, bytes: Vec<u8>) -> Result<Self, CodecError> {
        if bytes.len() != algorithm.output_len() {
            return Err(CodecError::InvalidLength {
                what: "digest value",
                len: bytes.len(),
            });
        }
        Ok(Self { algorithm, bytes })
    }

    /// SHA-256 of `data`.
    pub fn sha256_of(data: &[u8]) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            bytes: Sha256::digest(data).to_vec(),
        }
    }

    #[inline]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Full hex rendering of the digest value.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse a digest from its hex rendering.
    pub fn from_hex(algorithm: DigestAlgorithm, s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CodecError::InvalidValue(format!("bad digest hex: {e}")))?;
        Self::new(algorithm, bytes)
    }

    /// Abbreviated hex, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.bytes[..6.min(self.bytes.len())])
    }

    /// Serialized length as a TLV (header + value).
    #[inline]
    pub fn wire_len(&self) -> usize {
        TLV_HEADER_LEN + self.bytes.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        push_tlv(out, self.algorithm.wire_type(), &self.bytes);
    }

    /// Decode from a TLV whose type number is the algorithm tag.
    pub fn from_tlv(typ: u16, value: &[u8]) -> Result<Self, CodecError> {
        let algorithm = DigestAlgorithm::from_wire_type(typ)?;
        Self::new(algorithm, value.to_vec())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// Incremental SHA-256 over a stream, tracking the byte count alongside.
///
/// The chunker runs one of these across the whole input so the root
/// manifest can record the stream's overall size and digest.
#[derive(Default)]
pub struct StreamDigester {
    hasher: Sha256,
    bytes: u64,
}

impl StreamDigester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    #[inline]
    pub fn bytes_seen(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> (Digest, u64) {
        let digest = Digest {
            algorithm: DigestAlgorithm::Sha256,
            bytes: self.hasher.finalize().to_vec(),
        };
        (digest, self.bytes)
    }
}

/// Hash an entire reader, streaming in 8 KiB blocks.
pub fn digest_reader<R: Read>(reader: &mut R) -> io::Result<(Digest, u64)> {
    let mut digester = StreamDigester::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
    }
    Ok(digester.finalize())
}
