// src/build/chunk.rs

//! Chunking: turning a byte stream into data packets
//!
//! A chunker splits the source stream into packet-sized pieces, writes
//! each piece to the store as a data packet named under the active data
//! naming scheme, and emits ephemeral [`ChunkMeta`] records for the tree
//! builder. The whole-stream digest and byte count are computed during the
//! same pass and end up in the root manifest's node metadata.
//!
//! Two strategies are provided: a fixed-size splitter (the default; the
//! optimizer's packed-tree predictions assume it) and a FastCDC
//! content-defined splitter whose chunk boundaries survive insertions,
//! which makes re-published streams share most of their data packets.

use crate::build::BuildError;
use crate::digest::{Digest, StreamDigester};
use crate::manifest::NameConstructor;
use crate::name::Name;
use crate::packet::Packet;
use crate::store::PacketStore;
use fastcdc::v2020::FastCDC;
use std::io::Read;
use tracing::debug;

/// Builder-internal record for one data packet. Produced while splitting
/// the source stream, consumed once by the tree builder, never persisted.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    /// Position in the stream, used as the segment id under segmented
    /// naming.
    pub ordinal: u64,
    /// Payload byte count.
    pub size: u64,
    /// Content digest of the data packet.
    pub digest: Digest,
    /// Retrieval name, when the data scheme names packets.
    pub name: Option<Name>,
}

/// Everything the tree builder needs from one chunking pass.
#[derive(Debug)]
pub struct ChunkedStream {
    pub chunks: Vec<ChunkMeta>,
    pub total_size: u64,
    pub stream_digest: Digest,
}

impl ChunkedStream {
    #[inline]
    pub fn chunk_count(&self) -> u64 {
        self.chunks.len() as u64
    }
}

/// Splits a stream into data packets through a store.
pub trait Chunker {
    fn chunk(
        &self,
        input: &mut dyn Read,
        data_scheme: &NameConstructor,
        store: &mut dyn PacketStore,
    ) -> crate::Result<ChunkedStream>;
}

/// Maximum data payload per packet for `max_packet_size`, accounting for
/// the envelope and the worst-case name the scheme can produce.
pub fn max_chunk_payload(
    max_packet_size: usize,
    data_scheme: &NameConstructor,
) -> crate::Result<usize> {
    // An empty packet with the longest possible name measures the fixed
    // per-packet overhead exactly.
    let worst_name = match data_scheme {
        NameConstructor::Hashed => None,
        NameConstructor::Prefix(name) => Some(name.clone()),
        NameConstructor::Segmented(prefix) => Some(prefix.with_segment_id(u64::MAX)),
    };
    let probe = Packet::data(worst_name, Vec::new())?;
    let overhead = probe.wire_len();
    if max_packet_size <= overhead {
        return Err(BuildError::BudgetTooSmall {
            budget: max_packet_size,
            overhead,
        }
        .into());
    }
    Ok(max_packet_size - overhead)
}

fn emit_chunk(
    payload: Vec<u8>,
    ordinal: u64,
    data_scheme: &NameConstructor,
    store: &mut dyn PacketStore,
) -> crate::Result<ChunkMeta> {
    let name = data_scheme.name_for(Some(ordinal))?;
    let size = payload.len() as u64;
    let packet = Packet::data(name.clone(), payload)?;
    store.put(&packet)?;
    Ok(ChunkMeta {
        ordinal,
        size,
        digest: packet.digest().clone(),
        name,
    })
}

/// Fixed-size splitter. Every chunk except the last is exactly
/// `payload_size` bytes.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeChunker {
    payload_size: usize,
}

impl FixedSizeChunker {
    pub fn new(payload_size: usize) -> crate::Result<Self> {
        if payload_size == 0 {
            return Err(BuildError::BudgetTooSmall {
                budget: 0,
                overhead: 0,
            }
            .into());
        }
        Ok(Self { payload_size })
    }

    /// Size chunks to fill `max_packet_size` packets under `data_scheme`.
    pub fn for_budget(
        max_packet_size: usize,
        data_scheme: &NameConstructor,
    ) -> crate::Result<Self> {
        Self::new(max_chunk_payload(max_packet_size, data_scheme)?)
    }

    #[inline]
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(
        &self,
        input: &mut dyn Read,
        data_scheme: &NameConstructor,
        store: &mut dyn PacketStore,
    ) -> crate::Result<ChunkedStream> {
        let mut digester = StreamDigester::new();
        let mut chunks = Vec::new();
        let mut buf = vec![0u8; self.payload_size];

        loop {
            // Fill a whole chunk if the reader has the bytes for it.
            let mut filled = 0;
            while filled < buf.len() {
                let n = input.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            digester.update(&buf[..filled]);
            chunks.push(emit_chunk(
                buf[..filled].to_vec(),
                chunks.len() as u64,
                data_scheme,
                store,
            )?);
            if filled < buf.len() {
                break;
            }
        }

        // An empty stream still gets one (empty) data packet so the tree
        // has a pointer to hang on to.
        if chunks.is_empty() {
            chunks.push(emit_chunk(Vec::new(), 0, data_scheme, store)?);
        }

        let (stream_digest, total_size) = digester.finalize();
        debug!(
            chunks = chunks.len(),
            bytes = total_size,
            "chunked stream (fixed size)"
        );
        Ok(ChunkedStream {
            chunks,
            total_size,
            stream_digest,
        })
    }
}

/// FastCDC content-defined splitter.
///
/// Boundaries are chosen from the content, so a small edit to the source
/// stream changes only the chunks around the edit. The maximum chunk size
/// is clamped to the packet budget by [`for_budget`](Self::for_budget).
#[derive(Debug, Clone, Copy)]
pub struct CdcChunker {
    min_size: u32,
    avg_size: u32,
    max_size: u32,
}

impl CdcChunker {
    /// Smallest minimum chunk size the CDC algorithm accepts.
    pub const MIN_FLOOR: u32 = 64;
    /// Smallest average chunk size the CDC algorithm accepts.
    pub const AVG_FLOOR: u32 = 256;
    /// Smallest maximum chunk size the CDC algorithm accepts.
    pub const MAX_FLOOR: u32 = 1024;

    pub fn new(min_size: u32, avg_size: u32, max_size: u32) -> crate::Result<Self> {
        if !(min_size <= avg_size && avg_size <= max_size)
            || min_size < Self::MIN_FLOOR
            || avg_size < Self::AVG_FLOOR
            || max_size < Self::MAX_FLOOR
        {
            return Err(BuildError::InvalidOptions(format!(
                "cdc sizes must satisfy {}/{}/{} ≤ min ≤ avg ≤ max, got \
                 {min_size}/{avg_size}/{max_size}",
                Self::MIN_FLOOR,
                Self::AVG_FLOOR,
                Self::MAX_FLOOR,
            ))
            .into());
        }
        Ok(Self {
            min_size,
            avg_size,
            max_size,
        })
    }

    /// CDC sizes that keep every chunk within the packet budget: max is
    /// the packet payload, average a quarter of it, minimum a sixteenth.
    /// Budgets too small for the algorithm's floor sizes are rejected.
    pub fn for_budget(
        max_packet_size: usize,
        data_scheme: &NameConstructor,
    ) -> crate::Result<Self> {
        let max = max_chunk_payload(max_packet_size, data_scheme)? as u32;
        if max < Self::MAX_FLOOR {
            return Err(BuildError::BudgetTooSmall {
                budget: max_packet_size,
                overhead: max_packet_size - max as usize + Self::MAX_FLOOR as usize,
            }
            .into());
        }
        Self::new(
            (max / 16).max(Self::MIN_FLOOR),
            (max / 4).max(Self::AVG_FLOOR),
            max,
        )
    }
}

impl Chunker for CdcChunker {
    fn chunk(
        &self,
        input: &mut dyn Read,
        data_scheme: &NameConstructor,
        store: &mut dyn PacketStore,
    ) -> crate::Result<ChunkedStream> {
        // FastCDC needs the whole stream in memory to pick boundaries.
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;

        let mut digester = StreamDigester::new();
        digester.update(&data);

        let mut chunks = Vec::new();
        for entry in FastCDC::new(&data, self.min_size, self.avg_size, self.max_size) {
            let payload = data[entry.offset..entry.offset + entry.length].to_vec();
            chunks.push(emit_chunk(
                payload,
                chunks.len() as u64,
                data_scheme,
                store,
            )?);
        }
        if chunks.is_empty() {
            chunks.push(emit_chunk(Vec::new(), 0, data_scheme, store)?);
        }

        let (stream_digest, total_size) = digester.finalize();
        debug!(
            chunks = chunks.len(),
            bytes = total_size,
            "chunked stream (content-defined)"
        );
        Ok(ChunkedStream {
            chunks,
            total_size,
            stream_digest,
        })
    }
}
