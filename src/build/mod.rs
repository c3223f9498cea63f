// src/build/mod.rs

//! Tree construction
//!
//! Building a manifest tree is one bottom-up pass over the chunked data,
//! walked from the tail of the chunk list backward so that pointers can be
//! prepended in preorder-traversal order. The pass bootstraps with the
//! rightmost leaf manifest, then ascends one level per iteration: each new
//! interior node absorbs the previous top as its first-inserted indirect
//! pointer, reserves its own direct slots at the head of the remaining
//! range, descends right-to-left to build sibling subtrees one level down,
//! restores the reservation, and fills its direct slots from the tail.
//!
//! The finished tree is wrapped in one additional root manifest carrying
//! the stream's overall size and digest, the name-constructor definitions
//! for the subtree, and (when configured) a signature.

pub mod chunk;
mod group;
mod ids;
mod segment;
pub mod shape;

pub use chunk::{CdcChunker, ChunkMeta, ChunkedStream, Chunker, FixedSizeChunker};
pub use group::{HashGroupBuilder, HashGroupBuilderPair};
pub use ids::ManifestIdFactory;
pub use segment::Segment;
pub use shape::{optimize, TreeShape};

use crate::crypto::{NodeEncryptor, Signer};
use crate::digest::Digest;
use crate::manifest::{
    GroupMeta, HashGroup, Manifest, NameConstructor, NcDef, Node, NodeMeta, PointerList,
    POINTER_WIRE_COST,
};
use crate::name::Name;
use crate::packet::{Packet, PayloadType};
use crate::store::PacketStore;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info};

/// Default packet-size budget in bytes.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1500;

/// Construction-specific failures. Most of these signal an inconsistency
/// between the optimizer's prediction and what the builder produced, and
/// are hard errors rather than recoverable conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("no viable tree shape for {num_chunks} chunks at {pointers_per_packet} pointers per packet")]
    NoValidShape {
        num_chunks: u64,
        pointers_per_packet: usize,
    },

    #[error("packet budget {budget} cannot cover the {overhead}-byte envelope")]
    BudgetTooSmall { budget: usize, overhead: usize },

    #[error("serialized manifest is {size} bytes, over the {budget}-byte budget")]
    PacketTooLarge { size: usize, budget: usize },

    #[error("hash group is full ({capacity} pointers)")]
    GroupFull { capacity: usize },

    #[error("manifest would hold no pointers")]
    EmptyNode,

    #[error("manifest id range exhausted at depth {depth}")]
    IdOverflow { depth: u32 },

    #[error("no chunks to build a tree over")]
    NoChunks,

    #[error("invalid tree options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Codec(#[from] crate::tlv::CodecError),
}

/// Knobs for one tree build.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Upper bound on any emitted packet's wire size.
    pub max_packet_size: usize,
    /// Optional cap on pointers per manifest, on top of what the packet
    /// budget allows.
    pub max_tree_degree: Option<usize>,
    /// Naming scheme for data packets.
    pub data_scheme: NameConstructor,
    /// Naming scheme for manifest packets.
    pub manifest_scheme: NameConstructor,
    /// Name for the root manifest itself.
    pub root_name: Option<Name>,
    /// Locators advertised in the root manifest's metadata.
    pub root_locators: Vec<Name>,
    /// Record aggregate byte sizes in group metadata.
    pub group_sizes: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_tree_degree: None,
            data_scheme: NameConstructor::Hashed,
            manifest_scheme: NameConstructor::Hashed,
            root_name: None,
            root_locators: Vec::new(),
            group_sizes: true,
        }
    }
}

impl TreeOptions {
    pub fn validate(&self) -> Result<(), BuildError> {
        if matches!(self.data_scheme, NameConstructor::Segmented(_))
            && self.data_scheme == self.manifest_scheme
        {
            return Err(BuildError::InvalidOptions(
                "data and manifest packets cannot share one segmented scheme; \
                 their segment numbers would collide"
                    .to_string(),
            ));
        }
        if let Some(cap) = self.max_tree_degree {
            if cap == 0 {
                return Err(BuildError::InvalidOptions(
                    "tree degree cap must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether data and manifest pointers go into separate hash groups.
    fn split_groups(&self) -> bool {
        self.data_scheme != self.manifest_scheme
    }
}

/// Explicit counter for name-constructor ids; no process-wide state.
struct NcIdAllocator {
    next: u64,
}

impl NcIdAllocator {
    fn new() -> Self {
        // Id 0 is the implicit hash-addressed default.
        Self { next: 1 }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Constructor ids and definitions for one build.
#[derive(Debug, Clone)]
struct NamePlan {
    data_nc_id: u64,
    manifest_nc_id: u64,
    defs: Vec<NcDef>,
}

impl NamePlan {
    fn new(opts: &TreeOptions) -> Self {
        let mut alloc = NcIdAllocator::new();
        let mut defs = Vec::new();

        let data_nc_id = match &opts.data_scheme {
            NameConstructor::Hashed => 0,
            scheme => {
                let id = alloc.next_id();
                defs.push(NcDef::new(id, scheme.clone()));
                id
            }
        };
        let manifest_nc_id = if opts.split_groups() {
            match &opts.manifest_scheme {
                NameConstructor::Hashed => 0,
                scheme => {
                    let id = alloc.next_id();
                    defs.push(NcDef::new(id, scheme.clone()));
                    id
                }
            }
        } else {
            data_nc_id
        };

        Self {
            data_nc_id,
            manifest_nc_id,
            defs,
        }
    }
}

/// Measure how many pointers fit in one manifest packet under `opts`.
///
/// A probe manifest with worst-case metadata (and real encryption, when
/// configured) is encoded and its size, minus the probe pointers
/// themselves, is the fixed envelope; the remaining budget divides by the
/// per-pointer wire cost.
pub fn pointer_capacity(
    opts: &TreeOptions,
    encryptor: Option<&dyn NodeEncryptor>,
) -> crate::Result<usize> {
    opts.validate()?;
    let plan = NamePlan::new(opts);

    let probe_digest = Digest::sha256_of(b"capacity probe");
    let meta_for = |nc_id: u64| -> Option<GroupMeta> {
        if opts.group_sizes || nc_id != 0 {
            Some(GroupMeta::worst_case())
        } else {
            None
        }
    };

    let mut groups = Vec::new();
    let mut probe_pointers = 1usize;
    groups.push(HashGroup::new(
        meta_for(plan.data_nc_id),
        PointerList::new(vec![probe_digest.clone()])?,
    ));
    if opts.split_groups() {
        probe_pointers += 1;
        groups.push(HashGroup::new(
            meta_for(plan.manifest_nc_id),
            PointerList::new(vec![probe_digest])?,
        ));
    }
    let node = Node::new(None, groups)?;

    let manifest = match encryptor {
        Some(encryptor) => {
            let (ctx, enc, tag) = encryptor.encrypt(&node)?;
            Manifest::encrypted(ctx, enc, tag)
        }
        None => Manifest::plain(node),
    };

    let worst_name = match &opts.manifest_scheme {
        NameConstructor::Hashed => None,
        NameConstructor::Prefix(name) => Some(name.clone()),
        NameConstructor::Segmented(prefix) => Some(prefix.with_segment_id(u64::MAX)),
    };
    let probe = Packet::new(worst_name, PayloadType::Manifest, manifest.encode())?;

    let overhead = probe.wire_len() - probe_pointers * POINTER_WIRE_COST;
    if opts.max_packet_size <= overhead {
        return Err(BuildError::BudgetTooSmall {
            budget: opts.max_packet_size,
            overhead,
        }
        .into());
    }
    let mut capacity = (opts.max_packet_size - overhead) / POINTER_WIRE_COST;
    if let Some(cap) = opts.max_tree_degree {
        capacity = capacity.min(cap);
    }
    if capacity == 0 {
        return Err(BuildError::BudgetTooSmall {
            budget: opts.max_packet_size,
            overhead,
        }
        .into());
    }
    debug!(capacity, overhead, "measured pointer capacity");
    Ok(capacity)
}

/// What a finished build hands back.
#[derive(Debug)]
pub struct BuiltTree {
    /// The signed/named root manifest packet (also in the store).
    pub root: Packet,
    /// Shape the optimizer chose.
    pub shape: TreeShape,
    /// Data packets referenced by the tree.
    pub data_packets: u64,
    /// Manifests whose pointers are all direct.
    pub leaf_manifests: u64,
    /// Manifests holding indirect pointers, the tree top included, the
    /// root manifest excluded.
    pub interior_manifests: u64,
    /// Source stream length in bytes.
    pub stream_size: u64,
}

impl BuiltTree {
    #[inline]
    pub fn root_digest(&self) -> &Digest {
        self.root.digest()
    }

    /// Every packet the build produced, the root included.
    #[inline]
    pub fn total_packets(&self) -> u64 {
        self.data_packets + self.leaf_manifests + self.interior_manifests + 1
    }
}

/// A child manifest already emitted to the store.
struct EmittedChild {
    digest: Digest,
    /// Payload bytes reachable below the child.
    bytes: u64,
    /// Name segment id, under segmented manifest naming.
    segment_id: Option<u64>,
}

/// Single-pass bottom-up tree builder.
pub struct TreeBuilder<'a> {
    opts: &'a TreeOptions,
    shape: TreeShape,
    plan: NamePlan,
    chunks: &'a [ChunkMeta],
    seg: Segment,
    store: &'a mut dyn PacketStore,
    encryptor: Option<&'a dyn NodeEncryptor>,
    signer: Option<&'a dyn Signer>,
    ids: Option<ManifestIdFactory>,
    stream_size: u64,
    stream_digest: Digest,
    leaf_manifests: u64,
    interior_manifests: u64,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        chunked: &'a ChunkedStream,
        shape: TreeShape,
        opts: &'a TreeOptions,
        store: &'a mut dyn PacketStore,
        encryptor: Option<&'a dyn NodeEncryptor>,
        signer: Option<&'a dyn Signer>,
    ) -> crate::Result<Self> {
        opts.validate()?;
        if chunked.chunks.is_empty() {
            return Err(BuildError::NoChunks.into());
        }
        let plan = NamePlan::new(opts);
        let ids = match &opts.manifest_scheme {
            NameConstructor::Segmented(_) => Some(ManifestIdFactory::new(
                shape.indirect_per_node as u64,
                shape.height,
            )),
            _ => None,
        };
        Ok(Self {
            opts,
            shape,
            plan,
            chunks: &chunked.chunks,
            seg: Segment::new(chunked.chunks.len()),
            store,
            encryptor,
            signer,
            ids,
            stream_size: chunked.total_size,
            stream_digest: chunked.stream_digest.clone(),
            leaf_manifests: 0,
            interior_manifests: 0,
        })
    }

    /// Run the whole pass and return the root manifest.
    pub fn build(mut self) -> crate::Result<BuiltTree> {
        let mut level: u32 = 0;
        let mut top = self.leaf_manifest(level)?;
        while !self.seg.is_empty() {
            level += 1;
            top = self.interior_manifest(level, Some(top))?;
        }
        let root = self.root_manifest(top)?;

        info!(
            root = %root.digest().short_hex(),
            data = self.chunks.len(),
            leaves = self.leaf_manifests,
            interior = self.interior_manifests,
            height = level,
            "built manifest tree"
        );
        Ok(BuiltTree {
            root,
            shape: self.shape,
            data_packets: self.chunks.len() as u64,
            leaf_manifests: self.leaf_manifests,
            interior_manifests: self.interior_manifests,
            stream_size: self.stream_size,
        })
    }

    /// Build the subtree covering the rightmost remaining chunks, `level`
    /// levels above the leaves.
    fn subtree(&mut self, level: u32) -> crate::Result<EmittedChild> {
        if level == 0 || self.seg.len() <= self.shape.pointers_per_packet {
            self.leaf_manifest(level)
        } else {
            self.interior_manifest(level, None)
        }
    }

    /// Leaf manifest: up to a full packet of direct pointers from the tail.
    fn leaf_manifest(&mut self, level: u32) -> crate::Result<EmittedChild> {
        let mut pair = self.new_pair(self.shape.pointers_per_packet, 0);
        while !pair.is_direct_full() {
            let Some(index) = self.seg.pop_tail() else {
                break;
            };
            self.prepend_chunk(&mut pair, index)?;
        }
        self.emit(pair, level)
    }

    /// Interior manifest, optionally absorbing the previous level's top as
    /// its first-inserted (rightmost) indirect pointer.
    fn interior_manifest(
        &mut self,
        level: u32,
        absorb: Option<EmittedChild>,
    ) -> crate::Result<EmittedChild> {
        let mut pair = self.new_pair(
            self.shape.direct_per_node,
            self.shape.indirect_per_node,
        );
        if let Some(child) = absorb {
            pair.append_indirect(child.digest, Some(child.bytes), child.segment_id)?;
        }

        // Hold back this node's direct slots so the descent cannot starve
        // them; the top of the tree stays packed.
        let reserved = self.seg.reserve_head(self.shape.direct_per_node);
        while !pair.is_indirect_full() && !self.seg.is_empty() {
            let child = self.subtree(level - 1)?;
            pair.prepend_indirect(child.digest, Some(child.bytes), child.segment_id)?;
        }
        self.seg.restore_head(reserved);

        while !pair.is_direct_full() {
            let Some(index) = self.seg.pop_tail() else {
                break;
            };
            self.prepend_chunk(&mut pair, index)?;
        }
        self.emit(pair, level)
    }

    fn prepend_chunk(
        &self,
        pair: &mut HashGroupBuilderPair,
        index: usize,
    ) -> Result<(), BuildError> {
        let chunk = &self.chunks[index];
        let segment_id = match &self.opts.data_scheme {
            NameConstructor::Segmented(_) => Some(chunk.ordinal),
            _ => None,
        };
        pair.prepend_direct(chunk.digest.clone(), Some(chunk.size), segment_id)
    }

    fn new_pair(&self, max_direct: usize, max_indirect: usize) -> HashGroupBuilderPair {
        if self.opts.split_groups() {
            HashGroupBuilderPair::split(max_direct, max_indirect)
        } else {
            HashGroupBuilderPair::merged(max_direct, max_indirect)
        }
    }

    /// Freeze a pair into a node, wrap it as a manifest packet, and store
    /// it.
    fn emit(&mut self, pair: HashGroupBuilderPair, level: u32) -> crate::Result<EmittedChild> {
        let is_leaf = pair.indirect_len() == 0;
        let bytes = pair.total_bytes();
        let (data_meta, manifest_meta) = self.group_metas(&pair);
        let groups = pair.finish(data_meta, manifest_meta)?;
        let node = Node::new(None, groups)?;

        let (name, segment_id) = self.manifest_name(level)?;
        let packet = self.manifest_packet(node, name, false)?;
        self.store.put(&packet)?;

        if is_leaf {
            self.leaf_manifests += 1;
        } else {
            self.interior_manifests += 1;
        }
        debug!(
            digest = %packet.digest().short_hex(),
            level,
            bytes,
            leaf = is_leaf,
            "emitted manifest"
        );
        Ok(EmittedChild {
            digest: packet.digest().clone(),
            bytes,
            segment_id,
        })
    }

    fn group_metas(
        &self,
        pair: &HashGroupBuilderPair,
    ) -> (Option<GroupMeta>, Option<GroupMeta>) {
        let nc_id = |id: u64| if id != 0 { Some(id) } else { None };
        if self.opts.split_groups() {
            let data_meta = GroupMeta {
                leaf_size: self.opts.group_sizes.then(|| pair.direct_bytes()),
                subtree_size: self.opts.group_sizes.then(|| pair.direct_bytes()),
                nc_id: nc_id(self.plan.data_nc_id),
                start_segment_id: pair.direct_start_segment(),
                ..Default::default()
            };
            let manifest_meta = GroupMeta {
                subtree_size: self
                    .opts
                    .group_sizes
                    .then(|| pair.total_bytes() - pair.direct_bytes()),
                nc_id: nc_id(self.plan.manifest_nc_id),
                start_segment_id: pair.indirect_start_segment(),
                ..Default::default()
            };
            (Some(data_meta), Some(manifest_meta))
        } else {
            let merged = GroupMeta {
                leaf_size: self.opts.group_sizes.then(|| pair.direct_bytes()),
                subtree_size: self.opts.group_sizes.then(|| pair.total_bytes()),
                nc_id: nc_id(self.plan.data_nc_id),
                start_segment_id: pair.direct_start_segment(),
                ..Default::default()
            };
            (Some(merged), None)
        }
    }

    /// Name for a tree manifest at `level`, drawing a segment id from the
    /// per-depth factory under segmented naming.
    fn manifest_name(&mut self, level: u32) -> crate::Result<(Option<Name>, Option<u64>)> {
        match &self.opts.manifest_scheme {
            NameConstructor::Hashed => Ok((None, None)),
            NameConstructor::Prefix(name) => Ok((Some(name.clone()), None)),
            NameConstructor::Segmented(prefix) => {
                let factory = self.ids.as_mut().ok_or_else(|| {
                    BuildError::InvalidOptions(
                        "segmented manifest naming requires an id factory".to_string(),
                    )
                })?;
                let depth = self.shape.height.saturating_sub(level);
                let id = factory.next_id(depth)?;
                Ok((Some(prefix.with_segment_id(id)), Some(id)))
            }
        }
    }

    /// Wrap a node as a (possibly encrypted, possibly signed) manifest
    /// packet and enforce the packet budget.
    fn manifest_packet(
        &self,
        node: Node,
        name: Option<Name>,
        sign: bool,
    ) -> crate::Result<Packet> {
        let manifest = match self.encryptor {
            Some(encryptor) => {
                let (ctx, enc, tag) = encryptor.encrypt(&node)?;
                Manifest::encrypted(ctx, enc, tag)
            }
            None => Manifest::plain(node),
        };
        let payload = manifest.encode();
        let packet = match (sign, self.signer) {
            (true, Some(signer)) => {
                Packet::signed(name, PayloadType::Manifest, payload, signer)?
            }
            _ => Packet::new(name, PayloadType::Manifest, payload)?,
        };
        if packet.wire_len() > self.opts.max_packet_size {
            return Err(BuildError::PacketTooLarge {
                size: packet.wire_len(),
                budget: self.opts.max_packet_size,
            }
            .into());
        }
        Ok(packet)
    }

    /// The distinct named/signed root manifest pointing at the tree top.
    fn root_manifest(&mut self, top: EmittedChild) -> crate::Result<Packet> {
        let meta = GroupMeta {
            subtree_size: self.opts.group_sizes.then_some(top.bytes),
            nc_id: (self.plan.manifest_nc_id != 0).then_some(self.plan.manifest_nc_id),
            start_segment_id: top.segment_id,
            ..Default::default()
        };
        let group = HashGroup::new(Some(meta), PointerList::new(vec![top.digest])?);
        let node_meta = NodeMeta {
            subtree_size: Some(self.stream_size),
            subtree_digest: Some(self.stream_digest.clone()),
            locators: self.opts.root_locators.clone(),
            nc_defs: self.plan.defs.clone(),
            vendor: Vec::new(),
        };
        let node = Node::new(Some(node_meta), vec![group])?;

        let packet = self.manifest_packet(node, self.opts.root_name.clone(), true)?;
        self.store.put(&packet)?;
        Ok(packet)
    }
}

/// Chunk, optimize, and build in one call.
pub fn build_stream(
    input: &mut dyn Read,
    chunker: &dyn Chunker,
    opts: &TreeOptions,
    store: &mut dyn PacketStore,
    encryptor: Option<&dyn NodeEncryptor>,
    signer: Option<&dyn Signer>,
) -> crate::Result<BuiltTree> {
    let chunked = chunker.chunk(input, &opts.data_scheme, store)?;
    build_tree(&chunked, opts, store, encryptor, signer)
}

/// Optimize a shape for already-chunked data and build its tree.
pub fn build_tree(
    chunked: &ChunkedStream,
    opts: &TreeOptions,
    store: &mut dyn PacketStore,
    encryptor: Option<&dyn NodeEncryptor>,
    signer: Option<&dyn Signer>,
) -> crate::Result<BuiltTree> {
    let capacity = pointer_capacity(opts, encryptor)?;
    let shape = optimize(chunked.chunk_count(), capacity)?;
    TreeBuilder::new(chunked, shape, opts, store, encryptor, signer)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Cursor;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn build_fixed(
        data: &[u8],
        chunk_payload: usize,
        opts: &TreeOptions,
    ) -> (BuiltTree, MemoryStore) {
        let mut store = MemoryStore::new();
        let chunker = FixedSizeChunker::new(chunk_payload).unwrap();
        let tree = build_stream(
            &mut Cursor::new(data),
            &chunker,
            opts,
            &mut store,
            None,
            None,
        )
        .unwrap();
        (tree, store)
    }

    #[test]
    fn fourteen_chunks_degree_three_shape() {
        // 1350 bytes in 100-byte chunks → 14 chunks; degree capped at 3.
        let opts = TreeOptions {
            max_tree_degree: Some(3),
            ..Default::default()
        };
        let (tree, store) = build_fixed(&pattern(1350), 100, &opts);

        assert_eq!(tree.shape.direct_per_node, 1);
        assert_eq!(tree.shape.indirect_per_node, 2);
        assert_eq!(tree.data_packets, 14);
        assert_eq!(tree.leaf_manifests, 4);
        assert_eq!(tree.interior_manifests, 3);
        assert_eq!(tree.total_packets(), 22);
        assert_eq!(store.len(), 22);
    }

    #[test]
    fn five_chunks_degree_three_shape() {
        // Same stream, larger packets → 5 chunks, then a three-manifest tree.
        let opts = TreeOptions {
            max_tree_degree: Some(3),
            ..Default::default()
        };
        let (tree, store) = build_fixed(&pattern(1350), 300, &opts);

        assert_eq!(tree.data_packets, 5);
        assert_eq!(tree.leaf_manifests, 1);
        assert_eq!(tree.interior_manifests, 1);
        assert_eq!(tree.total_packets(), 8);
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn single_chunk_gets_leaf_and_root() {
        let (tree, store) = build_fixed(b"tiny", 100, &TreeOptions::default());
        assert_eq!(tree.data_packets, 1);
        assert_eq!(tree.leaf_manifests, 1);
        assert_eq!(tree.interior_manifests, 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn builds_are_deterministic() {
        let opts = TreeOptions {
            max_tree_degree: Some(4),
            ..Default::default()
        };
        let (a, _) = build_fixed(&pattern(5000), 128, &opts);
        let (b, _) = build_fixed(&pattern(5000), 128, &opts);
        assert_eq!(a.root_digest(), b.root_digest());
        assert_eq!(a.root.wire_bytes(), b.root.wire_bytes());
    }

    #[test]
    fn every_packet_stays_in_budget() {
        let opts = TreeOptions {
            max_packet_size: 400,
            ..Default::default()
        };
        let mut store = MemoryStore::new();
        let chunker = FixedSizeChunker::for_budget(400, &opts.data_scheme).unwrap();
        build_stream(
            &mut Cursor::new(pattern(20_000)),
            &chunker,
            &opts,
            &mut store,
            None,
            None,
        )
        .unwrap();

        for packet in store.packets() {
            assert!(packet.wire_len() <= 400, "{} bytes", packet.wire_len());
        }
    }

    #[test]
    fn root_metadata_records_the_stream() {
        let (tree, _) = build_fixed(&pattern(999), 64, &TreeOptions::default());
        let manifest = Manifest::decode(tree.root.payload()).unwrap();
        let meta = manifest.node().unwrap().meta.as_ref().unwrap();
        assert_eq!(meta.subtree_size, Some(999));
        assert_eq!(
            meta.subtree_digest.as_ref().unwrap(),
            &Digest::sha256_of(&pattern(999))
        );
    }

    #[test]
    fn segmented_manifests_get_consecutive_group_ids() {
        let opts = TreeOptions {
            max_tree_degree: Some(3),
            manifest_scheme: NameConstructor::Segmented("/m".parse().unwrap()),
            ..Default::default()
        };
        let (tree, store) = build_fixed(&pattern(1350), 100, &opts);

        // Walk every manifest: within a group of manifest pointers, names
        // resolve as start_segment_id + offset, so the children must carry
        // exactly those segment ids.
        let mut checked = 0;
        for packet in store.packets() {
            if packet.payload_type() != PayloadType::Manifest {
                continue;
            }
            let manifest = Manifest::decode(packet.payload()).unwrap();
            let node = manifest.node().unwrap();
            for group in node.groups() {
                let Some(meta) = group.meta.as_ref() else {
                    continue;
                };
                let (Some(start), Some(_)) = (meta.start_segment_id, meta.nc_id) else {
                    continue;
                };
                for (offset, pointer) in group.pointers.iter().enumerate() {
                    let child = store.get(None, pointer).unwrap();
                    if child.payload_type() == PayloadType::Manifest {
                        let expected = start + offset as u64;
                        assert_eq!(
                            child.name().and_then(|n| n.segment_id()),
                            Some(expected)
                        );
                        checked += 1;
                    }
                }
            }
        }
        assert!(checked >= 7, "checked {checked} manifest pointers");
        assert_eq!(tree.total_packets(), 22);
    }

    #[test]
    fn degree_cap_of_one_is_rejected() {
        let opts = TreeOptions {
            max_tree_degree: Some(1),
            ..Default::default()
        };
        let mut store = MemoryStore::new();
        let chunker = FixedSizeChunker::new(50).unwrap();
        let err = build_stream(
            &mut Cursor::new(pattern(500)),
            &chunker,
            &opts,
            &mut store,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Build(BuildError::NoValidShape { .. })
        ));
    }

    #[test]
    fn shared_segmented_scheme_rejected() {
        let scheme = NameConstructor::Segmented("/x".parse().unwrap());
        let opts = TreeOptions {
            data_scheme: scheme.clone(),
            manifest_scheme: scheme,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }
}
