// src/lib.rs

//! casket — content-addressed manifest trees
//!
//! casket splits a byte stream into fixed-size (or content-defined)
//! chunks, stores every chunk as a hash-addressable packet, and links the
//! chunks through a tree of manifest packets whose pointers are SHA-256
//! digests of their children. Handing someone the root digest is handing
//! them the whole stream: a traversal resolves digests through a packet
//! store, optionally verifying signatures and decrypting nodes along the
//! way, and reproduces the original bytes exactly.
//!
//! # Architecture
//!
//! - TLV wire format throughout: every structure is a
//!   type/length/value record or an ordered composition of them
//! - Packets are immutable and content-addressed at construction
//! - One bottom-up build pass; the tree shape is chosen up front by a
//!   waste-minimizing optimizer
//! - Traversal is a preorder walk with branch-scoped naming overrides and
//!   pluggable validation and decryption

pub mod build;
pub mod crypto;
pub mod digest;
mod error;
pub mod manifest;
pub mod name;
pub mod packet;
pub mod store;
pub mod tlv;
pub mod traverse;

pub use build::{
    build_stream, build_tree, BuildError, BuiltTree, CdcChunker, ChunkedStream, Chunker,
    FixedSizeChunker, TreeBuilder, TreeOptions, DEFAULT_MAX_PACKET_SIZE,
};
pub use digest::{Digest, DigestAlgorithm};
pub use error::{Error, Result};
pub use manifest::{Manifest, NameConstructor, Node};
pub use name::Name;
pub use packet::{Packet, PayloadType};
pub use store::{DirectoryStore, MemoryStore, PacketStore, StoreError};
pub use traverse::{PacketValidator, SignatureValidator, TraversalSummary, Traverser};
