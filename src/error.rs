// src/error.rs

//! Crate-level error type
//!
//! Library modules keep their own focused error enums; this type is what
//! operations spanning several of them (building, traversal) return. Every
//! failure aborts the operation that hit it — there are no retries and no
//! partial results anywhere in the crate.

use thiserror::Error;

/// Any failure a build or traversal can surface.
#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Codec(#[from] crate::tlv::CodecError),

    #[error("naming error: {0}")]
    Name(#[from] crate::manifest::NameError),

    #[error("build error: {0}")]
    Build(#[from] crate::build::BuildError),

    #[error("traversal error: {0}")]
    Traverse(#[from] crate::traverse::TraverseError),

    #[error("crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
