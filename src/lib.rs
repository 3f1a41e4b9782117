//! SCITT Transparency Log
//!
//! An append-only, cryptographically verifiable log for signed
//! supply-chain statements. Statements are COSE Sign1 messages; accepted
//! statements receive stable positions in an RFC 6962 Merkle tree stored
//! as C2SP tlog-tiles, and registration returns a signed receipt whose
//! embedded inclusion proof ties the statement to the tree head.
//!
//! ## Subsystems
//!
//! 1. **COSE layer** - Sign1 encode/decode, ES256 keys, CWT claims, the
//!    hash-envelope variant, and receipts
//! 2. **Tile log** - entry tiles, hash tiles, compact range, inclusion
//!    and consistency proofs, signed checkpoints
//! 3. **Registration pipeline** - validates statements, appends leaves,
//!    records metadata, issues receipts

pub mod api;
pub mod checkpoint;
pub mod common;
pub mod config;
pub mod cose;
pub mod index;
pub mod logging;
pub mod merkle;
pub mod registration;
pub mod storage;
pub mod tlog;

// Re-exports: error taxonomy
pub use common::error::{Result, ScittError};

// Re-exports: configuration
pub use config::{PolicyMode, ServiceConfig};

// Re-exports: COSE layer
pub use cose::{
    verify_receipt, CoseSign1, CwtClaims, Es256SigningKey, Es256VerifyingKey,
};

// Re-exports: checkpoints
pub use checkpoint::{Checkpoint, CheckpointSigner, SignedCheckpoint};

// Re-exports: storage and log engine
pub use storage::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use tlog::TileLog;

// Re-exports: metadata index
pub use index::{EntryMetadata, MemoryMetadataIndex, MetadataIndex, SqliteMetadataIndex};

// Re-exports: registration pipeline
pub use registration::{
    AcceptAllPolicy, RegistrationService, RequireSignaturePolicy, StatementPolicy,
};
