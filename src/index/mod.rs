//! Statement Metadata Index
//!
//! Records per-entry metadata (issuer, subject, content type, tile
//! coordinates) and the current tree size. The index is a collaborator of
//! the log, not part of it: losing an index row never corrupts the tree,
//! and a gap is surfaced as a recoverable inconsistency at startup.

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryMetadataIndex;
pub use sqlite::SqliteMetadataIndex;
pub use traits::{EntryMetadata, IndexError, IndexResult, MetadataIndex};
