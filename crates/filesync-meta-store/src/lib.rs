//! FileSync Metadata Store - durable, origin-scoped drive metadata
//!
//! This crate persists per-origin sync state (resource ids, file-path
//! metadata, sync-state classification) in an ordered key-value file and
//! mirrors it into in-memory indexes owned by a single writer.

pub mod engine;
pub mod error;
pub mod keys;
pub mod loader;
pub mod migrate;
pub mod resource_id;
pub mod store;
pub mod types;

// Re-exports
pub use engine::{Engine, WriteBatch};
pub use error::{StoreError, StoreResult};
pub use store::{MetadataStore, WriteAck, DATABASE_NAME};
pub use types::{FileMetadata, StoreContents, StoreHealth};
