//! Stored types and in-memory index shapes for the metadata store.
//!
//! `FileMetadata` records are serialized to the engine via bincode. The
//! persisted copy carries the on-disk form of the resource id (see
//! `resource_id`); the in-memory copy always holds the canonical id.

use filesync_common::{EntryKind, Origin, RelativePath, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One metadata record per (origin, path)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Remote object backing this entry
    pub resource_id: ResourceId,
    /// File or folder
    pub kind: EntryKind,
    /// Entry is in a conflicted state. Mutually exclusive with
    /// `to_be_fetched`.
    pub conflicted: bool,
    /// Entry still needs its content fetched. Mutually exclusive with
    /// `conflicted`.
    pub to_be_fetched: bool,
}

impl FileMetadata {
    /// True unless both mutually-exclusive flags are set
    #[must_use]
    pub const fn flags_are_consistent(&self) -> bool {
        !(self.conflicted && self.to_be_fetched)
    }
}

/// Per-origin path index
pub type PathToMetadata = HashMap<RelativePath, FileMetadata>;
/// Two-level metadata index: origin, then path
pub type MetadataMap = HashMap<Origin, PathToMetadata>;
/// Forward classification map: origin to its root-directory resource id
pub type ResourceIdByOrigin = HashMap<Origin, ResourceId>;
/// Reverse index over the union of both classification maps
pub type OriginByResourceId = HashMap<ResourceId, Origin>;

/// Snapshot of the whole store, produced by the contents loader and
/// adopted by the metadata store as its live state.
#[derive(Debug, Default)]
pub struct StoreContents {
    pub largest_change_stamp: i64,
    pub sync_root: Option<ResourceId>,
    pub metadata: MetadataMap,
    pub incremental_sync_origins: ResourceIdByOrigin,
    pub disabled_origins: ResourceIdByOrigin,
    pub origin_by_resource_id: OriginByResourceId,
}

/// Health of the persisted side of the store.
///
/// `Degraded` means at least one batch write failed since open; the
/// in-memory indexes may be ahead of disk until the store is reopened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreHealth {
    Ok,
    Degraded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_consistency() {
        let mut metadata = FileMetadata {
            resource_id: ResourceId::new_unchecked("file123"),
            kind: EntryKind::File,
            conflicted: true,
            to_be_fetched: false,
        };
        assert!(metadata.flags_are_consistent());
        metadata.to_be_fetched = true;
        assert!(!metadata.flags_are_consistent());
    }

    #[test]
    fn test_record_round_trip() {
        let metadata = FileMetadata {
            resource_id: ResourceId::new_unchecked("folder123"),
            kind: EntryKind::Folder,
            conflicted: false,
            to_be_fetched: true,
        };
        let bytes = bincode::serialize(&metadata).unwrap();
        let decoded: FileMetadata = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, metadata);
    }
}
