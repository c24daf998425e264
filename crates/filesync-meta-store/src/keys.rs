//! Key codec for the flat metadata keyspace.
//!
//! The store lives in a single ordered table; these prefixes partition it
//! into namespaces. Metadata keys join origin and path with a single
//! space, so decoding splits on the first space after the prefix (origins
//! are validated to be space-free; paths may contain spaces).

use crate::error::StoreError;
use filesync_common::{Origin, RelativePath};

/// Key holding the schema version as a decimal string
pub const VERSION_KEY: &str = "VERSION";
/// Key holding the largest change stamp as a decimal string
pub const CHANGE_STAMP_KEY: &str = "CHANGE_STAMP";
/// Key holding the sync-root directory resource id
pub const SYNC_ROOT_KEY: &str = "SYNC_ROOT_DIR";

/// Prefix of per-(origin, path) metadata records
pub const METADATA_PREFIX: &str = "METADATA: ";
/// Prefix of incremental-sync origin markers
pub const ISYNC_ORIGIN_PREFIX: &str = "ISYNC_ORIGIN: ";
/// Prefix of disabled-origin markers
pub const DISABLED_ORIGIN_PREFIX: &str = "DISABLED_ORIGIN: ";

const SEPARATOR: char = ' ';

/// Sync-state classification of an origin's root-directory marker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OriginSyncType {
    IncrementalSync,
    Disabled,
}

/// Build the key for a metadata record
#[must_use]
pub fn metadata_key(origin: &Origin, path: &RelativePath) -> String {
    format!("{METADATA_PREFIX}{origin}{SEPARATOR}{path}")
}

/// Recover (origin, path) from a metadata key
pub fn parse_metadata_key(key: &str) -> Result<(Origin, RelativePath), StoreError> {
    let body = key
        .strip_prefix(METADATA_PREFIX)
        .ok_or_else(|| StoreError::corruption(format!("not a metadata key: {key:?}")))?;
    let (origin, path) = body
        .split_once(SEPARATOR)
        .ok_or_else(|| StoreError::corruption(format!("metadata key has no separator: {key:?}")))?;
    let origin = Origin::new(origin)
        .map_err(|e| StoreError::corruption(format!("bad origin in key {key:?}: {e}")))?;
    let path = RelativePath::new(path)
        .map_err(|e| StoreError::corruption(format!("bad path in key {key:?}: {e}")))?;
    Ok((origin, path))
}

/// Build the classification key for an origin's root directory
#[must_use]
pub fn origin_root_key(origin: &Origin, sync_type: OriginSyncType) -> String {
    match sync_type {
        OriginSyncType::IncrementalSync => format!("{ISYNC_ORIGIN_PREFIX}{origin}"),
        OriginSyncType::Disabled => format!("{DISABLED_ORIGIN_PREFIX}{origin}"),
    }
}

/// Recover the origin from a classification key with the given prefix
pub fn parse_origin_root_key(key: &str, prefix: &str) -> Result<Origin, StoreError> {
    let body = key
        .strip_prefix(prefix)
        .ok_or_else(|| StoreError::corruption(format!("key {key:?} lacks prefix {prefix:?}")))?;
    Origin::new(body)
        .map_err(|e| StoreError::corruption(format!("bad origin in key {key:?}: {e}")))
}
