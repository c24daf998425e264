//! Schema migration for the on-disk metadata store.
//!
//! The layout is versioned by the `VERSION` key. Migration runs once per
//! open, before the contents loader, and walks the remaining steps to
//! `CURRENT_VERSION` in order. Each step commits its rewrites together
//! with the new version number in one atomic batch, so an interrupted
//! migration re-runs cleanly from the recorded version.
//!
//! History:
//! - v0: batch-sync era. Metadata keys embedded a serialized filesystem
//!   URL (`METADATA: filesystem:<origin>/drive/<path>`) and batch-sync
//!   origins were tracked under `BSYNC_ORIGIN: ` markers.
//! - v1: metadata keys flattened to `METADATA: <origin> <path>`; batch
//!   markers gone.
//! - v2: resource ids persisted without their legacy `file:`/`folder:`
//!   kind prefix.

use crate::engine::{Engine, WriteBatch};
use crate::error::StoreError;
use crate::keys;
use crate::resource_id::strip_kind_prefix;
use crate::types::FileMetadata;
use tracing::info;

/// Version written by this build
pub const CURRENT_VERSION: i64 = 2;

const BATCH_SYNC_ORIGIN_PREFIX: &str = "BSYNC_ORIGIN: ";
const V0_URL_SCHEME: &str = "filesystem:";
const V0_PATH_MARKER: &str = "/drive";

/// Bring the store's schema up to `CURRENT_VERSION`.
///
/// A freshly created store (and a store with no version key at all) gets
/// `CURRENT_VERSION` written directly with no data rewrites. A version
/// newer than `CURRENT_VERSION` is fatal: downgrade is unsupported.
pub fn run(engine: &Engine, created: bool) -> Result<(), StoreError> {
    if created {
        write_version(engine, CURRENT_VERSION)?;
        return Ok(());
    }

    let mut version = match read_version(engine)? {
        Some(version) => version,
        None => {
            write_version(engine, CURRENT_VERSION)?;
            return Ok(());
        }
    };

    if version > CURRENT_VERSION {
        return Err(StoreError::corruption(format!(
            "store version {version} is newer than supported version {CURRENT_VERSION}"
        )));
    }
    if version < 0 {
        return Err(StoreError::corruption(format!(
            "store version {version} is negative"
        )));
    }

    while version < CURRENT_VERSION {
        match version {
            0 => migrate_v0_to_v1(engine)?,
            1 => migrate_v1_to_v2(engine)?,
            _ => unreachable!("no migration step from version {version}"),
        }
        version += 1;
        info!(version, "migrated metadata store");
    }
    Ok(())
}

fn read_version(engine: &Engine) -> Result<Option<i64>, StoreError> {
    let mut version = None;
    engine.scan(|key, value| {
        if key == keys::VERSION_KEY {
            let text = std::str::from_utf8(value)
                .map_err(|_| StoreError::corruption("version value is not UTF-8"))?;
            version = Some(text.parse::<i64>().map_err(|_| {
                StoreError::corruption(format!("unparseable version value: {text:?}"))
            })?);
        }
        Ok(())
    })?;
    Ok(version)
}

fn write_version(engine: &Engine, version: i64) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    batch.put(keys::VERSION_KEY, version.to_string().into_bytes());
    engine.apply(&batch)
}

/// v0 -> v1: flatten serialized-URL metadata keys to origin + path and
/// drop batch-sync markers (those origins re-register on next start).
fn migrate_v0_to_v1(engine: &Engine) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    engine.scan(|key, value| {
        if let Some(body) = key.strip_prefix(keys::METADATA_PREFIX) {
            if body.starts_with(V0_URL_SCHEME) {
                let (origin, path) = parse_v0_metadata_body(body)?;
                batch.delete(key);
                batch.put(
                    format!("{}{origin} {path}", keys::METADATA_PREFIX),
                    value.to_vec(),
                );
            }
        } else if key.starts_with(BATCH_SYNC_ORIGIN_PREFIX) {
            batch.delete(key);
        }
        Ok(())
    })?;
    batch.put(keys::VERSION_KEY, 1i64.to_string().into_bytes());
    engine.apply(&batch)
}

/// Split `filesystem:<origin>/drive/<path>` into origin and path
fn parse_v0_metadata_body(body: &str) -> Result<(String, String), StoreError> {
    let url = body
        .strip_prefix(V0_URL_SCHEME)
        .ok_or_else(|| StoreError::corruption(format!("bad v0 metadata key: {body:?}")))?;
    let marker = url
        .find(V0_PATH_MARKER)
        .ok_or_else(|| StoreError::corruption(format!("v0 metadata key lacks root: {body:?}")))?;
    let origin = &url[..marker];
    let path = &url[marker + V0_PATH_MARKER.len()..];
    if origin.is_empty() || !path.starts_with('/') {
        return Err(StoreError::corruption(format!(
            "malformed v0 metadata key: {body:?}"
        )));
    }
    Ok((origin.to_string(), path.to_string()))
}

/// v1 -> v2: strip legacy kind prefixes from every persisted resource id
fn migrate_v1_to_v2(engine: &Engine) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    engine.scan(|key, value| {
        if key == keys::SYNC_ROOT_KEY
            || key.starts_with(keys::ISYNC_ORIGIN_PREFIX)
            || key.starts_with(keys::DISABLED_ORIGIN_PREFIX)
        {
            let id = std::str::from_utf8(value).map_err(|_| {
                StoreError::corruption(format!("resource id under {key:?} is not UTF-8"))
            })?;
            let stripped = strip_kind_prefix(id);
            if stripped != id {
                batch.put(key, stripped.as_bytes().to_vec());
            }
        } else if key.starts_with(keys::METADATA_PREFIX) {
            let mut metadata: FileMetadata = bincode::deserialize(value)?;
            let stripped = strip_kind_prefix(metadata.resource_id.as_str());
            if stripped != metadata.resource_id.as_str() {
                metadata.resource_id =
                    filesync_common::ResourceId::new_unchecked(stripped.to_string());
                batch.put(key, bincode::serialize(&metadata)?);
            }
        }
        Ok(())
    })?;
    batch.put(keys::VERSION_KEY, 2i64.to_string().into_bytes());
    engine.apply(&batch)
}
