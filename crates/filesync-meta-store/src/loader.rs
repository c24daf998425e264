//! Contents loader: one full ordered scan of the engine, demultiplexed
//! by key namespace into the in-memory snapshot the store adopts.
//!
//! The loader runs after migration, so every key is expected to be in
//! the current layout; anything unparseable under a known namespace is
//! fatal corruption and aborts initialization. The store must never
//! come up partially loaded.

use crate::engine::Engine;
use crate::error::StoreError;
use crate::keys;
use crate::resource_id::ResourceIdCodec;
use crate::types::{FileMetadata, StoreContents};
use filesync_common::{EntryKind, Origin, ResourceId};
use tracing::{debug, warn};

/// Scan the engine and build the full in-memory snapshot.
pub fn load(engine: &Engine, ids: &dyn ResourceIdCodec) -> Result<StoreContents, StoreError> {
    let mut contents = StoreContents::default();

    engine.scan(|key, value| {
        // Exact literals first, then prefixes, most specific wins.
        if key == keys::VERSION_KEY {
            return Ok(());
        }
        if key == keys::CHANGE_STAMP_KEY {
            let text = std::str::from_utf8(value)
                .map_err(|_| StoreError::corruption("change stamp is not UTF-8"))?;
            contents.largest_change_stamp = text.parse::<i64>().map_err(|_| {
                StoreError::corruption(format!("unparseable change stamp: {text:?}"))
            })?;
            return Ok(());
        }
        if key == keys::SYNC_ROOT_KEY {
            let id = parse_resource_id(key, value)?;
            contents.sync_root = Some(ids.from_disk(id, EntryKind::Folder));
            return Ok(());
        }

        if key.starts_with(keys::METADATA_PREFIX) {
            let (origin, path) = keys::parse_metadata_key(key)?;
            let mut metadata: FileMetadata = bincode::deserialize(value).map_err(|e| {
                StoreError::corruption(format!("undecodable metadata record {key:?}: {e}"))
            })?;
            metadata.resource_id = ids.from_disk(metadata.resource_id, metadata.kind);

            let duplicate = contents
                .metadata
                .entry(origin.clone())
                .or_default()
                .insert(path.clone(), metadata)
                .is_some();
            if duplicate {
                return Err(StoreError::corruption(format!(
                    "duplicate metadata entry for {origin} {path}"
                )));
            }
            return Ok(());
        }
        if key.starts_with(keys::ISYNC_ORIGIN_PREFIX) {
            let origin = keys::parse_origin_root_key(key, keys::ISYNC_ORIGIN_PREFIX)?;
            if contents.disabled_origins.contains_key(&origin) {
                return Err(both_sets(&origin));
            }
            let id = ids.from_disk(parse_resource_id(key, value)?, EntryKind::Folder);
            contents.incremental_sync_origins.insert(origin, id);
            return Ok(());
        }
        if key.starts_with(keys::DISABLED_ORIGIN_PREFIX) {
            let origin = keys::parse_origin_root_key(key, keys::DISABLED_ORIGIN_PREFIX)?;
            if contents.incremental_sync_origins.contains_key(&origin) {
                return Err(both_sets(&origin));
            }
            let id = ids.from_disk(parse_resource_id(key, value)?, EntryKind::Folder);
            contents.disabled_origins.insert(origin, id);
            return Ok(());
        }

        warn!(key, "skipping unrecognized key in metadata store");
        Ok(())
    })?;

    build_reverse_index(&mut contents)?;

    debug!(
        origins = contents.incremental_sync_origins.len() + contents.disabled_origins.len(),
        entries = contents.metadata.values().map(std::collections::HashMap::len).sum::<usize>(),
        change_stamp = contents.largest_change_stamp,
        "loaded metadata store contents"
    );
    Ok(contents)
}

fn parse_resource_id(key: &str, value: &[u8]) -> Result<ResourceId, StoreError> {
    let text = std::str::from_utf8(value)
        .map_err(|_| StoreError::corruption(format!("resource id under {key:?} is not UTF-8")))?;
    ResourceId::new(text)
        .map_err(|e| StoreError::corruption(format!("bad resource id under {key:?}: {e}")))
}

fn both_sets(origin: &Origin) -> StoreError {
    StoreError::corruption(format!(
        "origin {origin} is both incremental-sync and disabled"
    ))
}

/// The reverse index must be an exact bijection over the union of the
/// two classification maps; a resource id shared by two origins would
/// silently drop one of them.
fn build_reverse_index(contents: &mut StoreContents) -> Result<(), StoreError> {
    for (origin, resource_id) in contents
        .incremental_sync_origins
        .iter()
        .chain(contents.disabled_origins.iter())
    {
        if let Some(previous) = contents
            .origin_by_resource_id
            .insert(resource_id.clone(), origin.clone())
        {
            return Err(StoreError::corruption(format!(
                "resource id {resource_id} owned by both {previous} and {origin}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WriteBatch;
    use crate::resource_id::{LegacyDocIds, ModernIds};
    use filesync_common::RelativePath;
    use tempfile::TempDir;

    fn origin(s: &str) -> Origin {
        Origin::new(s).unwrap()
    }

    fn seeded_engine(dir: &TempDir, batch: &WriteBatch) -> Engine {
        let (engine, _) = Engine::open(dir.path().join("store.redb")).unwrap();
        engine.apply(batch).unwrap();
        engine
    }

    fn record(id: &str, kind: EntryKind, conflicted: bool, to_be_fetched: bool) -> Vec<u8> {
        bincode::serialize(&FileMetadata {
            resource_id: ResourceId::new_unchecked(id),
            kind,
            conflicted,
            to_be_fetched,
        })
        .unwrap()
    }

    #[test]
    fn test_load_demultiplexes_namespaces() {
        let dir = TempDir::new().unwrap();
        let mut batch = WriteBatch::new();
        batch.put(keys::VERSION_KEY, b"2".to_vec());
        batch.put(keys::CHANGE_STAMP_KEY, b"42".to_vec());
        batch.put(keys::SYNC_ROOT_KEY, b"syncroot".to_vec());
        batch.put(
            "METADATA: http://a.example /x",
            record("abc", EntryKind::File, true, false),
        );
        batch.put(
            "METADATA: http://a.example /y",
            record("def", EntryKind::File, false, true),
        );
        batch.put("ISYNC_ORIGIN: http://a.example", b"rootA".to_vec());
        batch.put("DISABLED_ORIGIN: http://b.example", b"rootB".to_vec());
        let engine = seeded_engine(&dir, &batch);

        let contents = load(&engine, &ModernIds).unwrap();
        assert_eq!(contents.largest_change_stamp, 42);
        assert_eq!(
            contents.sync_root,
            Some(ResourceId::new_unchecked("syncroot"))
        );
        let paths = &contents.metadata[&origin("http://a.example")];
        assert_eq!(paths.len(), 2);
        assert!(paths[&RelativePath::new_unchecked("/x")].conflicted);
        assert_eq!(
            contents.incremental_sync_origins[&origin("http://a.example")],
            ResourceId::new_unchecked("rootA")
        );
        assert_eq!(
            contents.disabled_origins[&origin("http://b.example")],
            ResourceId::new_unchecked("rootB")
        );
        assert_eq!(
            contents.origin_by_resource_id[&ResourceId::new_unchecked("rootB")],
            origin("http://b.example")
        );
        assert_eq!(contents.origin_by_resource_id.len(), 2);
    }

    #[test]
    fn test_legacy_codec_restores_prefixes() {
        let dir = TempDir::new().unwrap();
        let mut batch = WriteBatch::new();
        batch.put(keys::SYNC_ROOT_KEY, b"syncroot".to_vec());
        batch.put(
            "METADATA: http://a.example /x",
            record("abc", EntryKind::File, false, false),
        );
        batch.put("ISYNC_ORIGIN: http://a.example", b"rootA".to_vec());
        let engine = seeded_engine(&dir, &batch);

        let contents = load(&engine, &LegacyDocIds).unwrap();
        assert_eq!(
            contents.sync_root,
            Some(ResourceId::new_unchecked("folder:syncroot"))
        );
        assert_eq!(
            contents.metadata[&origin("http://a.example")][&RelativePath::new_unchecked("/x")]
                .resource_id,
            ResourceId::new_unchecked("file:abc")
        );
        assert_eq!(
            contents.incremental_sync_origins[&origin("http://a.example")],
            ResourceId::new_unchecked("folder:rootA")
        );
    }

    #[test]
    fn test_bad_change_stamp_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut batch = WriteBatch::new();
        batch.put(keys::CHANGE_STAMP_KEY, b"not-a-number".to_vec());
        let engine = seeded_engine(&dir, &batch);

        assert!(load(&engine, &ModernIds).unwrap_err().is_corruption());
    }

    #[test]
    fn test_undecodable_record_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut batch = WriteBatch::new();
        batch.put("METADATA: http://a.example /x", b"garbage".to_vec());
        let engine = seeded_engine(&dir, &batch);

        assert!(load(&engine, &ModernIds).unwrap_err().is_corruption());
    }

    #[test]
    fn test_origin_in_both_sets_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut batch = WriteBatch::new();
        batch.put("ISYNC_ORIGIN: http://a.example", b"rootA".to_vec());
        batch.put("DISABLED_ORIGIN: http://a.example", b"rootA2".to_vec());
        let engine = seeded_engine(&dir, &batch);

        assert!(load(&engine, &ModernIds).unwrap_err().is_corruption());
    }

    #[test]
    fn test_shared_resource_id_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut batch = WriteBatch::new();
        batch.put("ISYNC_ORIGIN: http://a.example", b"shared".to_vec());
        batch.put("DISABLED_ORIGIN: http://b.example", b"shared".to_vec());
        let engine = seeded_engine(&dir, &batch);

        assert!(load(&engine, &ModernIds).unwrap_err().is_corruption());
    }

    #[test]
    fn test_unrecognized_keys_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut batch = WriteBatch::new();
        batch.put("SOMETHING_ELSE", b"ignored".to_vec());
        batch.put(keys::CHANGE_STAMP_KEY, b"7".to_vec());
        let engine = seeded_engine(&dir, &batch);

        let contents = load(&engine, &ModernIds).unwrap();
        assert_eq!(contents.largest_change_stamp, 7);
        assert!(contents.metadata.is_empty());
    }
}
