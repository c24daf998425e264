//! The metadata store: in-memory indexes mirrored to the engine.
//!
//! The store owns all indexes after initialization and is the sole
//! writer. Mutations update memory first, then submit one atomic batch
//! to a dedicated persistence worker; the returned [`WriteAck`] resolves
//! with the engine outcome. Memory can therefore run ahead of disk when
//! a write fails; [`MetadataStore::health`] reports that condition and
//! the store must be reopened to reconverge.
//!
//! Concurrency: all methods are called from the owning task (mutators
//! take `&mut self`, so the borrow checker enforces the single-writer
//! discipline); only the worker thread touches the engine handle after
//! initialization, draining a FIFO queue so batches commit in submission
//! order.

use crate::engine::{Engine, WriteBatch};
use crate::error::StoreError;
use crate::keys::{self, OriginSyncType};
use crate::loader;
use crate::migrate;
use crate::resource_id::{codec_for, ResourceIdCodec};
use crate::types::{
    FileMetadata, MetadataMap, OriginByResourceId, ResourceIdByOrigin, StoreHealth,
};
use filesync_common::{EntryKind, Origin, RelativePath, ResourceId, StoreConfig};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// File name of the metadata database inside the data directory
pub const DATABASE_NAME: &str = "drive_metadata.redb";

struct WriteCommand {
    batch: WriteBatch,
    ack: oneshot::Sender<Result<(), StoreError>>,
}

/// Completion handle for one submitted batch.
///
/// Resolves once the batch is durable (or failed). Dropping it does not
/// cancel the write.
#[derive(Debug)]
pub struct WriteAck {
    rx: oneshot::Receiver<Result<(), StoreError>>,
}

impl WriteAck {
    /// Wait for the batch outcome
    pub async fn wait(self) -> Result<(), StoreError> {
        self.rx.await.unwrap_or(Err(StoreError::Closed))
    }
}

/// Durable, origin-scoped drive-metadata store.
///
/// Holds a snapshot of the server-side metadata: the largest change
/// stamp seen, the sync-root directory id, per-(origin, path) file
/// metadata, and the sync-state classification of every known origin.
#[derive(Debug)]
pub struct MetadataStore {
    tx: mpsc::Sender<WriteCommand>,
    writer: thread::JoinHandle<()>,
    health: Arc<Mutex<StoreHealth>>,
    pending: Arc<AtomicUsize>,
    batches_submitted: u64,
    ids: Arc<dyn ResourceIdCodec>,

    largest_change_stamp: i64,
    sync_root: Option<ResourceId>,
    metadata: MetadataMap,
    incremental_sync_origins: ResourceIdByOrigin,
    disabled_origins: ResourceIdByOrigin,
    origin_by_resource_id: OriginByResourceId,
}

impl MetadataStore {
    /// Open the store under `config.data_dir`, migrate the schema if
    /// needed, and load the full contents into memory.
    ///
    /// Returns the store and whether the database file was freshly
    /// created. Construction is the initialization barrier: no other
    /// operation exists before this completes.
    pub async fn initialize(config: StoreConfig) -> Result<(Self, bool), StoreError> {
        let ids = codec_for(config.id_scheme);
        let path = config.data_dir.join(DATABASE_NAME);

        let loader_ids = Arc::clone(&ids);
        let (engine, created, contents) = tokio::task::spawn_blocking(move || {
            let (engine, created) = Engine::open(&path)?;
            migrate::run(&engine, created)?;
            let contents = loader::load(&engine, loader_ids.as_ref())?;
            Ok::<_, StoreError>((engine, created, contents))
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        info!(
            data_dir = %config.data_dir.display(),
            created,
            change_stamp = contents.largest_change_stamp,
            "initialized metadata store"
        );

        let health = Arc::new(Mutex::new(StoreHealth::Ok));
        let pending = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(config.write_queue_depth.max(1));
        let writer = thread::Builder::new().name("filesync-meta-writer".into()).spawn({
            let health = Arc::clone(&health);
            let pending = Arc::clone(&pending);
            move || writer_loop(&engine, rx, &health, &pending)
        })?;

        let store = Self {
            tx,
            writer,
            health,
            pending,
            batches_submitted: 0,
            ids,
            largest_change_stamp: contents.largest_change_stamp,
            sync_root: contents.sync_root,
            metadata: contents.metadata,
            incremental_sync_origins: contents.incremental_sync_origins,
            disabled_origins: contents.disabled_origins,
            origin_by_resource_id: contents.origin_by_resource_id,
        };
        Ok((store, created))
    }

    // ---- Change stamp ----

    /// Update the largest change stamp seen and persist it
    pub async fn set_largest_change_stamp(&mut self, stamp: i64) -> WriteAck {
        self.largest_change_stamp = stamp;
        let mut batch = WriteBatch::new();
        batch.put(keys::CHANGE_STAMP_KEY, stamp.to_string().into_bytes());
        self.submit(batch).await
    }

    /// Largest change stamp seen; 0 for a fresh store
    #[must_use]
    pub const fn largest_change_stamp(&self) -> i64 {
        self.largest_change_stamp
    }

    // ---- Per-entry metadata ----

    /// Upsert the metadata record for (origin, path).
    ///
    /// # Panics
    ///
    /// Panics if `metadata` has both `conflicted` and `to_be_fetched`
    /// set; that is a caller bug, not a runtime condition.
    pub async fn update_entry(
        &mut self,
        origin: &Origin,
        path: &RelativePath,
        metadata: FileMetadata,
    ) -> Result<WriteAck, StoreError> {
        assert!(
            metadata.flags_are_consistent(),
            "conflicted and to_be_fetched are mutually exclusive"
        );

        let mut on_disk = metadata.clone();
        on_disk.resource_id = self.ids.to_disk(&metadata.resource_id, metadata.kind);
        let value = bincode::serialize(&on_disk)?;

        self.metadata
            .entry(origin.clone())
            .or_default()
            .insert(path.clone(), metadata);

        let mut batch = WriteBatch::new();
        batch.put(keys::metadata_key(origin, path), value);
        Ok(self.submit(batch).await)
    }

    /// Delete the metadata record for (origin, path).
    ///
    /// Returns [`StoreError::NotFound`] (and issues no write) if the
    /// origin has no entries at all or the path is absent.
    pub async fn delete_entry(
        &mut self,
        origin: &Origin,
        path: &RelativePath,
    ) -> Result<WriteAck, StoreError> {
        let paths = self.metadata.get_mut(origin).ok_or(StoreError::NotFound)?;
        if paths.remove(path).is_none() {
            return Err(StoreError::NotFound);
        }
        if paths.is_empty() {
            self.metadata.remove(origin);
        }

        let mut batch = WriteBatch::new();
        batch.delete(keys::metadata_key(origin, path));
        Ok(self.submit(batch).await)
    }

    /// Look up the metadata record for (origin, path)
    pub fn read_entry(
        &self,
        origin: &Origin,
        path: &RelativePath,
    ) -> Result<&FileMetadata, StoreError> {
        self.metadata
            .get(origin)
            .and_then(|paths| paths.get(path))
            .ok_or(StoreError::NotFound)
    }

    // ---- Origin classification ----

    /// Start tracking `origin` for incremental sync under the given
    /// origin-root resource id.
    ///
    /// # Panics
    ///
    /// Panics if the origin is already incremental-sync or disabled.
    pub async fn add_incremental_sync_origin(
        &mut self,
        origin: Origin,
        resource_id: ResourceId,
    ) -> WriteAck {
        assert!(
            !self.is_incremental_sync_origin(&origin),
            "origin {origin} is already incremental-sync"
        );
        assert!(
            !self.is_origin_disabled(&origin),
            "origin {origin} is disabled"
        );

        self.incremental_sync_origins
            .insert(origin.clone(), resource_id.clone());
        self.origin_by_resource_id
            .insert(resource_id.clone(), origin.clone());

        let mut batch = WriteBatch::new();
        // The disabled marker cannot exist here; deleting it anyway keeps
        // disk canonical even if a previous write was lost.
        batch.delete(keys::origin_root_key(&origin, OriginSyncType::Disabled));
        batch.put(
            keys::origin_root_key(&origin, OriginSyncType::IncrementalSync),
            self.disk_id(&resource_id).into_string().into_bytes(),
        );
        self.submit(batch).await
    }

    /// Overwrite the sync-root directory resource id
    pub async fn set_sync_root_directory(&mut self, resource_id: ResourceId) -> WriteAck {
        self.sync_root = Some(resource_id.clone());

        let mut batch = WriteBatch::new();
        batch.put(
            keys::SYNC_ROOT_KEY,
            self.disk_id(&resource_id).into_string().into_bytes(),
        );
        self.submit(batch).await
    }

    /// Sync-root directory resource id, if configured
    #[must_use]
    pub const fn sync_root_directory(&self) -> Option<&ResourceId> {
        self.sync_root.as_ref()
    }

    /// Re-key the origin-root resource id of a known origin.
    ///
    /// The origin must currently be incremental-sync or disabled; on an
    /// unknown origin this is a no-op and issues no write.
    pub async fn set_origin_root_directory(
        &mut self,
        origin: &Origin,
        resource_id: ResourceId,
    ) -> Option<WriteAck> {
        debug_assert!(self.is_known_origin(origin), "unknown origin {origin}");

        let sync_type = if rekey_resource_id(
            &mut self.incremental_sync_origins,
            &mut self.origin_by_resource_id,
            origin,
            &resource_id,
        ) {
            OriginSyncType::IncrementalSync
        } else if rekey_resource_id(
            &mut self.disabled_origins,
            &mut self.origin_by_resource_id,
            origin,
            &resource_id,
        ) {
            OriginSyncType::Disabled
        } else {
            return None;
        };

        let mut batch = WriteBatch::new();
        batch.put(
            keys::origin_root_key(origin, sync_type),
            self.disk_id(&resource_id).into_string().into_bytes(),
        );
        Some(self.submit(batch).await)
    }

    /// True if the origin is incremental-sync or disabled
    #[must_use]
    pub fn is_known_origin(&self, origin: &Origin) -> bool {
        self.is_incremental_sync_origin(origin) || self.is_origin_disabled(origin)
    }

    /// True if the origin is actively tracked for incremental sync
    #[must_use]
    pub fn is_incremental_sync_origin(&self, origin: &Origin) -> bool {
        self.incremental_sync_origins.contains_key(origin)
    }

    /// True if the origin is disabled
    #[must_use]
    pub fn is_origin_disabled(&self, origin: &Origin) -> bool {
        self.disabled_origins.contains_key(origin)
    }

    /// Move a disabled origin back to the untracked state.
    ///
    /// The origin is not re-added to incremental sync; it re-registers
    /// with the sync service from scratch. No-op (no write) if the
    /// origin was not disabled.
    pub async fn enable_origin(&mut self, origin: &Origin) -> Option<WriteAck> {
        let resource_id = self.disabled_origins.remove(origin)?;
        self.origin_by_resource_id.remove(&resource_id);
        if let Some(stale) = self.incremental_sync_origins.remove(origin) {
            self.origin_by_resource_id.remove(&stale);
        }

        let mut batch = WriteBatch::new();
        batch.delete(keys::origin_root_key(origin, OriginSyncType::IncrementalSync));
        batch.delete(keys::origin_root_key(origin, OriginSyncType::Disabled));
        Some(self.submit(batch).await)
    }

    /// Move an incremental-sync origin to the disabled state, dropping
    /// all of its metadata entries. No-op (no write) if the origin is
    /// not incremental-sync.
    pub async fn disable_origin(&mut self, origin: &Origin) -> Option<WriteAck> {
        let resource_id = self.incremental_sync_origins.remove(origin)?;
        self.disabled_origins
            .insert(origin.clone(), resource_id.clone());

        let mut batch = WriteBatch::new();
        batch.delete(keys::origin_root_key(origin, OriginSyncType::IncrementalSync));
        batch.put(
            keys::origin_root_key(origin, OriginSyncType::Disabled),
            self.disk_id(&resource_id).into_string().into_bytes(),
        );
        self.append_metadata_deletions(origin, &mut batch);
        self.metadata.remove(origin);

        Some(self.submit(batch).await)
    }

    /// Forget an origin entirely: classification, reverse-index entry,
    /// and all metadata entries, in one batch. No-op (no write) if the
    /// origin is unknown.
    pub async fn remove_origin(&mut self, origin: &Origin) -> Option<WriteAck> {
        let resource_id = self
            .incremental_sync_origins
            .remove(origin)
            .or_else(|| self.disabled_origins.remove(origin))?;
        self.origin_by_resource_id.remove(&resource_id);

        let mut batch = WriteBatch::new();
        batch.delete(keys::origin_root_key(origin, OriginSyncType::IncrementalSync));
        batch.delete(keys::origin_root_key(origin, OriginSyncType::Disabled));
        self.append_metadata_deletions(origin, &mut batch);
        self.metadata.remove(origin);

        Some(self.submit(batch).await)
    }

    // ---- Queries ----

    /// All (origin, path) pairs whose entries are conflicted
    #[must_use]
    pub fn conflict_urls(&self) -> HashSet<(Origin, RelativePath)> {
        self.metadata
            .iter()
            .flat_map(|(origin, paths)| {
                paths
                    .iter()
                    .filter(|(_, metadata)| metadata.conflicted)
                    .map(move |(path, _)| (origin.clone(), path.clone()))
            })
            .collect()
    }

    /// All entries still waiting for their content to be fetched
    #[must_use]
    pub fn to_be_fetched_files(&self) -> Vec<(Origin, RelativePath, FileMetadata)> {
        self.metadata
            .iter()
            .flat_map(|(origin, paths)| {
                paths
                    .iter()
                    .filter(|(_, metadata)| metadata.to_be_fetched)
                    .map(move |(path, metadata)| (origin.clone(), path.clone(), metadata.clone()))
            })
            .collect()
    }

    /// Origin-root resource id for a known origin.
    ///
    /// Returns `None` while the sync root is unset (the origin
    /// directories under it cannot be valid either) or if the origin is
    /// unknown.
    #[must_use]
    pub fn resource_id_for_origin(&self, origin: &Origin) -> Option<&ResourceId> {
        self.sync_root.as_ref()?;
        self.incremental_sync_origins
            .get(origin)
            .or_else(|| self.disabled_origins.get(origin))
    }

    /// Every known origin, incremental-sync and disabled, in
    /// unspecified order
    #[must_use]
    pub fn all_origins(&self) -> Vec<Origin> {
        self.incremental_sync_origins
            .keys()
            .chain(self.disabled_origins.keys())
            .cloned()
            .collect()
    }

    /// Reverse-index lookup: the origin owning an origin-root resource id
    #[must_use]
    pub fn origin_by_root_directory_id(&self, resource_id: &ResourceId) -> Option<&Origin> {
        self.origin_by_resource_id.get(resource_id)
    }

    // ---- Persistence bookkeeping ----

    /// Health of the persisted side; `Degraded` after any failed batch
    #[must_use]
    pub fn health(&self) -> StoreHealth {
        *self.health.lock()
    }

    /// Number of submitted batches not yet committed
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Total batches handed to the persistence worker since open
    #[must_use]
    pub const fn batches_submitted(&self) -> u64 {
        self.batches_submitted
    }

    /// Wait until every batch submitted so far is durable.
    ///
    /// The worker is FIFO, so an empty barrier batch suffices.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        self.submit(WriteBatch::new()).await.wait().await
    }

    /// Shut the store down, waiting for in-flight writes to commit
    pub async fn close(self) -> Result<(), StoreError> {
        let Self { tx, writer, .. } = self;
        drop(tx);
        tokio::task::spawn_blocking(move || writer.join())
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
            .map_err(|_| StoreError::Closed)?;
        debug!("metadata store closed");
        Ok(())
    }

    // ---- Internals ----

    fn disk_id(&self, resource_id: &ResourceId) -> ResourceId {
        // Ids persisted outside metadata records are all origin roots
        self.ids.to_disk(resource_id, EntryKind::Folder)
    }

    fn append_metadata_deletions(&self, origin: &Origin, batch: &mut WriteBatch) {
        if let Some(paths) = self.metadata.get(origin) {
            for path in paths.keys() {
                batch.delete(keys::metadata_key(origin, path));
            }
        }
    }

    async fn submit(&mut self, batch: WriteBatch) -> WriteAck {
        self.batches_submitted += 1;
        self.pending.fetch_add(1, Ordering::AcqRel);
        let (ack_tx, ack_rx) = oneshot::channel();
        let command = WriteCommand {
            batch,
            ack: ack_tx,
        };
        if self.tx.send(command).await.is_err() {
            // Worker is gone; the dropped ack sender resolves the ack
            // with Closed.
            self.pending.fetch_sub(1, Ordering::AcqRel);
            *self.health.lock() = StoreHealth::Degraded;
            error!("metadata writer is gone; dropping batch");
        }
        WriteAck { rx: ack_rx }
    }

    #[cfg(test)]
    fn assert_index_consistency(&self) {
        use std::collections::HashMap;

        let mut expected: HashMap<ResourceId, Origin> = HashMap::new();
        for (origin, resource_id) in self
            .incremental_sync_origins
            .iter()
            .chain(self.disabled_origins.iter())
        {
            assert!(
                !(self.incremental_sync_origins.contains_key(origin)
                    && self.disabled_origins.contains_key(origin)),
                "origin {origin} is in both classification maps"
            );
            assert!(
                expected
                    .insert(resource_id.clone(), origin.clone())
                    .is_none(),
                "resource id {resource_id} appears twice in forward maps"
            );
        }
        assert_eq!(
            expected, self.origin_by_resource_id,
            "reverse index out of sync with forward maps"
        );
    }
}

fn rekey_resource_id(
    map: &mut ResourceIdByOrigin,
    reverse: &mut OriginByResourceId,
    origin: &Origin,
    resource_id: &ResourceId,
) -> bool {
    let Some(slot) = map.get_mut(origin) else {
        return false;
    };
    reverse.remove(slot);
    reverse.insert(resource_id.clone(), origin.clone());
    *slot = resource_id.clone();
    true
}

fn writer_loop(
    engine: &Engine,
    mut rx: mpsc::Receiver<WriteCommand>,
    health: &Mutex<StoreHealth>,
    pending: &AtomicUsize,
) {
    while let Some(command) = rx.blocking_recv() {
        let result = engine.apply(&command.batch);
        if let Err(e) = &result {
            error!("metadata batch write failed: {e}");
            *health.lock() = StoreHealth::Degraded;
        }
        pending.fetch_sub(1, Ordering::AcqRel);
        // The caller may have dropped its ack
        let _ = command.ack.send(result);
    }
    debug!("metadata writer drained");
}
