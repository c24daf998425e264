//! Key-value engine adapter.
//!
//! Wraps redb as a black-box ordered store: open/create, one full
//! ordered scan, and atomic batch writes. The whole keyspace lives in a
//! single `&str -> &[u8]` table so the key-prefix namespaces partition
//! one flat, ordered sequence.

use crate::error::StoreError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use tracing::debug;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("drive_metadata");

/// A single engine mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put(String, Vec<u8>),
    Delete(String),
}

/// An ordered set of mutations applied atomically
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create an empty batch
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Append a put
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
    }

    /// Append a delete
    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    /// Number of mutations in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if the batch carries no mutations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Handle to the on-disk ordered key-value store
pub struct Engine {
    db: Database,
}

impl Engine {
    /// Open (or create) the store at the given path.
    ///
    /// Returns `created = true` iff no store file existed. Opening an
    /// existing store never destroys data.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, bool), StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let created = !path.exists();
        let db = Database::create(path)?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(TABLE)?;
        }
        write_txn.commit()?;

        debug!(path = %path.display(), created, "opened metadata store file");
        Ok((Self { db }, created))
    }

    /// One full ordered pass over every (key, value) pair
    pub fn scan<F>(&self, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(&str, &[u8]) -> Result<(), StoreError>,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE)?;
        for entry in table.iter()? {
            let entry = entry?;
            visit(entry.0.value(), entry.1.value())?;
        }
        Ok(())
    }

    /// Apply a batch atomically: every op commits, or none do.
    /// Durable once this returns `Ok`.
    pub fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE)?;
            for op in &batch.ops {
                match op {
                    BatchOp::Put(key, value) => {
                        table.insert(key.as_str(), value.as_slice())?;
                    }
                    BatchOp::Delete(key) => {
                        table.remove(key.as_str())?;
                    }
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn collect(engine: &Engine) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        engine
            .scan(|k, v| {
                out.push((k.to_string(), v.to_vec()));
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn test_open_reports_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");

        let (engine, created) = Engine::open(&path).unwrap();
        assert!(created);
        drop(engine);

        let (_engine, created) = Engine::open(&path).unwrap();
        assert!(!created);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/store.redb");
        let (_engine, created) = Engine::open(&path).unwrap();
        assert!(created);
    }

    #[test]
    fn test_batch_put_delete_and_order() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = Engine::open(dir.path().join("store.redb")).unwrap();

        let mut batch = WriteBatch::new();
        batch.put("b", b"2".to_vec());
        batch.put("a", b"1".to_vec());
        batch.put("c", b"3".to_vec());
        engine.apply(&batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("b");
        batch.put("d", b"4".to_vec());
        engine.apply(&batch).unwrap();

        // Scan is ordered by key
        assert_eq!(
            collect(&engine),
            vec![
                ("a".to_string(), b"1".to_vec()),
                ("c".to_string(), b"3".to_vec()),
                ("d".to_string(), b"4".to_vec()),
            ]
        );
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");

        let (engine, _) = Engine::open(&path).unwrap();
        let mut batch = WriteBatch::new();
        batch.put("key", b"value".to_vec());
        engine.apply(&batch).unwrap();
        drop(engine);

        let (engine, created) = Engine::open(&path).unwrap();
        assert!(!created);
        assert_eq!(collect(&engine), vec![("key".to_string(), b"value".to_vec())]);
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = Engine::open(dir.path().join("store.redb")).unwrap();
        engine.apply(&WriteBatch::new()).unwrap();
        assert!(collect(&engine).is_empty());
    }
}
