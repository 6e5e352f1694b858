//! RocksDB-backed store for production use.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::StateError;
use crate::memory::bounds;
use crate::traits::{Commit, Cursor, Store, Transaction};

/// RocksDB-backed ordered store.
///
/// Supports state that exceeds memory and survives process restarts, which is
/// what lets storage-backed triggers resume their timers after a crash.
pub struct RocksDbStore {
    db_path: PathBuf,
    db: Arc<rocksdb::DB>,
}

impl RocksDbStore {
    /// Opens (or creates) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let db_path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&db_path)
            .map_err(|e| StateError::Backend(format!("create {}: {}", db_path.display(), e)))?;

        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_write_buffer_size(64 * 1024 * 1024); // 64MB
        opts.set_max_write_buffer_number(3);
        opts.set_target_file_size_base(64 * 1024 * 1024);
        opts.set_level_compaction_dynamic_level_bytes(true);

        // Bloom filters for faster point lookups
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_cache_index_and_filter_blocks(true);
        opts.set_block_based_table_factory(&block_opts);

        let db = rocksdb::DB::open(&opts, &db_path)?;

        info!(path = %db_path.display(), "rocksdb store opened");

        Ok(Self {
            db_path,
            db: Arc::new(db),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl From<rocksdb::Error> for StateError {
    fn from(e: rocksdb::Error) -> Self {
        StateError::Backend(e.to_string())
    }
}

impl Store for RocksDbStore {
    type Tx = RocksDbTransaction;

    fn begin(&self) -> Result<Self::Tx, StateError> {
        Ok(RocksDbTransaction {
            db: self.db.clone(),
            staged: BTreeMap::new(),
        })
    }
}

/// A transaction over [`RocksDbStore`].
///
/// Writes are staged in an overlay and flushed as one `WriteBatch` on commit,
/// so the commit is atomic with respect to other transactions on the same
/// store. Reads and scans see the overlay on top of the database.
pub struct RocksDbTransaction {
    db: Arc<rocksdb::DB>,
    staged: BTreeMap<Vec<u8>, Option<Bytes>>,
}

impl Transaction for RocksDbTransaction {
    fn get(&self, key: &[u8]) -> Result<Bytes, StateError> {
        if let Some(staged) = self.staged.get(key) {
            return staged.clone().ok_or(StateError::NotFound);
        }
        match self.db.get(key)? {
            Some(value) => Ok(Bytes::from(value)),
            None => Err(StateError::NotFound),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        self.staged
            .insert(key.to_vec(), Some(Bytes::copy_from_slice(value)));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StateError> {
        self.staged.insert(key.to_vec(), None);
        Ok(())
    }

    fn iterate(
        &self,
        from: &[u8],
        to: Option<&[u8]>,
    ) -> Result<Box<dyn Cursor + '_>, StateError> {
        let range = bounds(from, to);

        let mut merged: BTreeMap<Vec<u8>, Bytes> = BTreeMap::new();
        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            from,
            rocksdb::Direction::Forward,
        ));
        for entry in iter {
            let (key, value) = entry?;
            if let Some(to) = to {
                if key.as_ref() >= to {
                    break;
                }
            }
            merged.insert(key.into_vec(), Bytes::from(value.into_vec()));
        }
        for (key, staged) in self
            .staged
            .range::<[u8], _>((range.0.as_deref_bound(), range.1.as_deref_bound()))
        {
            match staged {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(Box::new(RocksCursor {
            iter: merged.into_iter(),
        }))
    }
}

impl Commit for RocksDbTransaction {
    fn commit(self) -> Result<(), StateError> {
        let mut batch = rocksdb::WriteBatch::default();
        for (key, staged) in self.staged {
            match staged {
                Some(value) => batch.put(&key, &value),
                None => batch.delete(&key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}

struct RocksCursor {
    iter: std::collections::btree_map::IntoIter<Vec<u8>, Bytes>,
}

impl Cursor for RocksCursor {
    fn next(&mut self) -> Result<Option<(Bytes, Bytes)>, StateError> {
        Ok(self.iter.next().map(|(k, v)| (Bytes::from(k), v)))
    }
}
