//! In-memory store for development and testing.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::error::StateError;
use crate::traits::{Commit, Cursor, Store, Transaction};

/// Ordered in-memory store. Fast but not durable; use for development,
/// testing, or when trigger state fits in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    base: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed entries. Test helper.
    pub fn len(&self) -> usize {
        self.base.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.read().is_empty()
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    fn begin(&self) -> Result<Self::Tx, StateError> {
        Ok(MemoryTransaction {
            base: self.base.clone(),
            staged: BTreeMap::new(),
        })
    }
}

/// A transaction over [`MemoryStore`].
///
/// Writes go to a private overlay (`None` marks a deletion) and are applied
/// to the shared map atomically on commit. Reads and scans see the overlay
/// on top of the committed base.
pub struct MemoryTransaction {
    base: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    staged: BTreeMap<Vec<u8>, Option<Bytes>>,
}

impl Transaction for MemoryTransaction {
    fn get(&self, key: &[u8]) -> Result<Bytes, StateError> {
        if let Some(staged) = self.staged.get(key) {
            return staged.clone().ok_or(StateError::NotFound);
        }
        self.base
            .read()
            .get(key)
            .cloned()
            .ok_or(StateError::NotFound)
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

        // Collected once so the scan is stable with respect to later writes.
        let mut merged: BTreeMap<Vec<u8>, Bytes> = {
            let base = self.base.read();
            base.range::<[u8], _>((range.0.as_deref_bound(), range.1.as_deref_bound()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
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

        Ok(Box::new(MemCursor {
            iter: merged.into_iter(),
        }))
    }
}

impl Commit for MemoryTransaction {
    fn commit(self) -> Result<(), StateError> {
        let mut base = self.base.write();
        for (key, staged) in self.staged {
            match staged {
                Some(value) => {
                    base.insert(key, value);
                }
                None => {
                    base.remove(&key);
                }
            }
        }
        Ok(())
    }
}

struct MemCursor {
    iter: std::collections::btree_map::IntoIter<Vec<u8>, Bytes>,
}

impl Cursor for MemCursor {
    fn next(&mut self) -> Result<Option<(Bytes, Bytes)>, StateError> {
        Ok(self.iter.next().map(|(k, v)| (Bytes::from(k), v)))
    }
}

/// Owned range bounds usable against both the base and the overlay map.
pub(crate) fn bounds(from: &[u8], to: Option<&[u8]>) -> (OwnedBound, OwnedBound) {
    (
        OwnedBound::Included(from.to_vec()),
        match to {
            Some(to) => OwnedBound::Excluded(to.to_vec()),
            None => OwnedBound::Unbounded,
        },
    )
}

pub(crate) enum OwnedBound {
    Included(Vec<u8>),
    Excluded(Vec<u8>),
    Unbounded,
}

impl OwnedBound {
    pub(crate) fn as_deref_bound(&self) -> Bound<&[u8]> {
        match self {
            OwnedBound::Included(k) => Bound::Included(k.as_slice()),
            OwnedBound::Excluded(k) => Bound::Excluded(k.as_slice()),
            OwnedBound::Unbounded => Bound::Unbounded,
        }
    }
}
