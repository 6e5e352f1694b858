//! Cancellation propagated through the storage handle.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::StateError;
use crate::traits::{Cursor, Transaction};

/// Shared cancellation signal. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A transaction view that observes a [`CancelFlag`].
///
/// Once the flag is raised every operation, including `next` on an in-flight
/// cursor, returns [`StateError::Cancelled`]: aborted scans yield no partial
/// results past the cancellation point.
pub struct Cancellable<'a, T: Transaction + ?Sized> {
    tx: &'a mut T,
    flag: CancelFlag,
}

impl<'a, T: Transaction + ?Sized> Cancellable<'a, T> {
    pub fn new(tx: &'a mut T, flag: CancelFlag) -> Self {
        Self { tx, flag }
    }

    fn check(&self) -> Result<(), StateError> {
        if self.flag.is_cancelled() {
            return Err(StateError::Cancelled);
        }
        Ok(())
    }
}

impl<T: Transaction + ?Sized> Transaction for Cancellable<'_, T> {
    fn get(&self, key: &[u8]) -> Result<Bytes, StateError> {
        self.check()?;
        self.tx.get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        self.check()?;
        self.tx.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StateError> {
        self.check()?;
        self.tx.delete(key)
    }

    fn iterate(
        &self,
        from: &[u8],
        to: Option<&[u8]>,
    ) -> Result<Box<dyn Cursor + '_>, StateError> {
        self.check()?;
        let inner = self.tx.iterate(from, to)?;
        Ok(Box::new(CancellableCursor {
            inner,
            flag: self.flag.clone(),
        }))
    }
}

struct CancellableCursor<'a> {
    inner: Box<dyn Cursor + 'a>,
    flag: CancelFlag,
}

impl Cursor for CancellableCursor<'_> {
    fn next(&mut self) -> Result<Option<(Bytes, Bytes)>, StateError> {
        if self.flag.is_cancelled() {
            return Err(StateError::Cancelled);
        }
        self.inner.next()
    }

    fn close(&mut self) -> Result<(), StateError> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::traits::Store;

    #[test]
    fn test_cancel_stops_operations() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let flag = CancelFlag::new();
        let mut view = Cancellable::new(&mut tx, flag.clone());

        view.set(b"a", b"1").unwrap();
        flag.cancel();
        assert!(matches!(view.set(b"b", b"2"), Err(StateError::Cancelled)));
        assert!(matches!(view.get(b"a"), Err(StateError::Cancelled)));
    }

    #[test]
    fn test_cancel_aborts_inflight_scan() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let flag = CancelFlag::new();
        let mut view = Cancellable::new(&mut tx, flag.clone());
        view.set(b"a", b"").unwrap();
        view.set(b"b", b"").unwrap();

        let mut cursor = view.iterate(b"", None).unwrap();
        assert!(cursor.next().unwrap().is_some());
        flag.cancel();
        assert!(matches!(cursor.next(), Err(StateError::Cancelled)));
    }
}
