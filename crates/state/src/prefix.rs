//! Prefix-scoped transaction views.

use bytes::Bytes;

use crate::error::StateError;
use crate::traits::{Cursor, Transaction};

/// A view of a transaction restricted to one key prefix.
///
/// Keys are prefixed on the way in and stripped on the way out, so code
/// holding a `Prefixed` sees a private keyspace. Views nest: prefixing a
/// `Prefixed` concatenates the prefixes.
pub struct Prefixed<'a, T: Transaction + ?Sized> {
    tx: &'a mut T,
    prefix: Vec<u8>,
}

impl<'a, T: Transaction + ?Sized> Prefixed<'a, T> {
    pub fn new(tx: &'a mut T, prefix: &[u8]) -> Self {
        Self {
            tx,
            prefix: prefix.to_vec(),
        }
    }

    fn join(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

impl<T: Transaction + ?Sized> Transaction for Prefixed<'_, T> {
    fn get(&self, key: &[u8]) -> Result<Bytes, StateError> {
        self.tx.get(&self.join(key))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        let full = self.join(key);
        self.tx.set(&full, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StateError> {
        let full = self.join(key);
        self.tx.delete(&full)
    }

    fn iterate(
        &self,
        from: &[u8],
        to: Option<&[u8]>,
    ) -> Result<Box<dyn Cursor + '_>, StateError> {
        let full_from = self.join(from);
        let full_to = match to {
            Some(to) => Some(self.join(to)),
            // Unbounded within the view: clamp to the end of the prefix range.
            None => prefix_successor(&self.prefix),
        };
        let inner = self.tx.iterate(&full_from, full_to.as_deref())?;
        Ok(Box::new(PrefixCursor {
            inner,
            prefix_len: self.prefix.len(),
        }))
    }
}

struct PrefixCursor<'a> {
    inner: Box<dyn Cursor + 'a>,
    prefix_len: usize,
}

impl Cursor for PrefixCursor<'_> {
    fn next(&mut self) -> Result<Option<(Bytes, Bytes)>, StateError> {
        match self.inner.next()? {
            Some((key, value)) if key.len() >= self.prefix_len => {
                Ok(Some((key.slice(self.prefix_len..), value)))
            }
            _ => Ok(None),
        }
    }

    fn close(&mut self) -> Result<(), StateError> {
        self.inner.close()
    }
}

/// The smallest byte string greater than every string starting with `prefix`,
/// or `None` when no such string exists (all-0xFF prefixes).
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(out);
        }
        out.pop();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::traits::{Commit, Store};

    fn keys_under(tx: &impl Transaction) -> Vec<Bytes> {
        let mut cursor = tx.iterate(b"", None).unwrap();
        let mut out = Vec::new();
        while let Some((k, _)) = cursor.next().unwrap() {
            out.push(k);
        }
        out
    }

    #[test]
    fn test_prefix_isolation() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        {
            let mut a = Prefixed::new(&mut tx, b"a/");
            a.set(b"k", b"1").unwrap();
        }
        {
            let mut b = Prefixed::new(&mut tx, b"b/");
            b.set(b"k", b"2").unwrap();
            assert_eq!(b.get(b"k").unwrap(), Bytes::from_static(b"2"));
            assert_eq!(keys_under(&b), vec![Bytes::from_static(b"k")]);
        }
        let a = Prefixed::new(&mut tx, b"a/");
        assert_eq!(a.get(b"k").unwrap(), Bytes::from_static(b"1"));
    }

    #[test]
    fn test_nested_prefixes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        {
            let mut outer = Prefixed::new(&mut tx, b"outer/");
            let mut inner = Prefixed::new(&mut outer, b"inner/");
            inner.set(b"k", b"v").unwrap();
        }
        tx.commit().unwrap();

        let flat = store.begin().unwrap();
        assert_eq!(
            flat.get(b"outer/inner/k").unwrap(),
            Bytes::from_static(b"v")
        );
    }

    #[test]
    fn test_unbounded_scan_stays_in_prefix() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.set(b"a/x", b"").unwrap();
        tx.set(b"a0", b"").unwrap(); // sorts after "a/" range
        let view = Prefixed::new(&mut tx, b"a/");
        assert_eq!(keys_under(&view), vec![Bytes::from_static(b"x")]);
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(&[0x61, 0xFF]), Some(vec![0x62]));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
    }
}
