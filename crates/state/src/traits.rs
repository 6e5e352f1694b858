//! Core traits for transactional ordered key-value storage.

use bytes::Bytes;

use crate::error::StateError;

/// A handle to an ordered key-value store that can open transactions.
pub trait Store: Send + Sync {
    /// The concrete transaction type; committing requires it (see [`Commit`]).
    type Tx: Transaction + Commit;

    /// Opens a transaction. Writes are buffered until [`Commit::commit`];
    /// dropping the transaction discards them.
    fn begin(&self) -> Result<Self::Tx, StateError>;
}

/// Buffered read-write access to an ordered byte keyspace.
///
/// The trait is object-safe so that components which must not commit can be
/// handed a `&mut dyn Transaction`.
pub trait Transaction: Send {
    /// Reads a key. Returns [`StateError::NotFound`] when absent.
    fn get(&self, key: &[u8]) -> Result<Bytes, StateError>;

    /// Writes a key. Visible to subsequent reads in the same transaction.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError>;

    /// Removes a key. Removing an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), StateError>;

    /// Ascending scan over `[from, to)`; `to = None` scans to the end of the
    /// keyspace. The cursor observes this transaction's own writes and may
    /// be abandoned early; [`Cursor::close`] releases backend resources.
    fn iterate(&self, from: &[u8], to: Option<&[u8]>)
        -> Result<Box<dyn Cursor + '_>, StateError>;
}

/// Commit for concrete transaction types.
///
/// Deliberately separate from [`Transaction`] and consuming `self`, so a
/// `dyn Transaction` cannot commit.
pub trait Commit {
    fn commit(self) -> Result<(), StateError>;
}

/// A cursor over an ascending range scan.
pub trait Cursor {
    /// The next entry in ascending byte order, or `None` when exhausted.
    fn next(&mut self) -> Result<Option<(Bytes, Bytes)>, StateError>;

    /// Releases backend resources. Dropping the cursor has the same effect;
    /// the explicit form exists for callers that terminate scans early.
    fn close(&mut self) -> Result<(), StateError> {
        Ok(())
    }
}
