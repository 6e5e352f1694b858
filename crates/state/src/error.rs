//! Storage error kinds.

/// Errors surfaced by stores and transactions.
///
/// `NotFound` is a signal, not a failure: callers that can recover from an
/// absent key match on it explicitly. Everything else aborts the enclosing
/// transaction.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The requested key does not exist.
    #[error("key not found")]
    NotFound,

    /// The cancellation signal attached to this handle was raised.
    #[error("operation cancelled")]
    Cancelled,

    /// The underlying backend failed.
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A stored entry could not be interpreted.
    #[error("corrupt state entry: {0}")]
    Corrupt(String),
}

impl StateError {
    /// True for the recoverable absent-key signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound)
    }
}
