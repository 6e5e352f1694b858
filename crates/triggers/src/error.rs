//! Trigger error kinds.

use weir_state::StateError;

/// Errors surfaced across the trigger interface.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// A storage operation failed. The enclosing transaction should be
    /// aborted and retried; the trigger itself holds no in-memory residue
    /// from the failed cycle.
    #[error("{context}")]
    Storage {
        context: &'static str,
        #[source]
        source: StateError,
    },

    /// Cancellation observed through the storage handle. Not retryable
    /// within the same cycle.
    #[error("trigger operation cancelled")]
    Cancelled,

    /// Persisted trigger state is internally inconsistent, or a caller broke
    /// a structural precondition. Fatal: a storage-backed trigger refuses
    /// further operations after reporting this.
    #[error("trigger invariant violated: {0}")]
    Invariant(String),

    /// Invalid construction parameters. Raised at construction, never at
    /// runtime.
    #[error("invalid trigger configuration: {0}")]
    Config(String),
}

/// Maps a storage error into the trigger domain, wrapping with a short
/// context string. `Cancelled` and corrupt-state errors keep their kind.
pub(crate) fn from_state(context: &'static str) -> impl FnOnce(StateError) -> TriggerError {
    move |source| match source {
        StateError::Cancelled => TriggerError::Cancelled,
        StateError::Corrupt(detail) => TriggerError::Invariant(detail),
        source => TriggerError::Storage { context, source },
    }
}
