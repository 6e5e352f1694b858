//! Core types shared across the engine.
//!
//! The stream message alphabet, the time domain, typed values, and the group
//! keys that identify aggregation groups as they travel between an operator
//! and its trigger.

use serde::{Deserialize, Serialize};

mod key;
mod time;
mod value;

pub use key::{GroupKey, KeyCodecError};
pub use time::{Clock, ManualClock, SystemClock};
pub use value::Value;

/// Nanoseconds since Unix epoch, in a single monotonic time domain.
///
/// Both event time (carried inside records and keys) and processing time
/// (read from a [`Clock`]) live in this domain.
pub type Timestamp = u64;

/// Messages flowing through operator edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamMessage<T> {
    Data(T),
    /// Event-time watermark: no later record should carry an event time
    /// below this bound.
    Watermark(Timestamp),
    /// End of stream (for bounded inputs / controlled shutdown).
    End,
}

/// A keyed event used by the aggregation operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<K, V> {
    pub ts: Timestamp,
    pub key: K,
    pub value: V,
}
