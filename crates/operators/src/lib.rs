//! Aggregation operators that drive triggers.
//!
//! The trigger subsystem decides *when* grouped results are emitted; the
//! operator here owns the partial aggregates, feeds the trigger on every
//! message, and forwards fired aggregates downstream.

mod aggregate;

pub use aggregate::GroupedAggregateOperator;

/// A keyed record carrying one group's current aggregate.
#[derive(Debug, Clone)]
pub struct KeyedRecord<K, T> {
    pub key: K,
    pub value: T,
}
