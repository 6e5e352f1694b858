//! Trigger policies for grouped streaming aggregations.
//!
//! An aggregation operator maintains per-key partial state; a trigger decides
//! *when* a key's current aggregate is emitted downstream. The operator
//! drives its trigger through five calls:
//!
//! - `record_received(tx, key, event_time)` on every ingested record
//! - `watermark_received(tx, watermark)` when the upstream watermark advances
//! - `end_of_stream_reached()` once the input is exhausted
//! - `poll(tx)` to collect the keys that are ready to fire
//! - `keys_fired(tx, keys)` to acknowledge that the fired aggregates were
//!   read and forwarded
//!
//! A trigger instance is driven single-threaded by its operator; storage-backed
//! variants run inside the transaction the operator supplies and never commit
//! it themselves. See [`TriggerDriver`] for the polling lifecycle around end
//! of stream.
//!
//! The built-in policies:
//! - [`CountingTrigger`]: fire after N receipts of a key
//! - [`WatermarkTrigger`]: fire keys whose event time the watermark covers
//! - [`DelayTrigger`]: fire keys that have been inactive for a fixed duration
//! - [`MultiTrigger`]: logical OR of any of the above

mod config;
mod counting;
mod delay;
mod driver;
mod error;
mod multi;
mod time_sorted_keys;
mod watermark;

pub use config::TriggerSpec;
pub use counting::CountingTrigger;
pub use delay::DelayTrigger;
pub use driver::TriggerDriver;
pub use error::TriggerError;
pub use multi::MultiTrigger;
pub use time_sorted_keys::TimeSortedKeys;
pub use watermark::WatermarkTrigger;

use weir_core::{GroupKey, Timestamp};
use weir_state::Transaction;

/// A trigger policy.
///
/// Closed set of the built-in policies (plus the recursive [`MultiTrigger`]
/// case) so that composition can broadcast across children without dynamic
/// dispatch. In-memory variants ignore the transaction; [`DelayTrigger`]
/// keeps all of its state behind it.
pub enum Trigger {
    Counting(CountingTrigger),
    Watermark(WatermarkTrigger),
    Delay(DelayTrigger),
    Multi(MultiTrigger),
}

impl Trigger {
    /// Notes a received record for `key`. For in-memory triggers this is
    /// synchronous bookkeeping; the delay trigger writes its schedule through
    /// `tx`.
    pub fn record_received(
        &mut self,
        tx: &mut dyn Transaction,
        key: &GroupKey,
        event_time: Timestamp,
    ) -> Result<(), TriggerError> {
        match self {
            Trigger::Counting(t) => {
                t.record_received(key.clone());
                Ok(())
            }
            Trigger::Watermark(t) => t.record_received(key.clone()),
            Trigger::Delay(t) => t.record_received(tx, key, event_time),
            Trigger::Multi(t) => t.record_received(tx, key, event_time),
        }
    }

    /// Observes an advanced watermark. Never undone by a later call with a
    /// smaller value.
    pub fn watermark_received(
        &mut self,
        tx: &mut dyn Transaction,
        watermark: Timestamp,
    ) -> Result<(), TriggerError> {
        match self {
            Trigger::Counting(t) => {
                t.watermark_received(watermark);
                Ok(())
            }
            Trigger::Watermark(t) => {
                t.watermark_received(watermark);
                Ok(())
            }
            Trigger::Delay(t) => t.watermark_received(tx, watermark),
            Trigger::Multi(t) => t.watermark_received(tx, watermark),
        }
    }

    pub fn end_of_stream_reached(&mut self) {
        match self {
            Trigger::Counting(t) => t.end_of_stream_reached(),
            Trigger::Watermark(t) => t.end_of_stream_reached(),
            Trigger::Delay(t) => t.end_of_stream_reached(),
            Trigger::Multi(t) => t.end_of_stream_reached(),
        }
    }

    /// Collects the keys that are ready to fire. Each call returns a fresh
    /// owned vector; the result stays valid across later trigger calls.
    pub fn poll(&mut self, tx: &mut dyn Transaction) -> Result<Vec<GroupKey>, TriggerError> {
        match self {
            Trigger::Counting(t) => Ok(t.poll()),
            Trigger::Watermark(t) => Ok(t.poll()),
            Trigger::Delay(t) => t.poll(tx),
            Trigger::Multi(t) => t.poll(tx),
        }
    }

    /// Acknowledges that the fired keys were consumed. Idempotent.
    pub fn keys_fired(
        &mut self,
        tx: &mut dyn Transaction,
        keys: &[GroupKey],
    ) -> Result<(), TriggerError> {
        match self {
            Trigger::Counting(t) => {
                t.keys_fired(keys);
                Ok(())
            }
            Trigger::Watermark(t) => {
                t.keys_fired(keys);
                Ok(())
            }
            Trigger::Delay(t) => t.keys_fired(tx, keys),
            Trigger::Multi(t) => t.keys_fired(tx, keys),
        }
    }
}

impl From<CountingTrigger> for Trigger {
    fn from(t: CountingTrigger) -> Self {
        Trigger::Counting(t)
    }
}

impl From<WatermarkTrigger> for Trigger {
    fn from(t: WatermarkTrigger) -> Self {
        Trigger::Watermark(t)
    }
}

impl From<DelayTrigger> for Trigger {
    fn from(t: DelayTrigger) -> Self {
        Trigger::Delay(t)
    }
}

impl From<MultiTrigger> for Trigger {
    fn from(t: MultiTrigger) -> Self {
        Trigger::Multi(t)
    }
}
