//! Count-based trigger.

use std::collections::{BTreeMap, BTreeSet};

use weir_core::{GroupKey, Timestamp};

use crate::error::TriggerError;

/// Fires a key once it has been received `trigger_after` times.
///
/// Counts live in memory. A key sits in exactly one place at a time: the
/// counts map (still accumulating), the fire queue (threshold reached,
/// not yet polled), or nowhere (fired). On end of stream the remaining
/// counted keys are flushed in ascending key order.
pub struct CountingTrigger {
    trigger_after: u64,
    counts: BTreeMap<GroupKey, u64>,
    // Fire queue in threshold-cross order, with a membership mirror so a
    // queued key is not also counted.
    to_fire: Vec<GroupKey>,
    queued: BTreeSet<GroupKey>,
    end_of_stream_reached: bool,
}

impl CountingTrigger {
    pub fn new(trigger_after: u64) -> Result<Self, TriggerError> {
        if trigger_after == 0 {
            return Err(TriggerError::Config(
                "counting trigger threshold must be at least 1".into(),
            ));
        }
        Ok(Self {
            trigger_after,
            counts: BTreeMap::new(),
            to_fire: Vec::new(),
            queued: BTreeSet::new(),
            end_of_stream_reached: false,
        })
    }

    pub fn record_received(&mut self, key: GroupKey) {
        if self.queued.contains(&key) {
            // Already waiting to fire; counting again would put the key in
            // two places at once.
            return;
        }
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count >= self.trigger_after {
            self.counts.remove(&key);
            self.queued.insert(key.clone());
            self.to_fire.push(key);
        }
    }

    pub fn watermark_received(&mut self, _watermark: Timestamp) {}

    pub fn end_of_stream_reached(&mut self) {
        self.end_of_stream_reached = true;
    }

    /// Keys whose count reached the threshold since the last poll, in the
    /// order the thresholds were crossed; after end of stream, additionally
    /// every still-counted key in ascending key order.
    pub fn poll(&mut self) -> Vec<GroupKey> {
        let mut output = std::mem::take(&mut self.to_fire);
        self.queued.clear();
        if self.end_of_stream_reached {
            output.extend(std::mem::take(&mut self.counts).into_keys());
        }
        output
    }

    /// State is already dropped at fire time, so acknowledgement is a no-op.
    pub fn keys_fired(&mut self, _keys: &[GroupKey]) {}
}
