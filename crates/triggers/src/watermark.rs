//! Event-time watermark trigger.

use std::collections::BTreeSet;

use weir_core::{GroupKey, Timestamp};

use crate::error::TriggerError;

/// Fires keys whose event time is covered by the current watermark.
///
/// Keys are held in a set ordered by full key order. Event time MUST be the
/// first element of the key: that makes it the primary sort key, so an
/// in-order walk can stop at the first key past the watermark and a poll
/// costs time proportional to its output. Keys without a time value at
/// position 0 are rejected on ingest.
pub struct WatermarkTrigger {
    time_keys: BTreeSet<GroupKey>,
    watermark: Timestamp,
    end_of_stream_reached: bool,
}

impl Default for WatermarkTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl WatermarkTrigger {
    pub fn new() -> Self {
        Self {
            time_keys: BTreeSet::new(),
            watermark: 0,
            end_of_stream_reached: false,
        }
    }

    /// Idempotent insert. Rejects keys that do not carry their event time at
    /// position 0, since the set order would no longer be time-first.
    pub fn record_received(&mut self, key: GroupKey) -> Result<(), TriggerError> {
        if key.event_time().is_none() {
            return Err(TriggerError::Invariant(format!(
                "watermark trigger requires a time value at key position 0, got {}",
                key
            )));
        }
        self.time_keys.insert(key);
        Ok(())
    }

    /// Watermarks are monotone: a regression is clamped to the previous value.
    pub fn watermark_received(&mut self, watermark: Timestamp) {
        self.watermark = self.watermark.max(watermark);
    }

    pub fn end_of_stream_reached(&mut self) {
        self.end_of_stream_reached = true;
    }

    /// Keys with event time `<= watermark`, in ascending key order; the walk
    /// stops at the first key past the watermark. After end of stream the
    /// whole set drains instead.
    pub fn poll(&mut self) -> Vec<GroupKey> {
        if self.end_of_stream_reached {
            return std::mem::take(&mut self.time_keys).into_iter().collect();
        }

        let mut output = Vec::new();
        while let Some(key) = self.time_keys.pop_first() {
            match key.event_time() {
                Some(t) if t <= self.watermark => output.push(key),
                _ => {
                    // First key past the watermark: nothing later is ready.
                    self.time_keys.insert(key);
                    break;
                }
            }
        }
        output
    }

    pub fn keys_fired(&mut self, _keys: &[GroupKey]) {}
}
