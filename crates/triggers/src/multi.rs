//! Logical-OR composition of triggers.

use std::collections::HashSet;

use weir_core::{GroupKey, Timestamp};
use weir_state::Transaction;

use crate::error::TriggerError;
use crate::Trigger;

/// Fires a key when any child trigger fires it.
///
/// Ingest, watermarks and end-of-stream broadcast to every child in
/// construction order. A poll concatenates the children's output, removes
/// duplicates keeping the first occurrence, and then acknowledges the fired
/// keys to every child (not only the one that produced them), so that a
/// pending delay timer is cancelled when the watermark fires the same key
/// first.
pub struct MultiTrigger {
    children: Vec<Trigger>,
}

impl MultiTrigger {
    pub fn new(children: Vec<Trigger>) -> Self {
        Self { children }
    }

    pub fn record_received(
        &mut self,
        tx: &mut dyn Transaction,
        key: &GroupKey,
        event_time: Timestamp,
    ) -> Result<(), TriggerError> {
        for child in &mut self.children {
            child.record_received(tx, key, event_time)?;
        }
        Ok(())
    }

    pub fn watermark_received(
        &mut self,
        tx: &mut dyn Transaction,
        watermark: Timestamp,
    ) -> Result<(), TriggerError> {
        for child in &mut self.children {
            child.watermark_received(tx, watermark)?;
        }
        Ok(())
    }

    pub fn end_of_stream_reached(&mut self) {
        for child in &mut self.children {
            child.end_of_stream_reached();
        }
    }

    pub fn poll(&mut self, tx: &mut dyn Transaction) -> Result<Vec<GroupKey>, TriggerError> {
        let mut seen = HashSet::new();
        let mut output = Vec::new();
        for child in &mut self.children {
            for key in child.poll(tx)? {
                if seen.insert(key.clone()) {
                    output.push(key);
                }
            }
        }
        // Cross-child acknowledgement cancels sibling schedules for keys
        // another child just fired.
        for child in &mut self.children {
            child.keys_fired(tx, &output)?;
        }
        Ok(output)
    }

    pub fn keys_fired(
        &mut self,
        tx: &mut dyn Transaction,
        keys: &[GroupKey],
    ) -> Result<(), TriggerError> {
        for child in &mut self.children {
            child.keys_fired(tx, keys)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CountingTrigger, DelayTrigger, WatermarkTrigger};
    use std::sync::Arc;
    use std::time::Duration;
    use weir_core::{ManualClock, Value};
    use weir_state::{MemoryStore, Store};

    const SEC: u64 = 1_000_000_000;

    fn key(t: u64, name: &str) -> GroupKey {
        GroupKey::new(vec![Value::Time(t), Value::Str(name.into())])
    }

    #[test]
    fn test_watermark_fire_cancels_delay_timer() {
        // S5: watermark OR delay(10s); the watermark fires first, and the
        // cross-child acknowledgement cancels the pending delay entry.
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(0));
        let mut trigger = MultiTrigger::new(vec![
            Trigger::from(WatermarkTrigger::new()),
            Trigger::from(DelayTrigger::new(Duration::from_secs(10), clock.clone()).unwrap()),
        ]);

        let mut tx = store.begin().unwrap();
        let k = key(5, "k");
        trigger.record_received(&mut tx, &k, 5).unwrap();
        trigger.watermark_received(&mut tx, 5).unwrap();
        assert_eq!(trigger.poll(&mut tx).unwrap(), vec![k.clone()]);

        clock.set(11 * SEC);
        assert!(trigger.poll(&mut tx).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_keys_deduplicated() {
        // Two counting children with different thresholds can both fire the
        // same key; the combined output carries it once.
        let store = MemoryStore::new();
        let mut trigger = MultiTrigger::new(vec![
            Trigger::from(CountingTrigger::new(2).unwrap()),
            Trigger::from(CountingTrigger::new(2).unwrap()),
        ]);

        let mut tx = store.begin().unwrap();
        let k = key(1, "dup");
        trigger.record_received(&mut tx, &k, 1).unwrap();
        trigger.record_received(&mut tx, &k, 1).unwrap();
        assert_eq!(trigger.poll(&mut tx).unwrap(), vec![k]);
    }

    #[test]
    fn test_child_order_preserved() {
        let store = MemoryStore::new();
        let mut trigger = MultiTrigger::new(vec![
            Trigger::from(CountingTrigger::new(1).unwrap()),
            Trigger::from(WatermarkTrigger::new()),
        ]);

        let mut tx = store.begin().unwrap();
        let a = key(30, "a");
        let b = key(10, "b");
        // The counting child queues in arrival order; the watermark child
        // would order by event time. Child order wins for the combined poll.
        trigger.record_received(&mut tx, &a, 30).unwrap();
        trigger.record_received(&mut tx, &b, 10).unwrap();
        trigger.watermark_received(&mut tx, 40).unwrap();
        assert_eq!(trigger.poll(&mut tx).unwrap(), vec![a, b]);
    }
}
