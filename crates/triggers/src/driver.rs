//! Operator-facing trigger adapter.

use tracing::debug;
use weir_core::{GroupKey, Timestamp};
use weir_state::Transaction;

use crate::error::TriggerError;
use crate::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Active,
    EndOfStreamSeen,
    Drained,
}

/// The adapter an aggregation operator drives.
///
/// Forwards every call to the wrapped trigger and tracks the end-of-stream
/// lifecycle: `Active` while the input flows, `EndOfStreamSeen` once the
/// operator reports exhaustion, and `Drained` after a poll comes back empty
/// with no interleaved ingest. Once drained, no key can ever fire again and
/// all further calls are absorbed as no-ops.
///
/// Storage errors pass through untouched: the operator aborts the poll cycle
/// without acknowledging, and the retried transaction sees the same due-set.
pub struct TriggerDriver {
    trigger: Trigger,
    state: DriverState,
    received_since_poll: bool,
}

impl TriggerDriver {
    pub fn new(trigger: impl Into<Trigger>) -> Self {
        Self {
            trigger: trigger.into(),
            state: DriverState::Active,
            received_since_poll: false,
        }
    }

    /// True once the trigger can never fire another key.
    pub fn is_drained(&self) -> bool {
        self.state == DriverState::Drained
    }

    pub fn record_received(
        &mut self,
        tx: &mut dyn Transaction,
        key: &GroupKey,
        event_time: Timestamp,
    ) -> Result<(), TriggerError> {
        if self.state == DriverState::Drained {
            return Ok(());
        }
        self.received_since_poll = true;
        self.trigger.record_received(tx, key, event_time)
    }

    pub fn watermark_received(
        &mut self,
        tx: &mut dyn Transaction,
        watermark: Timestamp,
    ) -> Result<(), TriggerError> {
        if self.state == DriverState::Drained {
            return Ok(());
        }
        self.trigger.watermark_received(tx, watermark)
    }

    pub fn end_of_stream_reached(&mut self) {
        if self.state == DriverState::Active {
            debug!("trigger saw end of stream");
            self.state = DriverState::EndOfStreamSeen;
            self.trigger.end_of_stream_reached();
        }
    }

    pub fn poll(&mut self, tx: &mut dyn Transaction) -> Result<Vec<GroupKey>, TriggerError> {
        if self.state == DriverState::Drained {
            return Ok(Vec::new());
        }
        let received = self.received_since_poll;
        // On error the flag is left as-is so the retried cycle behaves the
        // same way.
        let keys = self.trigger.poll(tx)?;
        self.received_since_poll = false;
        if self.state == DriverState::EndOfStreamSeen && keys.is_empty() && !received {
            debug!("trigger drained");
            self.state = DriverState::Drained;
        }
        Ok(keys)
    }

    pub fn keys_fired(
        &mut self,
        tx: &mut dyn Transaction,
        keys: &[GroupKey],
    ) -> Result<(), TriggerError> {
        if self.state == DriverState::Drained {
            return Ok(());
        }
        self.trigger.keys_fired(tx, keys)
    }
}
