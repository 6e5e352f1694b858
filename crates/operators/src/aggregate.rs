//! Grouped aggregation driven by a trigger.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::{debug, warn};
use weir_core::{Event, GroupKey, Timestamp};
use weir_runtime::{Emitter, Operator};
use weir_state::{Commit, Prefixed, Store, Transaction};
use weir_triggers::TriggerDriver;

use crate::KeyedRecord;

// Keyspace handed to the trigger, so operator-owned state can live beside it
// in the same store without collisions.
const TRIGGER_SCOPE: &[u8] = b"trigger/";

/// Keyed streaming aggregation whose emission is governed by a trigger.
///
/// Per key the operator folds incoming values into an accumulator. Nothing is
/// emitted until the trigger fires the key; the fired key's current aggregate
/// is then forwarded downstream and acknowledged with `keys_fired`. Every
/// trigger interaction runs inside one storage transaction that this operator
/// begins and commits; if the trigger reports an error the cycle is aborted
/// before acknowledgement, so a retried cycle sees the same due keys.
///
/// # Example
///
/// ```ignore
/// // Sum per key, emitted after every 3rd record of that key.
/// let op = GroupedAggregateOperator::new(
///     MemoryStore::new(),
///     TriggerDriver::new(CountingTrigger::new(3)?),
///     |acc: &mut i64, v: &i64| *acc += v,
///     |acc: &i64| *acc,
/// );
/// ```
pub struct GroupedAggregateOperator<S, V, A, R, AF, RF>
where
    S: Store,
{
    store: S,
    driver: TriggerDriver,
    accumulators: HashMap<GroupKey, A>,
    accumulate_fn: AF,
    result_fn: RF,
    _phantom: PhantomData<(V, R)>,
}

impl<S, V, A, R, AF, RF> GroupedAggregateOperator<S, V, A, R, AF, RF>
where
    S: Store + Send + 'static,
    V: Send + 'static,
    A: Default + Send + 'static,
    R: Send + 'static,
    AF: Fn(&mut A, &V) + Send + 'static,
    RF: Fn(&A) -> R + Send + 'static,
{
    pub fn new(store: S, driver: TriggerDriver, accumulate_fn: AF, result_fn: RF) -> Self {
        Self {
            store,
            driver,
            accumulators: HashMap::new(),
            accumulate_fn,
            result_fn,
            _phantom: PhantomData,
        }
    }

    /// Polls the trigger, emits the fired aggregates, and acknowledges them.
    async fn fire_cycle(
        &mut self,
        tx: &mut dyn Transaction,
        out: &mut Emitter<KeyedRecord<GroupKey, R>>,
    ) -> Result<()> {
        loop {
            let keys = self.driver.poll(tx).context("trigger poll failed")?;
            if keys.is_empty() {
                return Ok(());
            }
            for key in &keys {
                // Borrow of the accumulator map must end before the send
                // suspends, so build the record first.
                let record = match self.accumulators.get(key) {
                    Some(acc) => Some(KeyedRecord {
                        key: key.clone(),
                        value: (self.result_fn)(acc),
                    }),
                    None => {
                        // A trigger only fires keys it has seen, so the
                        // accumulator should exist; a miss is survivable but
                        // worth hearing about.
                        warn!(%key, "fired key has no accumulator");
                        None
                    }
                };
                if let Some(record) = record {
                    out.data(record).await?;
                }
            }
            self.driver
                .keys_fired(tx, &keys)
                .context("trigger acknowledgement failed")?;
            debug!(fired = keys.len(), "trigger fired keys");
        }
    }
}

#[async_trait]
impl<S, V, A, R, AF, RF> Operator for GroupedAggregateOperator<S, V, A, R, AF, RF>
where
    S: Store + Send + 'static,
    V: Send + 'static,
    A: Default + Send + 'static,
    R: Send + 'static,
    AF: Fn(&mut A, &V) + Send + 'static,
    RF: Fn(&A) -> R + Send + 'static,
{
    type In = Event<GroupKey, V>;
    type Out = KeyedRecord<GroupKey, R>;

    async fn on_record(&mut self, record: Self::In, out: &mut Emitter<Self::Out>) -> Result<()> {
        let acc = self.accumulators.entry(record.key.clone()).or_default();
        (self.accumulate_fn)(acc, &record.value);

        let mut tx = self.store.begin().context("begin transaction")?;
        let mut scope = Prefixed::new(&mut tx, TRIGGER_SCOPE);
        self.driver
            .record_received(&mut scope, &record.key, record.ts)
            .context("trigger ingest failed")?;
        self.fire_cycle(&mut scope, out).await?;
        drop(scope);
        tx.commit().context("commit trigger state")
    }

    async fn on_watermark(
        &mut self,
        watermark: Timestamp,
        out: &mut Emitter<Self::Out>,
    ) -> Result<()> {
        let mut tx = self.store.begin().context("begin transaction")?;
        let mut scope = Prefixed::new(&mut tx, TRIGGER_SCOPE);
        self.driver
            .watermark_received(&mut scope, watermark)
            .context("trigger watermark failed")?;
        self.fire_cycle(&mut scope, out).await?;
        drop(scope);
        tx.commit().context("commit trigger state")?;
        out.watermark(watermark).await
    }

    async fn on_end(&mut self, out: &mut Emitter<Self::Out>) -> Result<()> {
        self.driver.end_of_stream_reached();
        let mut tx = self.store.begin().context("begin transaction")?;
        let mut scope = Prefixed::new(&mut tx, TRIGGER_SCOPE);
        self.fire_cycle(&mut scope, out).await?;
        drop(scope);
        tx.commit().context("commit trigger state")
    }
}
