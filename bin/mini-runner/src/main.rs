use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;
use weir_core::{Event, GroupKey, StreamMessage, SystemClock, Timestamp, Value};
use weir_operators::{GroupedAggregateOperator, KeyedRecord};
use weir_runtime::{spawn_operator, spawn_sink, spawn_source, stream_channel, Emitter};
use weir_state::MemoryStore;
use weir_triggers::{TriggerDriver, TriggerSpec};

const MS: Timestamp = 1_000_000; // nanoseconds per millisecond

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    info!("Starting weir trigger demo");

    // Grouped sum whose emission is gated by: watermark coverage OR 500ms of
    // key inactivity, whichever comes first.
    let clock = Arc::new(SystemClock::new());
    let spec = TriggerSpec::Any(vec![
        TriggerSpec::Watermark,
        TriggerSpec::Delay {
            delay: Duration::from_millis(500),
        },
    ]);
    let driver = TriggerDriver::new(spec.build(clock)?);

    let aggregate = GroupedAggregateOperator::new(
        MemoryStore::new(),
        driver,
        |acc: &mut i64, v: &i64| *acc += v,
        |acc: &i64| *acc,
    );

    // Bounded channels enforce backpressure (at least locally).
    let (tx0, rx0) = stream_channel::<Event<GroupKey, i64>>(32);
    let (tx1, rx1) = stream_channel::<KeyedRecord<GroupKey, i64>>(32);

    spawn_operator("grouped_sum", aggregate, rx0, tx1);

    spawn_sink("stdout_sink", rx1, |msg| {
        match msg {
            StreamMessage::Data(KeyedRecord { key, value }) => {
                println!("fired key={} sum={}", key, value);
            }
            StreamMessage::Watermark(wm) => {
                info!(watermark = wm, "watermark advanced");
            }
            StreamMessage::End => {
                info!("stream ended");
            }
        }
        Ok(())
    });

    // Source (in-process) producing a small out-of-order event stream. The
    // runtime ends the stream when the producer finishes, which flushes the
    // triggers downstream.
    spawn_source("demo_source", tx0, source_task);

    // Give the pipeline a moment to drain.
    sleep(Duration::from_millis(800)).await;
    info!("Demo complete");
    Ok(())
}

async fn source_task(
    mut out: Emitter<Event<GroupKey, i64>>,
) -> Result<Emitter<Event<GroupKey, i64>>> {
    // Synthetic out-of-order stream; the leading time value makes event time
    // the primary sort of the group key.
    let events: Vec<(Timestamp, &str, i64)> = vec![
        (1_000 * MS, "a", 1),
        (2_000 * MS, "b", 1),
        (6_000 * MS, "a", 5),
        (3_000 * MS, "a", 1), // out-of-order but within watermark lateness
        (7_000 * MS, "b", 2),
        (10_000 * MS, "a", 3),
        (12_000 * MS, "b", 1),
        (16_000 * MS, "b", 4),
    ];

    let mut max_ts: Timestamp = 0;
    let lateness: Timestamp = 2_000 * MS;

    for (i, (ts, name, value)) in events.into_iter().enumerate() {
        max_ts = max_ts.max(ts);

        out.data(Event {
            ts,
            key: GroupKey::new(vec![Value::Time(ts), Value::Str(name.to_string())]),
            value,
        })
        .await?;

        // Periodically emit a watermark; the emitter drops any that would
        // regress.
        if i % 3 == 2 {
            out.watermark(max_ts.saturating_sub(lateness)).await?;
        }

        sleep(Duration::from_millis(50)).await;
    }

    // Final watermark to cover all keys.
    out.watermark(max_ts).await?;
    Ok(out)
}
