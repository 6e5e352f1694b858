//! Runtime for trigger-driven operator pipelines.
//!
//! Operators here speak the same alphabet a trigger is driven with: records,
//! watermark advancement, and end of stream. The runtime owns the stream
//! discipline those triggers rely on, so individual operators do not have to
//! re-implement it:
//!
//! - watermarks are monotone on every edge: stale or repeated marks are
//!   dropped both entering an operator and leaving an [`Emitter`], matching
//!   the never-undone guarantee triggers assume;
//! - end of stream is always delivered: a bounded source terminates its
//!   stream when it finishes, so downstream end-of-stream flushes run even if
//!   the source author forgets to say so;
//! - every spawned stage reports its record and watermark traffic when it
//!   stops, which is usually enough to see why a key never fired.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error};
use weir_core::{StreamMessage, Timestamp};

pub type Sender<T> = mpsc::Sender<StreamMessage<T>>;
pub type Receiver<T> = mpsc::Receiver<StreamMessage<T>>;

/// Outbound edge of an operator or source.
///
/// Tracks what has been emitted: watermark regressions and repeats are
/// dropped here, so a downstream trigger can trust that every watermark it
/// observes advances the bound.
pub struct Emitter<T> {
    tx: Sender<T>,
    watermark: Option<Timestamp>,
    records_out: u64,
}

impl<T: Send + 'static> Emitter<T> {
    pub fn new(tx: Sender<T>) -> Self {
        Self {
            tx,
            watermark: None,
            records_out: 0,
        }
    }

    pub async fn data(&mut self, item: T) -> Result<()> {
        self.records_out += 1;
        self.send(StreamMessage::Data(item)).await
    }

    /// Forwards a watermark. A mark that does not advance the previously
    /// emitted one is silently dropped.
    pub async fn watermark(&mut self, ts: Timestamp) -> Result<()> {
        if self.watermark.is_some_and(|prev| ts <= prev) {
            return Ok(());
        }
        self.watermark = Some(ts);
        self.send(StreamMessage::Watermark(ts)).await
    }

    pub async fn end(&mut self) -> Result<()> {
        self.send(StreamMessage::End).await
    }

    /// The highest watermark emitted so far, if any.
    pub fn last_watermark(&self) -> Option<Timestamp> {
        self.watermark
    }

    pub fn records_out(&self) -> u64 {
        self.records_out
    }

    async fn send(&mut self, msg: StreamMessage<T>) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| anyhow::anyhow!("downstream channel closed"))
    }
}

/// An operator over a keyed stream.
///
/// The handler set mirrors the calls an aggregation operator forwards to its
/// trigger, so a trigger-driving operator maps each handler onto one trigger
/// cycle. The run loop guarantees `on_watermark` only sees advancing marks
/// and that `on_end` runs exactly once, before End is forwarded downstream.
#[async_trait]
pub trait Operator: Send + 'static {
    type In: Send + 'static;
    type Out: Send + 'static;

    async fn on_record(&mut self, record: Self::In, out: &mut Emitter<Self::Out>) -> Result<()>;

    /// Called when the upstream watermark advances. The default forwards it.
    async fn on_watermark(
        &mut self,
        watermark: Timestamp,
        out: &mut Emitter<Self::Out>,
    ) -> Result<()> {
        out.watermark(watermark).await
    }

    /// Called once when the input is exhausted, before End goes downstream.
    /// This is where trigger-driving operators flush.
    async fn on_end(&mut self, out: &mut Emitter<Self::Out>) -> Result<()> {
        let _ = out;
        Ok(())
    }
}

/// Create a bounded channel for stream messages.
pub fn stream_channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    mpsc::channel(capacity)
}

/// Spawn an operator as an async task.
pub fn spawn_operator<O>(name: &'static str, mut op: O, mut rx: Receiver<O::In>, tx: Sender<O::Out>)
where
    O: Operator,
{
    tokio::spawn(async move {
        let mut out = Emitter::new(tx);
        let mut records_in: u64 = 0;
        let mut input_watermark: Option<Timestamp> = None;
        debug!(%name, "operator started");

        while let Some(msg) = rx.recv().await {
            let result = match msg {
                StreamMessage::Data(record) => {
                    records_in += 1;
                    op.on_record(record, &mut out).await
                }
                StreamMessage::Watermark(wm) => {
                    if input_watermark.is_some_and(|prev| wm <= prev) {
                        debug!(%name, watermark = wm, "stale watermark dropped");
                        continue;
                    }
                    input_watermark = Some(wm);
                    op.on_watermark(wm, &mut out).await
                }
                StreamMessage::End => {
                    let result = op.on_end(&mut out).await;
                    if result.is_ok() {
                        let _ = out.end().await;
                    }
                    match result {
                        Ok(()) => break,
                        err => err,
                    }
                }
            };

            if let Err(e) = result {
                error!(%name, error = %e, "operator error");
                let _ = out.end().await;
                break;
            }
        }

        debug!(
            %name,
            records_in,
            records_out = out.records_out(),
            watermark = out.last_watermark().unwrap_or(0),
            "operator stopped"
        );
    });
}

/// Spawn a sink: consumes messages and applies a handler.
pub fn spawn_sink<T, F>(name: &'static str, mut rx: Receiver<T>, mut f: F)
where
    T: Send + 'static,
    F: FnMut(StreamMessage<T>) -> Result<()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut records_in: u64 = 0;
        debug!(%name, "sink started");
        while let Some(msg) = rx.recv().await {
            let is_end = matches!(msg, StreamMessage::End);
            if matches!(msg, StreamMessage::Data(_)) {
                records_in += 1;
            }
            if let Err(e) = f(msg) {
                error!(%name, error = %e, "sink handler error");
                break;
            }
            if is_end {
                break;
            }
        }
        debug!(%name, records_in, "sink stopped");
    });
}

/// Spawn a bounded source.
///
/// The producer receives the emitter and hands it back when the input is
/// exhausted; the runtime then ends the stream, so downstream triggers always
/// get their end-of-stream flush. A producer that fails ends the stream too,
/// rather than leaving it dangling.
pub fn spawn_source<T, F, Fut>(name: &'static str, tx: Sender<T>, f: F)
where
    T: Send + 'static,
    F: FnOnce(Emitter<T>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<Emitter<T>>> + Send,
{
    tokio::spawn(async move {
        debug!(%name, "source started");
        match f(Emitter::new(tx)).await {
            Ok(mut out) => {
                let _ = out.end().await;
                debug!(
                    %name,
                    records_out = out.records_out(),
                    watermark = out.last_watermark().unwrap_or(0),
                    "source finished"
                );
            }
            Err(e) => {
                error!(%name, error = %e, "source error");
            }
        }
    });
}
