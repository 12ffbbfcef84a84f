//! Single-consumer fan-in stage writing logical records to the sink
//!
//! Every shard task sends into one bounded channel; this writer is the only
//! receiver. Writes go through a `BufWriter` guarded by a mutex that is shared
//! with a periodic flush task, so output stays prompt when records trickle in
//! without paying a flush per record.
//!
//! The sink is a blocking [`Write`], typically stdout. Every write and flush
//! runs on the blocking pool, so a reader that stops draining a pipe stalls
//! only this writer and never the runtime threads the shard tasks need.

use bytes::Bytes;
use parking_lot::Mutex;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, trace, warn};

use crate::error::WriterError;
use crate::msgpack;

/// Most records received and written per blocking call
const WRITE_BATCH: usize = 256;

/// How record payloads are rendered on the sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Bytes are written exactly as received
    #[default]
    Raw,
    /// Payloads are MessagePack and are rewritten as JSON
    MessagePack,
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Write `\n` after every record
    pub append_newline: bool,
    pub payload_format: PayloadFormat,
    /// Period of the background flush
    pub flush_interval: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            append_newline: false,
            payload_format: PayloadFormat::Raw,
            flush_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub records_written: u64,
    pub bytes_written: u64,
}

type SharedSink<W> = Arc<Mutex<BufWriter<W>>>;

pub struct FanInWriter<W: Write + Send + 'static> {
    sink: SharedSink<W>,
    config: WriterConfig,
}

impl<W: Write + Send + 'static> FanInWriter<W> {
    pub fn new(sink: W, config: WriterConfig) -> Self {
        Self {
            sink: Arc::new(Mutex::new(BufWriter::new(sink))),
            config,
        }
    }

    /// Drain `rx` into the sink until every sender is gone.
    ///
    /// The flush task runs until `stop` flips to `true` or the writer
    /// returns, whichever comes first. A decode, encode or I/O failure stops
    /// the writer; what was written before it is flushed, and the receiver
    /// is dropped so remaining senders fail instead of blocking.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<Bytes>,
        stop: watch::Receiver<bool>,
    ) -> Result<WriterStats, WriterError> {
        let flusher = tokio::spawn(periodic_flush(
            self.sink.clone(),
            self.config.flush_interval,
            stop,
        ));

        let result = self.drain(&mut rx).await;
        drop(rx);

        flusher.abort();
        let _ = flusher.await;

        let final_flush = flush(self.sink.clone()).await;
        match result {
            Ok(stats) => {
                final_flush?;
                debug!(
                    records = stats.records_written,
                    bytes = stats.bytes_written,
                    "Writer drained"
                );
                Ok(stats)
            }
            Err(e) => {
                error!(error = %e, "Writer stopped, output truncated");
                Err(e)
            }
        }
    }

    async fn drain(&self, rx: &mut mpsc::Receiver<Bytes>) -> Result<WriterStats, WriterError> {
        let mut stats = WriterStats::default();
        let mut batch = Vec::with_capacity(WRITE_BATCH);

        while rx.recv_many(&mut batch, WRITE_BATCH).await > 0 {
            // Records before a bad payload still reach the sink
            let mut rendered = Vec::with_capacity(batch.len());
            let mut failure = None;
            for payload in batch.drain(..) {
                match self.render(payload) {
                    Ok(record) => rendered.push(record),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            let count = rendered.len() as u64;
            stats.bytes_written += self.write_batch(rendered).await?;
            stats.records_written += count;
            if let Some(e) = failure {
                return Err(e);
            }
        }

        trace!("Input channel closed");
        Ok(stats)
    }

    fn render(&self, payload: Bytes) -> Result<Bytes, WriterError> {
        match self.config.payload_format {
            PayloadFormat::Raw => Ok(payload),
            PayloadFormat::MessagePack => Ok(Bytes::from(msgpack::to_json(&payload)?)),
        }
    }

    async fn write_batch(&self, records: Vec<Bytes>) -> Result<u64, WriterError> {
        if records.is_empty() {
            return Ok(0);
        }
        let sink = self.sink.clone();
        let append_newline = self.config.append_newline;
        let written = tokio::task::spawn_blocking(move || write_records(&sink, &records, append_newline))
            .await
            .map_err(std::io::Error::other)??;
        Ok(written)
    }
}

/// Each payload and its separator go out under one lock so a flush never splits them.
fn write_records<W: Write>(
    sink: &Mutex<BufWriter<W>>,
    records: &[Bytes],
    append_newline: bool,
) -> std::io::Result<u64> {
    let mut sink = sink.lock();
    let mut written = 0;
    for payload in records {
        sink.write_all(payload)?;
        written += payload.len() as u64;
        if append_newline {
            sink.write_all(b"\n")?;
            written += 1;
        }
    }
    Ok(written)
}

async fn flush<W: Write + Send + 'static>(sink: SharedSink<W>) -> std::io::Result<()> {
    let flushed = tokio::task::spawn_blocking(move || {
        let mut sink = sink.lock();
        sink.flush()
    });
    flushed.await.map_err(std::io::Error::other)?
}

async fn periodic_flush<W: Write + Send + 'static>(
    sink: SharedSink<W>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = flush(sink.clone()).await {
                    warn!(error = %e, "Periodic flush failed");
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    trace!("Flush timer stopped");
                    return;
                }
            }
        }
    }
}
