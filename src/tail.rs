//! Orchestration of a tail run
//!
//! Resolves the shards to read, starts one [`ShardIterator`] task per shard and
//! a single [`FanInWriter`], then tears everything down in order:
//!
//! - wait for every shard task
//! - stop the writer's flush timer
//! - close the channel
//! - wait for the writer to drain
//!
//! A shard that fails is logged and does not stop its siblings.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::client::KinesisClientTrait;
use crate::error::{Result, TailError};
use crate::iterator::{IterationSpec, ShardIterator, ShardStats};
use crate::retry::RetryConfig;
use crate::router;
use crate::writer::{FanInWriter, PayloadFormat, WriterConfig, WriterStats};

/// Configuration for a tail run
#[derive(Debug, Clone)]
pub struct TailConfig {
    /// Name of the Kinesis stream to read
    pub stream_name: String,
    /// Maximum number of records to request per GetRecords call
    pub batch_size: i32,
    /// Wait after a GetRecords call that returned nothing
    pub poll_interval: Duration,
    /// Empty reads after which a shard with an end timestamp is considered drained
    pub max_empty_reads: u32,
    /// How often buffered output is flushed
    pub flush_interval: Duration,
    /// Capacity of the channel between shard tasks and the writer
    pub channel_capacity: usize,
    /// Write a newline after each record
    pub append_newline: bool,
    pub payload_format: PayloadFormat,
    /// Retry policy for throttled GetRecords calls
    pub retry: RetryConfig,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            batch_size: 1000,
            poll_interval: Duration::from_secs(1),
            max_empty_reads: 100,
            flush_interval: Duration::from_millis(100),
            channel_capacity: 1000,
            append_newline: false,
            payload_format: PayloadFormat::Raw,
            retry: RetryConfig::default(),
        }
    }
}

impl TailConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stream_name.is_empty() {
            return Err(TailError::Config("stream name is required".to_string()));
        }
        if !(1..=10_000).contains(&self.batch_size) {
            return Err(TailError::Config(format!(
                "batch size must be between 1 and 10000, got {}",
                self.batch_size
            )));
        }
        if self.max_empty_reads == 0 {
            return Err(TailError::Config("max empty reads must be at least 1".to_string()));
        }
        if self.flush_interval.is_zero() {
            return Err(TailError::Config("flush interval must be non-zero".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(TailError::Config("channel capacity must be non-zero".to_string()));
        }
        Ok(())
    }

    fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            append_newline: self.append_newline,
            payload_format: self.payload_format,
            flush_interval: self.flush_interval,
        }
    }
}

/// Time bounds shared by every shard in a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// `None` reads from the newest position
    pub start: Option<DateTime<Utc>>,
    /// `None` tails until shutdown or shard close
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(TailError::Config(format!(
                    "end {} is before start {}",
                    end.to_rfc3339(),
                    start.to_rfc3339()
                )));
            }
        }
        Ok(Self { start, end })
    }

    fn spec_for(&self, shard_id: &str) -> IterationSpec {
        IterationSpec {
            shard_id: shard_id.to_string(),
            start: self.start,
            end: self.end,
        }
    }
}

/// What happened to one shard
#[derive(Debug)]
pub struct ShardOutcome {
    pub shard_id: String,
    pub result: Result<ShardStats>,
}

/// Result of a completed run
#[derive(Debug)]
pub struct TailSummary {
    pub shards: Vec<ShardOutcome>,
    /// `None` if the writer stopped on a fatal error
    pub writer: Option<WriterStats>,
}

impl TailSummary {
    pub fn failed_shards(&self) -> impl Iterator<Item = &ShardOutcome> {
        self.shards.iter().filter(|s| s.result.is_err())
    }

    pub fn records_emitted(&self) -> u64 {
        self.shards
            .iter()
            .filter_map(|s| s.result.as_ref().ok())
            .map(|stats| stats.records_emitted)
            .sum()
    }
}

/// Tails a Kinesis stream into a sink
pub struct KinesisTail<C>
where
    C: KinesisClientTrait + Send + Sync + 'static,
{
    client: Arc<C>,
    config: TailConfig,
}

impl<C> KinesisTail<C>
where
    C: KinesisClientTrait + Send + Sync + 'static,
{
    pub fn new(config: TailConfig, client: C) -> Self {
        Self {
            client: Arc::new(client),
            config,
        }
    }

    pub fn config(&self) -> &TailConfig {
        &self.config
    }

    /// Shard IDs to read for `partition_key`, or all shards without one
    pub async fn resolve_shards(&self, partition_key: Option<&str>) -> Result<Vec<String>> {
        let shards = self
            .client
            .list_shards(&self.config.stream_name)
            .await
            .map_err(|e| TailError::ListShardsFailed(e.to_string()))?;
        router::resolve_shards(&shards, partition_key)
    }

    /// Tail the stream into `sink` until every selected shard is done.
    ///
    /// Only configuration and shard resolution errors are returned; shard and
    /// writer failures are logged and reported in the summary.
    pub async fn run<W>(
        &self,
        partition_key: Option<&str>,
        range: TimeRange,
        sink: W,
        shutdown: watch::Receiver<bool>,
    ) -> Result<TailSummary>
    where
        W: Write + Send + 'static,
    {
        self.config.validate()?;

        let shard_ids = self.resolve_shards(partition_key).await?;
        info!(
            stream = %self.config.stream_name,
            shards = ?shard_ids,
            start = ?range.start,
            end = ?range.end,
            "Starting tail"
        );

        let (tx, rx) = mpsc::channel::<Bytes>(self.config.channel_capacity);
        let (flush_stop_tx, flush_stop_rx) = watch::channel(false);

        let writer = FanInWriter::new(sink, self.config.writer_config());
        let writer_handle = tokio::spawn(writer.run(rx, flush_stop_rx));

        let iterator = Arc::new(ShardIterator::new(self.client.clone(), &self.config));
        let handles: Vec<_> = shard_ids
            .iter()
            .map(|shard_id| {
                let iterator = iterator.clone();
                let tx = tx.clone();
                let mut shutdown = shutdown.clone();
                let spec = range.spec_for(shard_id);
                tokio::spawn(async move { iterator.iterate(&spec, &tx, &mut shutdown).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (shard_id, joined) in shard_ids.into_iter().zip(futures::future::join_all(handles).await) {
            let result = joined.map_err(TailError::from).and_then(|r| r);
            log_outcome(&shard_id, &result);
            outcomes.push(ShardOutcome { shard_id, result });
        }

        let _ = flush_stop_tx.send(true);
        drop(tx);

        let writer = match writer_handle.await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                error!(error = %e, "Writer failed");
                None
            }
            Err(e) => {
                error!(error = %e, "Writer task panicked");
                None
            }
        };

        info!(stream = %self.config.stream_name, "Tail complete");
        Ok(TailSummary {
            shards: outcomes,
            writer,
        })
    }
}

fn log_outcome(shard_id: &str, result: &Result<ShardStats>) {
    match result {
        Ok(stats) => debug!(
            shard_id = %shard_id,
            records_fetched = stats.records_fetched,
            records_emitted = stats.records_emitted,
            polls = stats.polls,
            "Shard finished"
        ),
        Err(TailError::Shutdown) => debug!(shard_id = %shard_id, "Shard stopped by shutdown"),
        Err(e @ TailError::OutputClosed(_)) => warn!(shard_id = %shard_id, error = %e, "Shard stopped early"),
        Err(e) => error!(shard_id = %shard_id, error = %e, "Shard failed"),
    }
}
