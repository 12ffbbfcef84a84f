//! Per-shard polling loop
//!
//! A [`ShardIterator`] reads one shard from a start position until either
//! the end timestamp is passed, the shard closes, too many consecutive reads
//! come back empty, or shutdown is requested. Every logical record it finds
//! is pushed into the shared output channel in shard order.

use aws_sdk_kinesis::types::Record;
use aws_smithy_types_convert::date_time::DateTimeExt;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use crate::aggregate::deaggregate;
use crate::client::{KinesisClientTrait, StartPosition};
use crate::error::{Result, TailError};
use crate::tail::TailConfig;

/// What to read from one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationSpec {
    pub shard_id: String,
    /// `None` starts at the newest position
    pub start: Option<DateTime<Utc>>,
    /// `None` never stops on time
    pub end: Option<DateTime<Utc>>,
}

/// Decides when a shard has been read far enough.
///
/// Without an end bound it never fires. With one, a record arriving after the
/// bound ends the shard, and so does reaching `max_empty_reads` empty polls;
/// the empty-read count is never reset.
#[derive(Debug, Clone)]
pub struct EndCondition {
    end: Option<DateTime<Utc>>,
    empty_reads: u32,
    max_empty_reads: u32,
}

impl EndCondition {
    pub fn new(end: Option<DateTime<Utc>>, max_empty_reads: u32) -> Self {
        Self {
            end,
            empty_reads: 0,
            max_empty_reads,
        }
    }

    pub fn is_over(&mut self, at: DateTime<Utc>, empty_read: bool) -> bool {
        let Some(end) = self.end else {
            return false;
        };
        if empty_read {
            self.empty_reads += 1;
            return self.empty_reads >= self.max_empty_reads;
        }
        at > end
    }

    pub fn empty_reads(&self) -> u32 {
        self.empty_reads
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShardStats {
    /// Records returned by the service
    pub records_fetched: u64,
    /// Logical records sent after deaggregation
    pub records_emitted: u64,
    pub polls: u64,
    pub empty_reads: u64,
}

pub struct ShardIterator<C: KinesisClientTrait> {
    client: Arc<C>,
    stream_name: String,
    batch_size: i32,
    poll_interval: Duration,
    max_empty_reads: u32,
}

impl<C: KinesisClientTrait> ShardIterator<C> {
    pub fn new(client: Arc<C>, config: &TailConfig) -> Self {
        Self {
            client,
            stream_name: config.stream_name.clone(),
            batch_size: config.batch_size,
            poll_interval: config.poll_interval,
            max_empty_reads: config.max_empty_reads,
        }
    }

    /// Read `spec.shard_id` into `tx`.
    ///
    /// Sends block while the channel is full. A closed channel ends the shard
    /// with [`TailError::OutputClosed`].
    pub async fn iterate(
        &self,
        spec: &IterationSpec,
        tx: &mpsc::Sender<Bytes>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ShardStats> {
        let shard_id = spec.shard_id.as_str();
        let mut stats = ShardStats::default();
        let mut end_condition = EndCondition::new(spec.end, self.max_empty_reads);

        if *shutdown.borrow() {
            return Err(TailError::Shutdown);
        }

        let position = StartPosition::from_timestamp(spec.start);
        let mut iterator = self
            .client
            .get_shard_iterator(&self.stream_name, shard_id, position)
            .await
            .map_err(|e| TailError::GetIteratorFailed {
                shard_id: shard_id.to_string(),
                message: e.to_string(),
            })?;
        debug!(shard_id = %shard_id, position = ?position, "Acquired shard iterator");

        loop {
            if *shutdown.borrow() {
                info!(shard_id = %shard_id, "Shutdown requested, leaving shard");
                return Err(TailError::Shutdown);
            }

            let (records, next_iterator) = self
                .client
                .get_records(&iterator, self.batch_size)
                .await
                .map_err(|e| TailError::GetRecordsFailed {
                    shard_id: shard_id.to_string(),
                    message: e.to_string(),
                })?;
            stats.polls += 1;
            trace!(shard_id = %shard_id, records = records.len(), "Fetched batch");

            let batch_was_empty = records.is_empty();
            for record in records {
                stats.records_fetched += 1;

                if let Some(arrival) = arrival_time(&record) {
                    if end_condition.is_over(arrival, false) {
                        info!(
                            shard_id = %shard_id,
                            arrival = %arrival,
                            "Record past end timestamp, shard done"
                        );
                        return Ok(stats);
                    }
                }

                for payload in deaggregate(Bytes::from(record.data.into_inner())) {
                    tx.send(payload)
                        .await
                        .map_err(|_| TailError::OutputClosed(shard_id.to_string()))?;
                    stats.records_emitted += 1;
                }
            }

            let Some(next_iterator) = next_iterator else {
                info!(shard_id = %shard_id, "Shard closed");
                return Ok(stats);
            };
            iterator = next_iterator;

            if batch_was_empty {
                stats.empty_reads += 1;
                if end_condition.is_over(Utc::now(), true) {
                    info!(
                        shard_id = %shard_id,
                        empty_reads = end_condition.empty_reads(),
                        "No records before end timestamp, shard done"
                    );
                    return Ok(stats);
                }
                if sleep_or_shutdown(self.poll_interval, shutdown).await {
                    info!(shard_id = %shard_id, "Shutdown requested while idle");
                    return Err(TailError::Shutdown);
                }
            }
        }
    }
}

fn arrival_time(record: &Record) -> Option<DateTime<Utc>> {
    record
        .approximate_arrival_timestamp()
        .and_then(|ts| ts.to_chrono_utc().ok())
}

/// Sleep for `duration`; returns `true` if shutdown was signalled first.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return true,
                Ok(()) => continue,
                // Sender gone, nobody can ask for shutdown any more
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            }
        }
    }
}
