use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_kinesis::{
    types::{Record, Shard, ShardIteratorType},
    Client,
};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::retry::{RetryConfig, RetryHandle};

/// Where a shard iterator starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Just after the most recent record in the shard
    Latest,
    /// The first record at or after the timestamp
    AtTimestamp(DateTime<Utc>),
}

impl StartPosition {
    pub fn from_timestamp(start: Option<DateTime<Utc>>) -> Self {
        match start {
            Some(ts) => StartPosition::AtTimestamp(ts),
            None => StartPosition::Latest,
        }
    }

    pub fn iterator_type(&self) -> ShardIteratorType {
        match self {
            StartPosition::Latest => ShardIteratorType::Latest,
            StartPosition::AtTimestamp(_) => ShardIteratorType::AtTimestamp,
        }
    }
}

/// The three stream calls the tailer depends on
#[async_trait]
pub trait KinesisClientTrait: Send + Sync {
    /// All shards of the stream, in the order the service lists them
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<Shard>>;

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: StartPosition,
    ) -> Result<String>;

    /// One batch of records plus the next iterator (`None` once the shard is closed)
    async fn get_records(&self, iterator: &str, limit: i32) -> Result<(Vec<Record>, Option<String>)>;
}

/// [`KinesisClientTrait`] backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct AwsKinesisClient {
    inner: Client,
    retry: RetryConfig,
}

impl AwsKinesisClient {
    pub fn new(inner: Client, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl KinesisClientTrait for AwsKinesisClient {
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<Shard>> {
        let mut shards = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            // next_token and stream_name are mutually exclusive on ListShards
            let req = match &next_token {
                Some(token) => self.inner.list_shards().next_token(token),
                None => self.inner.list_shards().stream_name(stream_name),
            };
            let response = req.send().await?;

            next_token = response.next_token().map(String::from);
            shards.extend(response.shards.unwrap_or_default());
            if next_token.is_none() {
                break;
            }
            trace!(stream = %stream_name, listed = shards.len(), "Fetching next page of shards");
        }

        debug!(stream = %stream_name, shard_count = shards.len(), "Listed shards");
        Ok(shards)
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: StartPosition,
    ) -> Result<String> {
        let mut req = self
            .inner
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(position.iterator_type());

        if let StartPosition::AtTimestamp(ts) = position {
            req = req.timestamp(aws_smithy_types::DateTime::from_chrono_utc(ts));
        }

        let response = req.send().await?;
        response
            .shard_iterator
            .ok_or_else(|| anyhow::anyhow!("No shard iterator returned for {}", shard_id))
    }

    async fn get_records(&self, iterator: &str, limit: i32) -> Result<(Vec<Record>, Option<String>)> {
        let mut retry = RetryHandle::from_config(self.retry.clone());

        let response = retry
            .retry(
                || self.inner.get_records().shard_iterator(iterator).limit(limit).send(),
                |e| {
                    e.as_service_error().is_some_and(|se| {
                        se.is_provisioned_throughput_exceeded_exception()
                            || se.is_kms_throttling_exception()
                    })
                },
            )
            .await?;

        trace!(
            records = response.records().len(),
            millis_behind_latest = ?response.millis_behind_latest(),
            "GetRecords response"
        );

        Ok((
            response.records().to_vec(),
            response.next_shard_iterator().map(String::from),
        ))
    }
}
