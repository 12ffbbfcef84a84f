//! Test utilities and mock implementations for testing the tailer


use aws_sdk_kinesis::types::{HashKeyRange as SdkHashKeyRange, Record, Shard};
use aws_smithy_types_convert::date_time::DateTimeExt;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use parking_lot::Mutex;
use prost::Message;
use std::io::Write;
use std::sync::Arc;

use crate::aggregate::{AggregatedRecord, SubRecord, KPL_MAGIC};

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// Create a test record with the given payload and arrival time
    pub fn create_test_record(sequence_number: &str, data: &[u8], arrival: DateTime<Utc>) -> Record {
        Record::builder()
            .sequence_number(sequence_number)
            .data(aws_smithy_types::Blob::new(data.to_vec()))
            .partition_key("test-partition-key")
            .approximate_arrival_timestamp(aws_smithy_types::DateTime::from_chrono_utc(arrival))
            .build()
            .expect("Failed to build test record")
    }

    /// Create one record per payload, arriving one second apart from `first_arrival`
    pub fn create_test_records(payloads: &[&[u8]], first_arrival: DateTime<Utc>) -> Vec<Record> {
        payloads
            .iter()
            .enumerate()
            .map(|(i, data)| {
                Self::create_test_record(
                    &format!("sequence-{}", i),
                    data,
                    first_arrival + chrono::Duration::seconds(i as i64),
                )
            })
            .collect()
    }

    /// Create a test shard with given ID and no hash key range
    pub fn create_test_shard(shard_id: &str) -> Shard {
        Shard::builder()
            .shard_id(shard_id)
            .build()
            .expect("Failed to build test shard")
    }

    pub fn create_test_shard_with_range(shard_id: &str, start: u128, end: u128) -> Shard {
        Self::create_test_shard_with_raw_range(shard_id, &start.to_string(), &end.to_string())
    }

    pub fn create_test_shard_with_raw_range(shard_id: &str, start: &str, end: &str) -> Shard {
        let range = SdkHashKeyRange::builder()
            .starting_hash_key(start)
            .ending_hash_key(end)
            .build()
            .expect("Failed to build hash key range");
        Shard::builder()
            .shard_id(shard_id)
            .hash_key_range(range)
            .build()
            .expect("Failed to build test shard")
    }

    /// `count` shards splitting the whole 128-bit key space into contiguous ranges
    pub fn create_even_shards(count: u32) -> Vec<Shard> {
        let step = u128::MAX / count as u128;
        (0..count)
            .map(|i| {
                let start = step * i as u128;
                let end = if i + 1 == count {
                    u128::MAX
                } else {
                    step * (i as u128 + 1) - 1
                };
                Self::create_test_shard_with_range(&format!("shardId-{:012}", i), start, end)
            })
            .collect()
    }

    /// Pack payloads into a KPL aggregated record
    pub fn create_aggregated_payload(payloads: &[&[u8]]) -> Bytes {
        let aggregated = AggregatedRecord {
            partition_key_table: vec!["test-partition-key".to_string()],
            explicit_hash_key_table: Vec::new(),
            records: payloads
                .iter()
                .map(|data| SubRecord {
                    partition_key_index: 0,
                    explicit_hash_key_index: None,
                    data: Bytes::copy_from_slice(data),
                    tags: Vec::new(),
                })
                .collect(),
        };

        let body = aggregated.encode_to_vec();
        let mut raw = KPL_MAGIC.to_vec();
        raw.extend_from_slice(&body);
        raw.extend_from_slice(&Md5::digest(&body));
        Bytes::from(raw)
    }
}

/// Cloneable in-memory sink
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    /// Contents split on `\n`, without the trailing empty line
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.contents())
            .lines()
            .map(String::from)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sink whose every write fails, like a closed pipe
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::HashKeyRange;

    #[test]
    fn test_create_test_record() {
        let arrival = Utc::now();
        let record = TestUtils::create_test_record("seq-1", b"test-data", arrival);
        assert_eq!(record.sequence_number(), "seq-1");
        assert_eq!(record.data().as_ref(), b"test-data");
        assert!(record.approximate_arrival_timestamp().is_some());
    }

    #[test]
    fn test_even_shards_are_contiguous() -> anyhow::Result<()> {
        let shards = TestUtils::create_even_shards(5);
        let ranges: Vec<HashKeyRange> = shards
            .iter()
            .map(|s| HashKeyRange::of_shard(s).map(|r| r.expect("range present")))
            .collect::<crate::Result<_>>()?;

        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[4].end, u128::MAX);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        Ok(())
    }

    #[test]
    fn test_shared_buffer_lines() {
        let mut buffer = SharedBuffer::default();
        buffer.write_all(b"a\nb\n").unwrap();
        assert_eq!(buffer.lines(), vec!["a", "b"]);
    }
}
