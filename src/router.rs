//! Partition-key routing over shard hash-key ranges
//!
//! Kinesis places a record on the shard whose hash-key range contains the
//! 128-bit MD5 digest of its partition key. Routing a key to its shard lets
//! the tailer read only the shard a producer writes that key to.

use aws_sdk_kinesis::types::Shard;
use md5::{Digest, Md5};
use tracing::{debug, warn};

use crate::error::{Result, TailError};

/// Hash key of a partition key: its MD5 digest read as a big-endian integer
pub fn hash_key(partition_key: &str) -> u128 {
    let digest = Md5::digest(partition_key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    u128::from_be_bytes(bytes)
}

/// Inclusive hash-key range owned by one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashKeyRange {
    pub start: u128,
    pub end: u128,
}

impl HashKeyRange {
    /// Parse the decimal bounds the service reports for `shard`.
    ///
    /// Returns `Ok(None)` when the shard carries no range.
    pub fn of_shard(shard: &Shard) -> Result<Option<Self>> {
        let Some(range) = shard.hash_key_range() else {
            return Ok(None);
        };
        let parse = |value: &str| {
            value
                .parse::<u128>()
                .map_err(|_| TailError::InvalidHashKeyRange {
                    shard_id: shard.shard_id().to_string(),
                    value: value.to_string(),
                })
        };
        Ok(Some(Self {
            start: parse(range.starting_hash_key())?,
            end: parse(range.ending_hash_key())?,
        }))
    }

    pub fn contains(&self, key: u128) -> bool {
        self.start <= key && key <= self.end
    }
}

/// Select the shards to read.
///
/// Without a partition key every shard is returned in listing order. With a
/// key, the first shard whose range contains the key's hash is returned;
/// an empty result means no shard covers it.
pub fn resolve_shards(shards: &[Shard], partition_key: Option<&str>) -> Result<Vec<String>> {
    let key = match partition_key {
        Some(key) if !key.is_empty() => key,
        _ => {
            return Ok(shards.iter().map(|s| s.shard_id().to_string()).collect());
        }
    };

    let target = hash_key(key);
    for shard in shards {
        let Some(range) = HashKeyRange::of_shard(shard)? else {
            warn!(shard_id = %shard.shard_id(), "Shard has no hash key range, skipping");
            continue;
        };
        if range.contains(target) {
            debug!(
                partition_key = %key,
                hash_key = %target,
                shard_id = %shard.shard_id(),
                "Routed partition key to shard"
            );
            return Ok(vec![shard.shard_id().to_string()]);
        }
    }

    warn!(partition_key = %key, hash_key = %target, "No shard covers partition key");
    Ok(Vec::new())
}
