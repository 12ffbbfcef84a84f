// tests/common/mod.rs
#![allow(dead_code)]

use aws_sdk_kinesis::types::{HashKeyRange, Shard};
use bytes::Bytes;
use kinesis_tail::aggregate::{AggregatedRecord, SubRecord, KPL_MAGIC};
use md5::{Digest, Md5};
use prost::Message;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive("kinesis_tail=debug".parse().expect("static directive parses")),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn shard(shard_id: &str, start: &str, end: &str) -> Shard {
    Shard::builder()
        .shard_id(shard_id)
        .hash_key_range(
            HashKeyRange::builder()
                .starting_hash_key(start)
                .ending_hash_key(end)
                .build()
                .expect("hash key range"),
        )
        .build()
        .expect("shard")
}

pub fn shard_without_range(shard_id: &str) -> Shard {
    Shard::builder().shard_id(shard_id).build().expect("shard")
}

/// Two shards splitting the key space at 2^127
pub fn two_shard_stream() -> Vec<Shard> {
    let half = 1u128 << 127;
    vec![
        shard("shardId-000000000000", "0", &(half - 1).to_string()),
        shard("shardId-000000000001", &half.to_string(), &u128::MAX.to_string()),
    ]
}

/// KPL container: magic, protobuf body, MD5 of the body
pub fn kpl_record(partition_keys: &[&str], payloads: &[(u64, &[u8])]) -> Vec<u8> {
    let body = AggregatedRecord {
        partition_key_table: partition_keys.iter().map(|k| k.to_string()).collect(),
        explicit_hash_key_table: Vec::new(),
        records: payloads
            .iter()
            .map(|(key_index, data)| SubRecord {
                partition_key_index: *key_index,
                explicit_hash_key_index: None,
                data: Bytes::copy_from_slice(data),
                tags: Vec::new(),
            })
            .collect(),
    }
    .encode_to_vec();

    let mut out = KPL_MAGIC.to_vec();
    out.extend_from_slice(&body);
    out.extend_from_slice(&Md5::digest(&body));
    out
}
