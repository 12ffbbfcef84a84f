//! Deaggregation of KPL (Kinesis Producer Library) aggregated records
//!
//! An aggregated record is laid out as
//!
//! ```text
//! | magic (4 bytes) | AggregatedRecord protobuf | MD5 of the protobuf (16 bytes) |
//! ```
//!
//! Anything that does not match this layout is an ordinary record.

use bytes::Bytes;
use md5::{Digest, Md5};
use prost::Message;
use tracing::trace;

/// Leading bytes of every KPL aggregated record
pub const KPL_MAGIC: [u8; 4] = [0xF3, 0x89, 0x9A, 0xC2];

const DIGEST_LEN: usize = 16;

#[derive(Clone, PartialEq, Message)]
pub struct AggregatedRecord {
    #[prost(string, repeated, tag = "1")]
    pub partition_key_table: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub explicit_hash_key_table: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub records: Vec<SubRecord>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SubRecord {
    #[prost(uint64, required, tag = "1")]
    pub partition_key_index: u64,
    #[prost(uint64, optional, tag = "2")]
    pub explicit_hash_key_index: Option<u64>,
    #[prost(bytes = "bytes", required, tag = "3")]
    pub data: Bytes,
    #[prost(message, repeated, tag = "4")]
    pub tags: Vec<Tag>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Tag {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

/// Outcome of looking inside a record payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deaggregated {
    /// Payload was a KPL container; sub-record payloads in container order
    Aggregate(Vec<Bytes>),
    /// Payload is a plain record
    Single(Bytes),
}

impl Deaggregated {
    pub fn len(&self) -> usize {
        match self {
            Deaggregated::Aggregate(records) => records.len(),
            Deaggregated::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntoIterator for Deaggregated {
    type Item = Bytes;
    type IntoIter = std::vec::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Deaggregated::Aggregate(records) => records.into_iter(),
            Deaggregated::Single(payload) => vec![payload].into_iter(),
        }
    }
}

/// Split a payload into its logical records.
///
/// A payload that fails any container check comes back as
/// [`Deaggregated::Single`]; this never fails.
pub fn deaggregate(payload: Bytes) -> Deaggregated {
    match decode_container(&payload) {
        Some(aggregated) => {
            trace!(sub_records = aggregated.records.len(), "Deaggregated KPL record");
            Deaggregated::Aggregate(aggregated.records.into_iter().map(|r| r.data).collect())
        }
        None => Deaggregated::Single(payload),
    }
}

fn decode_container(payload: &Bytes) -> Option<AggregatedRecord> {
    if payload.len() < KPL_MAGIC.len() + DIGEST_LEN || !payload.starts_with(&KPL_MAGIC) {
        return None;
    }

    let body = payload.slice(KPL_MAGIC.len()..payload.len() - DIGEST_LEN);
    let digest = &payload[payload.len() - DIGEST_LEN..];
    if Md5::digest(&body).as_slice() != digest {
        trace!("KPL magic present but digest mismatch");
        return None;
    }

    AggregatedRecord::decode(body).ok()
}
