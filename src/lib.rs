//! Kinesis Tail - follow an AWS Kinesis stream from the command line
//!
//! Reads every shard of a stream (or only the shard a partition key maps to)
//! concurrently between optional start and end timestamps, splits KPL
//! aggregated records back into the records producers wrote, and writes the
//! payloads to a single output, optionally re-encoding MessagePack as JSON.

pub mod aggregate;
pub mod cli;
pub mod client;
pub mod error;
pub mod iterator;
pub mod msgpack;
pub mod retry;
pub mod router;
pub mod tail;
pub mod writer;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;
#[cfg(test)]
mod tests;

pub use client::{AwsKinesisClient, KinesisClientTrait, StartPosition};
pub use error::{Result, TailError, WriterError};
pub use retry::{Backoff, ExponentialBackoff, RetryConfig};
pub use tail::{KinesisTail, TailConfig, TailSummary, TimeRange};
pub use writer::PayloadFormat;
