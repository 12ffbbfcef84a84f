//! Command-line arguments

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::error::{Result, TailError};
use crate::retry::RetryConfig;
use crate::tail::{TailConfig, TimeRange};
use crate::writer::PayloadFormat;

#[derive(clap::Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Name of the stream to tail
    pub stream: String,

    /// Only read the shard this partition key hashes to
    #[arg(short = 'k', long)]
    pub shard_key: Option<String>,

    /// Start reading at this time (RFC 3339, or relative like `-15m`). Default: newest records
    #[arg(long, value_parser = parse_timestamp, allow_hyphen_values = true)]
    pub start: Option<DateTime<Utc>>,

    /// Stop once records pass this time (RFC 3339, or relative like `-5m`). Default: never
    #[arg(long, value_parser = parse_timestamp, allow_hyphen_values = true)]
    pub end: Option<DateTime<Utc>>,

    /// Append a newline after each record
    #[arg(long)]
    pub lf: bool,

    /// Decode payloads as MessagePack and print them as JSON
    #[arg(long)]
    pub msgpack: bool,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// AWS profile from the shared config files
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Override the Kinesis endpoint, e.g. for LocalStack
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Records requested per GetRecords call
    #[arg(long, default_value_t = 1000)]
    pub batch_size: i32,

    /// Wait after an empty GetRecords response, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Empty responses after which a shard is considered done (only with --end)
    #[arg(long, default_value_t = 100)]
    pub max_empty_reads: u32,

    /// Output flush period, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub flush_interval_ms: u64,
}

impl Cli {
    pub fn tail_config(&self) -> TailConfig {
        TailConfig {
            stream_name: self.stream.clone(),
            batch_size: self.batch_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_empty_reads: self.max_empty_reads,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            append_newline: self.lf,
            payload_format: if self.msgpack {
                PayloadFormat::MessagePack
            } else {
                PayloadFormat::Raw
            },
            retry: RetryConfig::default(),
            ..TailConfig::default()
        }
    }

    pub fn time_range(&self) -> Result<TimeRange> {
        TimeRange::new(self.start, self.end)
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.shard_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Parse an RFC 3339 timestamp or a relative offset from now.
///
/// Offsets are a whole number with a unit of `s`, `m`, `h` or `d`, counted
/// back from now: `-90s`, `-15m`, `-2h`, `-1d`. The leading `-` is optional.
pub fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_timestamp_at(value, Utc::now()).map_err(|e| e.to_string())
}

fn parse_timestamp_at(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    let invalid = || {
        TailError::Config(format!(
            "invalid timestamp '{}': expected RFC 3339 or an offset like -15m",
            value
        ))
    };

    // Offsets always point into the past
    if value.starts_with('+') {
        return Err(invalid());
    }
    let rest = value.strip_prefix('-').unwrap_or(value);
    let (unit_at, _) = rest.char_indices().last().ok_or_else(invalid)?;
    let (amount, unit) = rest.split_at(unit_at);
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let amount = i64::from(amount.parse::<u32>().map_err(|_| invalid())?);
    let offset = match unit {
        "s" => ChronoDuration::try_seconds(amount),
        "m" => ChronoDuration::try_minutes(amount),
        "h" => ChronoDuration::try_hours(amount),
        "d" => ChronoDuration::try_days(amount),
        _ => None,
    }
    .ok_or_else(invalid)?;

    now.checked_sub_signed(offset).ok_or_else(invalid)
}
