//! Error types for the stream tailer

use thiserror::Error;

/// Main error type for tail operations
#[derive(Debug, Error)]
pub enum TailError {
    #[error("Failed to list shards: {0}")]
    ListShardsFailed(String),

    #[error("Invalid hash key range for shard {shard_id}: {value}")]
    InvalidHashKeyRange { shard_id: String, value: String },

    #[error("Failed to get iterator for shard {shard_id}: {message}")]
    GetIteratorFailed { shard_id: String, message: String },

    #[error("Failed to get records from shard {shard_id}: {message}")]
    GetRecordsFailed { shard_id: String, message: String },

    #[error("Output channel closed while shard {0} was still sending")]
    OutputClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    Shutdown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for tail operations
pub type Result<T> = std::result::Result<T, TailError>;

/// Fatal errors raised by the fan-in writer
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("MessagePack decode error: {0}")]
    MessagePackDecode(#[from] rmpv::decode::Error),

    #[error("JSON encode error: {0}")]
    JsonEncode(#[from] serde_json::Error),

    #[error("Sink write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for TailError {
    fn from(err: tokio::task::JoinError) -> Self {
        TailError::Other(err.into())
    }
}
