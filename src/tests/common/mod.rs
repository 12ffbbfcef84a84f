use chrono::{DateTime, TimeZone, Utc};
use std::sync::Once;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::test::mocks::MockKinesisClient;
use crate::test::SharedBuffer;
use crate::{KinesisTail, TailConfig, TailSummary, TimeRange};

static INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(
                    "kinesis_tail=debug"
                        .parse()
                        .expect("static directive parses"),
                ),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn create_test_config() -> TailConfig {
    TailConfig {
        stream_name: "test-stream".to_string(),
        poll_interval: Duration::from_millis(1),
        max_empty_reads: 3,
        flush_interval: Duration::from_millis(10),
        channel_capacity: 8,
        append_newline: true,
        ..TailConfig::default()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub struct TestContext {
    pub config: TailConfig,
    pub client: MockKinesisClient,
    pub output: SharedBuffer,
}

impl TestContext {
    pub fn new() -> Self {
        init_logging();
        Self {
            config: create_test_config(),
            client: MockKinesisClient::new(),
            output: SharedBuffer::default(),
        }
    }

    /// Run a full tail with no shutdown signal
    pub async fn run(&self, partition_key: Option<&str>, range: TimeRange) -> crate::Result<TailSummary> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let tail = KinesisTail::new(self.config.clone(), self.client.clone());
        tail.run(partition_key, range, self.output.clone(), shutdown_rx).await
    }
}
