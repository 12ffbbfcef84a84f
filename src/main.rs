use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kinesis_tail::cli::Cli;
use kinesis_tail::{AwsKinesisClient, KinesisTail};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_log();
    let cli = Cli::parse();

    let config = cli.tail_config();
    let range = cli.time_range()?;

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &cli.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &cli.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &cli.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;
    let client = AwsKinesisClient::new(
        aws_sdk_kinesis::Client::new(&sdk_config),
        config.retry.clone(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let tail = KinesisTail::new(config, client);
    let summary = tail
        .run(cli.partition_key(), range, std::io::stdout(), shutdown_rx)
        .await
        .with_context(|| format!("failed to tail stream {}", cli.stream))?;

    for failed in summary.failed_shards() {
        if let Err(e) = &failed.result {
            warn!(shard_id = %failed.shard_id, error = %e, "Shard did not complete");
        }
    }
    info!(records = summary.records_emitted(), "Done");
    Ok(())
}

/// Logs go to stderr; stdout carries only records
fn init_log() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .with_env_var("KTAIL_LOG")
                .from_env_lossy(),
        )
        .init();
}
