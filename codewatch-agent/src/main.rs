use std::sync::Arc;

use anyhow::Context;
use codewatch_agent::collector::{FileTreeScanner, InMemoryUsageSink};
use codewatch_agent::domain::AgentIdentity;
use codewatch_agent::logging::{self, LOG_RETENTION_DAYS};
use codewatch_agent::poller::HttpConfigPoller;
use codewatch_agent::publisher::snapshot::SnapshotPublisherFactory;
use codewatch_agent::publisher::usage::UsagePublisherFactory;
use codewatch_agent::upload::HttpUploader;
use codewatch_agent::{AgentConfig, Scheduler};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env().context("loading agent configuration")?;
    let _guard = logging::init_logging(config.log_dir.as_deref())?;

    if !config.enabled {
        info!("Agent disabled, exiting");
        return Ok(());
    }
    config.validate()?;

    let cancel_token = CancellationToken::new();
    if let Some(log_dir) = &config.log_dir {
        logging::start_retention_cleanup(log_dir.clone(), LOG_RETENTION_DAYS, cancel_token.clone());
    }

    let identity = Arc::new(AgentIdentity::new(&config));
    info!(
        app = %identity.app_name,
        version = %identity.app_version,
        instance = %identity.instance_id,
        server = %config.server_url,
        "Starting codewatch agent"
    );

    let poller = Arc::new(HttpConfigPoller::new(&config, Arc::clone(&identity))?);
    let uploader = Arc::new(HttpUploader::new(&config, Arc::clone(&identity))?);
    let scanner = Arc::new(FileTreeScanner::new(
        config.code_base.clone(),
        config.fingerprint_config(),
    ));
    // Hosts embedding the library record into this sink as code is exercised.
    let sink = Arc::new(InMemoryUsageSink::new());

    let snapshot_factory = SnapshotPublisherFactory::standard(
        scanner,
        uploader.clone(),
        Arc::clone(&identity),
        config.work_dir.clone(),
    );
    let usage_factory = UsagePublisherFactory::standard(
        sink,
        uploader,
        Arc::clone(&identity),
        config.work_dir.clone(),
    );

    let handle = Scheduler::new(
        config.scheduler_config(),
        poller,
        snapshot_factory,
        usage_factory,
    )
    .start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Received Ctrl-C, shutting down");

    let report = handle.shutdown().await;
    cancel_token.cancel();
    info!(
        duration_ms = report.duration.as_millis() as u64,
        flushed = report.flushed,
        "Agent stopped"
    );

    Ok(())
}
