use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use blockudp_anchor_service::{
    AnchorConfig, AnchorScheduler, BatchAnchorManager, Metrics, MockLedger,
};
use blockudp_metrics::config::Config as MetricsConfig;
use clap::Args;
use prometheus_client::registry::Registry;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{anchors::AnchorsFile, handle_signals, spool::SpoolStore, LogOpts};

#[derive(Args, Debug)]
pub struct DaemonOpts {
    /// Directory watched for packet files.
    #[arg(short, long, default_value = "spool", env = "BLOCKUDP_SPOOL_DIR")]
    spool_dir: PathBuf,

    /// File anchor records are appended to.
    #[arg(long, default_value = "anchors.json", env = "BLOCKUDP_ANCHORS_FILE")]
    anchors_file: PathBuf,

    /// Number of buffered packets that triggers an anchor.
    #[arg(long, default_value_t = 100, env = "BLOCKUDP_BATCH_SIZE")]
    batch_size: usize,

    /// Seconds after the last anchor before a non-empty buffer is anchored anyway.
    #[arg(long, default_value_t = 60, env = "BLOCKUDP_ANCHOR_INTERVAL_SECS")]
    anchor_interval_secs: u64,

    /// Seconds between scans of the spool directory.
    #[arg(long, default_value_t = 5, env = "BLOCKUDP_POLL_INTERVAL_SECS")]
    poll_interval_secs: u64,

    #[command(flatten)]
    log_opts: LogOpts,
}

impl DaemonOpts {
    fn anchor_config(&self) -> Result<(AnchorConfig, Duration)> {
        let config = AnchorConfig::new(
            self.batch_size,
            Duration::from_secs(self.anchor_interval_secs),
        )?;
        let poll_interval = Duration::from_secs(self.poll_interval_secs);
        if poll_interval.is_zero() {
            bail!("poll interval must be at least one second");
        }
        if poll_interval > config.anchor_interval {
            bail!(
                "poll interval ({}s) must not exceed the anchor interval ({}s)",
                self.poll_interval_secs,
                self.anchor_interval_secs
            );
        }
        Ok((config, poll_interval))
    }
}

pub async fn run(opts: DaemonOpts) -> Result<()> {
    let metrics_config = MetricsConfig::default()
        .with_service_name(env!("CARGO_PKG_NAME").to_string())
        .with_version(env!("CARGO_PKG_VERSION").to_string())
        .with_log_format(opts.log_opts.format());
    blockudp_metrics::init_tracing(metrics_config)
        .map_err(|err| anyhow!("failed to initialize tracing: {}", err))?;

    let (config, poll_interval) = opts.anchor_config()?;
    info!(
        batch_size = config.batch_size.get(),
        anchor_interval = ?config.anchor_interval,
        ?poll_interval,
        spool_dir = %opts.spool_dir.display(),
        anchors_file = %opts.anchors_file.display(),
        "starting anchor daemon"
    );

    let mut registry = Registry::default();
    let metrics = Arc::new(Metrics::register(&mut registry));

    let anchors = AnchorsFile::new(opts.anchors_file);
    let store = Arc::new(SpoolStore::open(opts.spool_dir, anchors).await?);
    let manager = Arc::new(
        BatchAnchorManager::new(config, Arc::new(MockLedger::default())).with_recorder(metrics),
    );

    // Setup shutdown signal
    let (tx, rx) = oneshot::channel::<()>();
    let signals = Signals::new([SIGHUP, SIGTERM, SIGINT, SIGQUIT])?;
    let handle = signals.handle();
    debug!("starting signal handler task");
    let signals_handle = tokio::spawn(handle_signals(signals, tx));

    let scheduler = AnchorScheduler::new(store, manager, poll_interval).start();

    // Blocks until a signal arrives
    let _ = rx.await;
    debug!("stopping anchor scheduler");
    scheduler.stop().await?;

    let mut text = String::new();
    prometheus_client::encoding::text::encode(&mut text, &registry)?;
    debug!(metrics = %text, "final anchor metrics");

    // Wait for signal handler to finish
    handle.close();
    signals_handle.await?;
    debug!("signal handler stopped");

    info!("anchor daemon stopped");
    Ok(())
}
