use std::sync::Arc;

use anyhow::{Context, Result};
use lib_reporter::loggers::subscriber::init_tracing;
use lib_reporter::{Destination, MemoryChannel, Reporter};
use tokio::signal;
use tracing::info;

mod report_logic;
use report_logic::{config, sources};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let _log_guard = init_tracing(&config.logging_setup())?;

    let url = config.url()?;
    let mut builder = Reporter::builder(url).options(config.reporter_options());
    let dry_run = if config.is_dry_run() {
        let destination = Destination::parse(url)?;
        info!(url = %destination.as_str(), "dry run, reports stay in memory");
        let channel = Arc::new(MemoryChannel::new(destination.kind()));
        builder = builder.channel(channel.clone());
        Some(channel)
    } else {
        None
    };
    let reporter = builder.build().context("building reporter")?;

    let frequency = config.frequency()?;
    let file_path = config.file_path.clone();
    for source in sources::build_sources(&config.source_kinds()?, file_path.as_ref())? {
        reporter.start_reporting(source, frequency)?;
    }
    info!(
        url = %reporter.url(),
        transport = %reporter.channel_kind(),
        sources = reporter.reporting_count(),
        "reporter running"
    );

    // Wait for shutdown signal, or for every one-shot session to finish
    tokio::select! {
        _ = reporter.wait_idle(), if config.is_once() => {
            info!("All sources reported once.");
        }
        res = shutdown_signal() => {
            res?;
        }
    }

    reporter.shutdown().await;
    if let Some(channel) = dry_run {
        let frames = channel.frames();
        let bytes: usize = frames.iter().map(|f| f.len()).sum();
        info!(frames = frames.len(), bytes, "dry run finished");
    }
    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("installing SIGTERM handler")?;
        tokio::select! {
            res = signal::ctrl_c() => {
                res.context("listening for Ctrl-C")?;
                info!("Ctrl-C received, initiating shutdown.");
            }
            _ = term_signal.recv() => {
                info!("SIGTERM received, initiating shutdown.");
            }
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("listening for Ctrl-C")?;
        info!("Ctrl-C received, initiating shutdown.");
    }
    Ok(())
}
