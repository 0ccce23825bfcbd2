//! StoreCopy CLI - parallel copy between local storage and object stores

use clap::Parser;
use std::sync::Arc;
use storecopy::config::{CliArgs, CopyConfig, Direction, LogFormat, RemoteConfig};
use storecopy::core::{CopyEngine, CopyReport};
use storecopy::error::Result;
use storecopy::progress::ProgressReporter;
use storecopy::storage::{GcsStorage, LocalStorage, S3Storage, Storage};
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // Bad configuration never starts a run
    let config = match CopyConfig::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if let Ok(json) = serde_json::to_string(&config) {
        tracing::debug!("Configuration: {}", json);
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(config)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "warn"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: CopyConfig) -> Result<CopyReport> {
    let local = LocalStorage::new(&config.local_path)
        .with_follow_symlinks(config.follow_symlinks)
        .with_queue_depth(config.queue_depth);

    let remote: Arc<dyn Storage> = match &config.remote {
        RemoteConfig::S3(s3) => {
            Arc::new(S3Storage::connect(s3).await?.with_queue_depth(config.queue_depth))
        }
        RemoteConfig::Gcs(gcs) => Arc::new(GcsStorage::new(gcs)?.with_queue_depth(config.queue_depth)),
    };

    let progress = if config.progress {
        ProgressReporter::new()
    } else {
        ProgressReporter::disabled()
    };
    let engine = CopyEngine::new(config.copy).with_progress(progress);

    match config.direction {
        Direction::Put => engine.transfer(&local, remote).await,
        Direction::Get => engine.transfer(remote.as_ref(), Arc::new(local)).await,
    }
}
