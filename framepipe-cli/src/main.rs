mod cli;
mod encode;
mod ingest;
mod publish;

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pipeline_core::{Pipeline, PoolStage, Processor, SerialStage, SourceStage};

use crate::cli::Args;
use crate::encode::EncodeBackend;
use crate::ingest::IngestSource;
use crate::publish::Publisher;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Backends register themselves as entries in the encoders directory; block
/// until at least one shows up.
async fn wait_for_backends(dir: &Path) -> anyhow::Result<Vec<String>> {
    loop {
        let backends: Vec<String> = fs::read_dir(dir)
            .with_context(|| format!("reading encoders directory {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        if !backends.is_empty() {
            return Ok(backends);
        }
        info!(dir = %dir.display(), "waiting for encoder backends to register");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    info!("setting up pipeline");
    let backends = wait_for_backends(&args.encoders_dir).await?;
    info!(count = backends.len(), "encoder backends registered");

    let ingest = SourceStage::new(
        "ingest",
        IngestSource::new(args.ingest_dir),
        Duration::from_secs(args.poll_secs),
    );
    let encoders: Vec<Box<dyn Processor + Send>> = backends
        .into_iter()
        .map(|id| Box::new(EncodeBackend::new(id, args.encode_script.clone())) as _)
        .collect();
    let encode = PoolStage::new("encode", encoders);
    let publish = SerialStage::new(
        "publish",
        Publisher::new(args.output_dir.join("streams.json")),
    );

    let pipeline = Pipeline::builder()
        .stage(ingest)
        .stage(encode)
        .stage(publish)
        .build()?;

    pipeline.start();
    info!("pipeline running, press Ctrl-C to stop");

    signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("interrupt received, shutting down");

    // stop() joins worker threads; keep that off the async runtime.
    tokio::task::spawn_blocking(move || pipeline.stop())
        .await
        .context("joining pipeline shutdown")?;

    Ok(())
}
