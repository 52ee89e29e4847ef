use std::path::PathBuf;

use clap::Parser;

/// Watch-folder encoding pipeline.
///
/// Monitors the ingest directory for image-sequence jobs, encodes them on a
/// pool of container backends and publishes finished streams to a JSON feed.
#[derive(Debug, Parser)]
#[command(name = "framepipe", version, about)]
pub struct Args {
    /// Directory watched for incoming job directories
    #[arg(long, env = "FRAMEPIPE_INGEST_DIR", default_value = "/jobs_in")]
    pub ingest_dir: PathBuf,

    /// Directory the stream feed is published into
    #[arg(long, env = "FRAMEPIPE_OUTPUT_DIR", default_value = "/jobs_out")]
    pub output_dir: PathBuf,

    /// Directory with one entry per registered encoder backend
    #[arg(long, env = "FRAMEPIPE_ENCODERS_DIR", default_value = "/encoders")]
    pub encoders_dir: PathBuf,

    /// Seconds between scans of the ingest directory
    #[arg(long, default_value_t = 1)]
    pub poll_secs: u64,

    /// Encode entry point invoked inside each backend container
    #[arg(long, default_value = "/encode.sh")]
    pub encode_script: String,
}
