//! Ingest source: watches the ingest directory for image-sequence job
//! directories and turns ready ones into pipeline jobs.
//!
//! A job directory is ready once it contains a `jobdesc.json` descriptor and
//! at least `frames_n` frame files. Sequences can take a while to copy into
//! the ingest storage, so the frame count is the readiness signal; the
//! descriptor file is deleted when the job is claimed so the same directory
//! is never ingested twice.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use pipeline_core::{Job, PipelineError, Source};

/// Name of the per-job descriptor file dropped next to the frames.
const DESCRIPTOR_FILE: &str = "jobdesc.json";

/// Extension of the frame files counted against `frames_n`.
const FRAME_EXT: &str = "jpg";

#[derive(Debug, Deserialize)]
struct JobDesc {
    frames_n: u64,
    fps: u32,
}

pub struct IngestSource {
    root: PathBuf,
    next_id: u64,
}

impl IngestSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root, next_id: 1 }
    }

    /// Claim the job in `dir` if it is ready. Claiming removes the
    /// descriptor file before the job is handed out.
    fn claim(&mut self, dir: &Path) -> Result<Option<Job>, PipelineError> {
        let desc_path = dir.join(DESCRIPTOR_FILE);
        if !desc_path.is_file() {
            return Ok(None);
        }

        let raw: Value = serde_json::from_slice(&fs::read(&desc_path)?)?;
        let desc: JobDesc = serde_json::from_value(raw.clone())?;

        let frames = count_frames(dir)?;
        if frames < desc.frames_n {
            return Ok(None);
        }

        fs::remove_file(&desc_path)?;

        let job = Job::new(self.next_id, dir.to_path_buf(), desc.fps, raw);
        self.next_id += 1;
        info!(job_id = job.id(), dir = %dir.display(), frames, "claimed ingest job");
        Ok(Some(job))
    }
}

fn count_frames(dir: &Path) -> Result<u64, PipelineError> {
    let mut frames = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == FRAME_EXT) {
            frames += 1;
        }
    }
    Ok(frames)
}

impl Source for IngestSource {
    fn name(&self) -> &str {
        "ingest"
    }

    fn poll(&mut self) -> Result<Option<Job>, PipelineError> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            match self.claim(&path) {
                Ok(Some(job)) => return Ok(Some(job)),
                Ok(None) => {}
                // A broken descriptor or a permissions problem in one job
                // directory must not stall the rest of the scan.
                Err(err) => {
                    warn!(dir = %path.display(), error = %err, "skipping job directory")
                }
            }
        }
        Ok(None)
    }
}
