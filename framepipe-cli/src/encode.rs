//! Encode processor: one instance per encoder backend container.
//!
//! Processing a job runs the encode entry point inside the backend via
//! `docker exec` and blocks until it exits. Blocking here is fine: each pool
//! worker drives exactly one backend, and a busy worker simply leaves the
//! next job to whichever sibling frees up first.

use std::process::Command;

use tracing::{debug, info};

use pipeline_core::{Job, PipelineError, Processor};

pub struct EncodeBackend {
    backend_id: String,
    script: String,
}

impl EncodeBackend {
    pub fn new(backend_id: String, script: String) -> Self {
        Self { backend_id, script }
    }
}

impl Processor for EncodeBackend {
    fn name(&self) -> &str {
        &self.backend_id
    }

    fn process(&mut self, job: &Job) -> Result<(), PipelineError> {
        let dir_name = job
            .input()
            .file_name()
            .ok_or_else(|| PipelineError::process("job input has no directory name"))?;

        info!(
            backend = %self.backend_id,
            job_id = job.id(),
            dir = %dir_name.to_string_lossy(),
            "invoking encoder"
        );

        let output = Command::new("docker")
            .args(["exec", "-i", &self.backend_id, &self.script])
            .arg(dir_name)
            .arg(job.fps().to_string())
            .output()?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(backend = %self.backend_id, job_id = job.id(), "{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(backend = %self.backend_id, job_id = job.id(), "{line}");
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(PipelineError::process(format!(
                "encoder {} exited with {}",
                self.backend_id, output.status
            )))
        }
    }
}
