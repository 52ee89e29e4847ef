//! Publish sink: the terminal stage's side effect.
//!
//! Appends each finished job's descriptor, augmented with the name of its
//! input directory, to the JSON array feed consumed by the playback
//! front-end.

use std::fs;
use std::path::PathBuf;

use serde_json::{Value, json};
use tracing::{info, warn};

use pipeline_core::{Job, PipelineError, Processor};

pub struct Publisher {
    feed_path: PathBuf,
}

impl Publisher {
    pub fn new(feed_path: PathBuf) -> Self {
        Self { feed_path }
    }

    /// Load the current feed; a missing or unreadable feed starts over as an
    /// empty array rather than failing the job.
    fn load_feed(&self) -> Vec<Value> {
        let raw = match fs::read(&self.feed_path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(feed = %self.feed_path.display(), error = %err, "feed not readable, starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_slice::<Vec<Value>>(&raw) {
            Ok(feed) => feed,
            Err(err) => {
                warn!(feed = %self.feed_path.display(), error = %err, "feed not parseable, starting empty");
                Vec::new()
            }
        }
    }
}

impl Processor for Publisher {
    fn name(&self) -> &str {
        "publish"
    }

    fn process(&mut self, job: &Job) -> Result<(), PipelineError> {
        let dir_name = job
            .input()
            .file_name()
            .ok_or_else(|| PipelineError::process("job input has no directory name"))?
            .to_string_lossy()
            .into_owned();

        let mut record = job.descriptor().clone();
        match record.as_object_mut() {
            Some(map) => {
                map.insert("dir".to_owned(), Value::String(dir_name.clone()));
            }
            None => record = json!({ "dir": dir_name }),
        }

        let mut feed = self.load_feed();
        feed.push(record);
        fs::write(&self.feed_path, serde_json::to_vec(&feed)?)?;

        info!(job_id = job.id(), dir = %dir_name, entries = feed.len(), "published stream");
        Ok(())
    }
}
