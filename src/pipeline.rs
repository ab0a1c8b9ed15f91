//! Prompt → cloud image → file on disk.
use std::sync::Arc;

use uuid::Uuid;

use crate::cloud::ImageGenerator;
use crate::config::OutputMode;
use crate::error::AppResult;
use crate::storage::{ImageStore, LATEST_IMAGE_FILENAME};

pub struct Generator {
    images: Arc<dyn ImageGenerator>,
    store: ImageStore,
    mode: OutputMode,
}

impl Generator {
    pub fn new(images: Arc<dyn ImageGenerator>, store: ImageStore, mode: OutputMode) -> Self {
        Generator { images, store, mode }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Generate an image for `prompt` and return the filename it was saved under.
    /// `job` is the submitting job's id and number, if any.
    pub async fn generate(&self, prompt: &str, job: Option<(&str, u64)>) -> AppResult<String> {
        let bytes = self.fetch(prompt).await?;
        self.persist(&bytes, job).await
    }

    pub async fn fetch(&self, prompt: &str) -> AppResult<Vec<u8>> {
        self.images.generate(prompt).await
    }

    /// Write fetched bytes to the file(s) the output mode calls for.
    pub async fn persist(&self, bytes: &[u8], job: Option<(&str, u64)>) -> AppResult<String> {
        match self.mode {
            OutputMode::Shared => {
                self.store.save(LATEST_IMAGE_FILENAME, bytes).await?;
                Ok(LATEST_IMAGE_FILENAME.to_string())
            }
            OutputMode::PerJob => {
                let filename = per_job_filename(job);
                self.store.save(&filename, bytes).await?;
                self.store.save(LATEST_IMAGE_FILENAME, bytes).await?;
                Ok(filename)
            }
        }
    }
}

/// `modelscope-<id>-<number>.png`, with the id reduced to filename-safe
/// characters. Submission numbers are unique, so two jobs never share a file
/// even when their ids reduce to the same text. Without a job the name is
/// `modelscope-<uuid>.png` (no dash after the prefix, so it cannot collide).
pub fn per_job_filename(job: Option<(&str, u64)>) -> String {
    match job {
        Some((id, number)) => {
            let safe: String = id
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .take(64)
                .collect();
            let stem = if safe.is_empty() { "job" } else { safe.as_str() };
            format!("modelscope-{}-{}.png", stem, number)
        }
        None => format!("modelscope-{}.png", Uuid::new_v4().simple()),
    }
}
