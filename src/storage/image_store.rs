//! On-disk storage for generated images.
//!
//! Writes go to a hidden temp file in the output directory and are renamed
//! over the target, so readers only ever see a complete image.
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Well-known file the host frontend expects to find the latest image in.
pub const LATEST_IMAGE_FILENAME: &str = "modelscope-latest.png";

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ImageStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, filename: &str) -> AppResult<PathBuf> {
        validate_filename(filename)?;
        Ok(self.dir.join(filename))
    }

    /// Atomically replace `<dir>/<filename>` with `bytes`.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> AppResult<PathBuf> {
        let target = self.path_for(filename)?;
        fs::create_dir_all(&self.dir).await?;

        let tmp = self.dir.join(format!(".{}.{}.tmp", filename, Uuid::new_v4().simple()));
        if let Err(e) = write_fully(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::info!("Saved {} bytes to {}", bytes.len(), target.display());
        Ok(target)
    }

    /// Delete temp files left behind by writes that never reached the rename,
    /// e.g. after the process was killed mid-save. Returns how many went.
    pub async fn remove_stale_temp_files(&self) -> AppResult<usize> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_temp_name(&name) && entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!("Removed {} stale temp file(s) from {}", removed, self.dir.display());
        }
        Ok(removed)
    }

    pub async fn read(&self, filename: &str) -> AppResult<Vec<u8>> {
        let path = self.path_for(filename)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::ImageNotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

async fn write_fully(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

/// Only plain file names inside the output directory are served or written.
pub fn validate_filename(filename: &str) -> AppResult<()> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        return Err(AppError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
