use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Owns the on-disk copies of in-flight uploads.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::config(format!("Cannot create upload directory {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_writable(&self) -> bool {
        std::fs::metadata(&self.dir)
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false)
    }

    pub async fn store(&self, content: &[u8], original_name: &str) -> AppResult<UploadHandle> {
        let file_name = format!("{}-{}", Uuid::new_v4().simple(), sanitize_file_name(original_name));
        let path = self.dir.join(file_name);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        // From here on the handle owns the path, so a failed write still cleans up.
        let handle = UploadHandle {
            path,
            released: false,
        };
        file.write_all(content).await?;
        file.flush().await?;

        debug!(path = %handle.path.display(), bytes = content.len(), "Upload stored");
        Ok(handle)
    }
}

/// Deletes its file on [`UploadHandle::release`] or, failing that, on drop.
#[derive(Debug)]
pub struct UploadHandle {
    path: PathBuf,
    released: bool,
}

impl UploadHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> AppResult<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Upload released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove upload"),
        }
    }
}

impl Drop for UploadHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Upload released on drop"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove upload"),
        }
    }
}

/// Longest original-name suffix kept on disk, well under the 255-byte name limit.
pub const MAX_STORED_NAME_CHARS: usize = 100;

/// Keeps `[A-Za-z0-9.-]` only, capped at [`MAX_STORED_NAME_CHARS`] with the
/// extension preserved.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect();

    if sanitized.is_empty() {
        return "upload".to_string();
    }
    if sanitized.len() <= MAX_STORED_NAME_CHARS {
        return sanitized;
    }

    // Only ASCII survives the filter, so byte offsets are char offsets.
    match sanitized.rfind('.') {
        Some(dot) if sanitized.len() - dot <= 16 => {
            let extension = &sanitized[dot..];
            format!("{}{}", &sanitized[..MAX_STORED_NAME_CHARS - extension.len()], extension)
        }
        _ => sanitized[..MAX_STORED_NAME_CHARS].to_string(),
    }
}
