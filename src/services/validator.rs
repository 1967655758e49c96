use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{normalize_mime, MediaType, UploadRequest, ValidatedFile, OCTET_STREAM};

/// Classifies uploads against the media-type allow-list and the size cap.
#[derive(Debug, Clone)]
pub struct FileValidator {
    allowed: Vec<MediaType>,
    max_size_bytes: usize,
}

impl FileValidator {
    pub fn new(allowed: Vec<MediaType>, max_size_bytes: usize) -> Self {
        Self {
            allowed,
            max_size_bytes,
        }
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    pub fn check_size(&self, size: usize) -> AppResult<()> {
        if size > self.max_size_bytes {
            return Err(AppError::PayloadTooLarge {
                size,
                limit: self.max_size_bytes,
            });
        }
        Ok(())
    }

    /// Resolves the declared media type. A generic octet-stream upload whose
    /// name ends in `.pdf` is treated as a PDF; nothing else is coerced.
    pub fn classify(&self, media_type: &str, file_name: &str) -> AppResult<MediaType> {
        let essence = normalize_mime(media_type);

        let resolved = match essence.parse::<MediaType>() {
            Ok(mt) => Some(mt),
            Err(_) if essence == OCTET_STREAM && file_name.to_ascii_lowercase().ends_with(".pdf") => {
                debug!(file_name = %file_name, "Coercing octet-stream upload to application/pdf");
                Some(MediaType::Pdf)
            }
            Err(_) => None,
        };

        match resolved {
            Some(mt) if self.allowed.contains(&mt) => Ok(mt),
            _ => Err(AppError::unsupported_type(media_type.trim())),
        }
    }

    pub fn validate(&self, upload: &UploadRequest) -> AppResult<ValidatedFile> {
        self.check_size(upload.size())?;
        let media_type = self.classify(&upload.media_type, &upload.file_name)?;

        Ok(ValidatedFile {
            file_name: upload.file_name.clone(),
            media_type,
            size: upload.size(),
            options: upload.options,
        })
    }
}
