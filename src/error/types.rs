use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ErrorDetail, ErrorResponse};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unsupported file type: {media_type}. Only PDF and image files are supported")]
    UnsupportedType { media_type: String },

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Failed to process PDF file, make sure it is a valid PDF: {message}")]
    CorruptDocument { message: String },

    #[error("Image analysis is not supported in this mode ({media_type}). Please upload a PDF document instead")]
    UnsupportedModality { media_type: String },

    #[error("Analysis service unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("Analysis interrupted: {message}")]
    UpstreamInterrupted { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("No file provided")]
    MissingFile,

    #[error("Invalid upload: {message}")]
    InvalidUpload { message: String },

    #[error("Rate limit exceeded: maximum concurrent requests reached")]
    RateLimitExceeded,

    #[error("No cached result for key {key}")]
    ResultNotFound { key: String },

    #[error("Malformed result key: {key}")]
    InvalidCacheKey { key: String },

    #[error("No analysis in flight for request {request_id}")]
    UnknownRequest { request_id: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::UnsupportedType { .. } => "UNSUPPORTED_TYPE",
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::CorruptDocument { .. } => "CORRUPT_DOCUMENT",
            AppError::UnsupportedModality { .. } => "UNSUPPORTED_MODALITY",
            AppError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            AppError::UpstreamInterrupted { .. } => "UPSTREAM_INTERRUPTED",
            AppError::Internal { .. } => "INTERNAL_FAILURE",
            AppError::MissingFile => "MISSING_FILE",
            AppError::InvalidUpload { .. } => "INVALID_UPLOAD",
            AppError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AppError::ResultNotFound { .. } => "RESULT_NOT_FOUND",
            AppError::InvalidCacheKey { .. } => "INVALID_CACHE_KEY",
            AppError::UnknownRequest { .. } => "UNKNOWN_REQUEST",
            AppError::ConfigError { .. } => "CONFIG_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::CorruptDocument { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UnsupportedModality { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AppError::UpstreamInterrupted { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MissingFile => StatusCode::BAD_REQUEST,
            AppError::InvalidUpload { .. } => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::ResultNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InvalidCacheKey { .. } => StatusCode::BAD_REQUEST,
            AppError::UnknownRequest { .. } => StatusCode::NOT_FOUND,
            AppError::ConfigError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();
        let request_id = Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().to_rfc3339();

        if status.is_server_error() {
            tracing::error!(
                error_code = error_code,
                status_code = %status,
                request_id = %request_id,
                error_message = %message,
                "API error occurred"
            );
        } else {
            tracing::warn!(
                error_code = error_code,
                status_code = %status,
                request_id = %request_id,
                error_message = %message,
                "Request rejected"
            );
        }

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: error_code.to_string(),
                message,
                request_id,
                timestamp,
            },
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal {
            message: format!("Background task failed: {}", err),
        }
    }
}

// Helper methods for creating specific errors
impl AppError {
    pub fn unsupported_type(media_type: impl Into<String>) -> Self {
        AppError::UnsupportedType {
            media_type: media_type.into(),
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        AppError::CorruptDocument {
            message: message.into(),
        }
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        AppError::UpstreamUnavailable {
            message: message.into(),
        }
    }

    pub fn upstream_interrupted(message: impl Into<String>) -> Self {
        AppError::UpstreamInterrupted {
            message: message.into(),
        }
    }

    pub fn invalid_upload(message: impl Into<String>) -> Self {
        AppError::InvalidUpload {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AppError::ConfigError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
        }
    }
}
