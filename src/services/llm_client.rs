use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::config::ModelProfile;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Text deltas in arrival order. Dropping the stream aborts the remote call.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmClientError>> + Send + 'static>>;

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("stream interrupted: {0}")]
    Interrupted(String),
}

impl LlmClientError {
    /// Maps a failure to open the call.
    pub fn into_unavailable(self) -> AppError {
        AppError::upstream_unavailable(self.to_string())
    }

    /// Maps a failure after output has started flowing.
    pub fn into_interrupted(self) -> AppError {
        AppError::upstream_interrupted(self.to_string())
    }
}

/// Remote completion service.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        profile: &ModelProfile,
    ) -> Result<String, LlmClientError>;

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        profile: &ModelProfile,
    ) -> Result<TokenStream, LlmClientError>;
}
