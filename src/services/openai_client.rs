use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ModelProfile;
use crate::services::llm_client::{AnalysisClient, ChatMessage, LlmClientError, TokenStream};

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamError {
    message: String,
}

/// One decoded line of the upstream event stream.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    /// Text, plus whether the same event also carried a `finish_reason`.
    Delta { text: String, finished: bool },
    Finished,
    Done,
    Failed(String),
    Skip,
}

pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return SseLine::Failed(err.message);
            }
            let Some(choice) = chunk.choices.into_iter().next() else {
                return SseLine::Skip;
            };
            match choice.delta.content {
                Some(content) if !content.is_empty() => SseLine::Delta {
                    text: content,
                    finished: choice.finish_reason.is_some(),
                },
                _ if choice.finish_reason.is_some() => SseLine::Finished,
                _ => SseLine::Skip,
            }
        }
        Err(e) => {
            debug!(error = %e, "Ignoring undecodable upstream event");
            SseLine::Skip
        }
    }
}

impl OpenAiClient {
    pub fn new(connect_timeout: Duration) -> Result<Self, LlmClientError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LlmClientError::ApiRequestFailed(e.to_string()))?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        profile: &ModelProfile,
        stream: bool,
    ) -> Result<reqwest::Response, LlmClientError> {
        let body = ChatCompletionRequest {
            model: &profile.model,
            messages,
            max_tokens: profile.max_tokens,
            temperature: profile.temperature,
            stream: stream.then_some(true),
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", profile.base_url.trim_end_matches('/')))
            .json(&body);
        if !profile.api_key.is_empty() {
            request = request.bearer_auth(&profile.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmClientError::ApiRequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmClientError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::ApiRequestFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl AnalysisClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        profile: &ModelProfile,
    ) -> Result<String, LlmClientError> {
        let response = self.send(messages, profile, false).await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmClientError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmClientError::InvalidResponse("empty choices".to_string()))
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        profile: &ModelProfile,
    ) -> Result<TokenStream, LlmClientError> {
        let response = self.send(messages, profile, true).await?;
        let model = profile.model.clone();
        let mut bytes = response.bytes_stream();

        let tokens = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(model = %model, error = %e, "Upstream byte stream failed");
                        yield Err(LlmClientError::Interrupted(e.to_string()));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        SseLine::Delta { text, finished: last } => {
                            yield Ok(text);
                            finished |= last;
                        }
                        SseLine::Finished => finished = true,
                        SseLine::Done => {
                            finished = true;
                            break 'read;
                        }
                        SseLine::Failed(message) => {
                            yield Err(LlmClientError::Interrupted(message));
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }

            if !finished && !buffer.is_empty() {
                match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                    SseLine::Delta { text, finished: last } => {
                        yield Ok(text);
                        finished = last;
                    }
                    SseLine::Finished | SseLine::Done => finished = true,
                    SseLine::Failed(message) => {
                        yield Err(LlmClientError::Interrupted(message));
                        return;
                    }
                    SseLine::Skip => {}
                }
            }

            if !finished {
                yield Err(LlmClientError::Interrupted(
                    "upstream closed the stream before completion".to_string(),
                ));
            }
        };

        Ok(Box::pin(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"| Date |"},"finish_reason":null}]}"#;
        assert_eq!(
            parse_sse_line(line),
            SseLine::Delta {
                text: "| Date |".to_string(),
                finished: false,
            }
        );
    }

    #[test]
    fn role_only_delta_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Skip);
    }

    #[test]
    fn recognises_terminal_lines() {
        assert_eq!(parse_sse_line("data: [DONE]\r\n"), SseLine::Done);
        let stop = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(stop), SseLine::Finished);
    }

    #[test]
    fn final_delta_keeps_finish_reason() {
        let line = r#"data: {"choices":[{"delta":{"content":" end"},"finish_reason":"stop"}]}"#;
        assert_eq!(
            parse_sse_line(line),
            SseLine::Delta {
                text: " end".to_string(),
                finished: true,
            }
        );
    }

    #[test]
    fn upstream_error_object_fails_the_stream() {
        let line = r#"data: {"error":{"message":"quota exceeded"}}"#;
        assert_eq!(parse_sse_line(line), SseLine::Failed("quota exceeded".to_string()));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
    }
}
