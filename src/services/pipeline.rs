use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{StreamChunk, UploadRequest, ValidatedFile};
use crate::services::cache::{CacheEntry, CacheKey, CacheStore};
use crate::services::extractor::{ContentExtractor, JSON_SYSTEM_PROMPT};
use crate::services::llm_client::{AnalysisClient, LlmClientError};
use crate::services::uploads::{UploadHandle, UploadStore};
use crate::services::validator::FileValidator;

pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// What `submit` hands back to the transport.
pub enum Submission {
    /// Already materialized; no remote call was made.
    Cached(CacheEntry),
    /// Live analysis; ends with exactly one `Done` or `Error`.
    Streaming(ChunkStream),
}

type Registry = Arc<Mutex<HashMap<String, CancellationToken>>>;

pub struct AnalysisPipeline {
    config: Arc<Config>,
    validator: FileValidator,
    extractor: ContentExtractor,
    client: Arc<dyn AnalysisClient>,
    cache: Arc<dyn CacheStore>,
    uploads: UploadStore,
    in_flight: Registry,
}

impl AnalysisPipeline {
    pub fn new(
        config: Arc<Config>,
        client: Arc<dyn AnalysisClient>,
        cache: Arc<dyn CacheStore>,
        uploads: UploadStore,
    ) -> Self {
        let validator = FileValidator::new(config.allowed_media_types.clone(), config.max_file_size_bytes());
        let extractor = ContentExtractor::new(config.include_document_text, config.max_document_chars);

        Self {
            config,
            validator,
            extractor,
            client,
            cache,
            uploads,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Serves a cache hit, or stores and validates the upload and returns the
    /// live analysis. Errors returned here happen before any stream exists.
    pub async fn submit(self: &Arc<Self>, request_id: &str, upload: UploadRequest) -> AppResult<Submission> {
        self.validator.check_size(upload.size())?;

        let key = CacheKey::compute(&upload.content, &upload.options);
        if let Some(entry) = self.lookup(&key).await {
            info!(request_id = %request_id, key = %key, file_name = %upload.file_name, "Serving cached analysis");
            return Ok(Submission::Cached(entry));
        }

        let handle = self.uploads.store(&upload.content, &upload.file_name).await?;
        let file = match self.validator.validate(&upload) {
            Ok(file) => file,
            Err(e) => {
                handle.release().await;
                return Err(e);
            }
        };

        let in_flight = match InFlight::register(&self.in_flight, request_id) {
            Ok(guard) => guard,
            Err(e) => {
                handle.release().await;
                return Err(e);
            }
        };

        info!(
            request_id = %request_id,
            file_name = %file.file_name,
            media_type = %file.media_type,
            size = file.size,
            mode = ?file.options.mode(),
            "Starting streamed analysis"
        );

        let stream = Arc::clone(self).run(in_flight, key, file, handle);
        Ok(Submission::Streaming(Box::pin(stream)))
    }

    /// Trips the cancellation token of a streamed analysis.
    pub fn cancel(&self, request_id: &str) -> AppResult<()> {
        match lock(&self.in_flight).get(request_id) {
            Some(token) => {
                info!(request_id = %request_id, "Cancelling analysis");
                token.cancel();
                Ok(())
            }
            None => Err(AppError::UnknownRequest {
                request_id: request_id.to_string(),
            }),
        }
    }

    /// Non-streaming analysis producing both the rendered tables and the JSON payload.
    pub async fn analyze(&self, upload: UploadRequest) -> AppResult<CacheEntry> {
        self.validator.check_size(upload.size())?;

        let key = CacheKey::compute(&upload.content, &upload.options);
        match self.lookup(&key).await {
            Some(entry) if entry.json_data.is_some() => {
                info!(key = %key, file_name = %upload.file_name, "Serving cached analysis");
                return Ok(entry);
            }
            Some(_) => debug!(key = %key, "Cached entry has no structured payload, re-running"),
            None => {}
        }

        let handle = self.uploads.store(&upload.content, &upload.file_name).await?;
        let outcome = self.analyze_stored(&upload, &handle).await;
        handle.release().await;

        let entry = outcome?;
        self.remember(&key, entry.clone()).await;
        Ok(entry)
    }

    pub async fn cached(&self, key: &CacheKey) -> AppResult<CacheEntry> {
        self.cache
            .get(key)
            .await?
            .ok_or_else(|| AppError::ResultNotFound {
                key: key.to_string(),
            })
    }

    async fn analyze_stored(&self, upload: &UploadRequest, handle: &UploadHandle) -> AppResult<CacheEntry> {
        let start = Instant::now();
        let file = self.validator.validate(upload)?;
        let content = handle.read().await?;
        let extraction = self.extractor.extract(&file, content).await?;
        let profile = self.config.profile(file.options.mode());

        let json_messages = extraction.with_system_prompt(JSON_SYSTEM_PROMPT);
        let completions = async {
            tokio::try_join!(
                self.client.complete(&extraction.messages, profile),
                self.client.complete(&json_messages, profile),
            )
        };

        let (table, json) = tokio::time::timeout(self.config.stream_timeout(), completions)
            .await
            .map_err(|_| AppError::upstream_interrupted("analysis timed out"))?
            .map_err(LlmClientError::into_unavailable)?;

        info!(
            file_name = %file.file_name,
            model = %profile.model,
            pages = extraction.page_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis completed"
        );

        Ok(CacheEntry::new(table, Some(strip_code_fence(&json))))
    }

    fn run(
        self: Arc<Self>,
        in_flight: InFlight,
        key: CacheKey,
        file: ValidatedFile,
        handle: UploadHandle,
    ) -> impl Stream<Item = StreamChunk> + Send {
        enum Step<T> {
            Cancelled,
            Next(T),
        }

        async_stream::stream! {
            let start = Instant::now();
            let mut rendered = String::new();
            let mut chunks = 0usize;

            let outcome: AppResult<()> = 'analysis: {
                let content = match handle.read().await {
                    Ok(content) => content,
                    Err(e) => break 'analysis Err(e),
                };
                let extraction = match self.extractor.extract(&file, content).await {
                    Ok(extraction) => extraction,
                    Err(e) => break 'analysis Err(e),
                };

                let profile = self.config.profile(file.options.mode());
                debug!(request_id = %in_flight.request_id, model = %profile.model, "Opening upstream stream");

                let opened = tokio::select! {
                    biased;
                    _ = in_flight.token.cancelled() => Step::Cancelled,
                    opened = self.client.complete_stream(&extraction.messages, profile) => Step::Next(opened),
                };
                let mut tokens = match opened {
                    Step::Cancelled => break 'analysis Err(cancelled()),
                    Step::Next(Ok(tokens)) => tokens,
                    Step::Next(Err(e)) => break 'analysis Err(e.into_unavailable()),
                };

                let deadline = tokio::time::Instant::now() + self.config.stream_timeout();
                loop {
                    let step = tokio::select! {
                        biased;
                        _ = in_flight.token.cancelled() => Step::Cancelled,
                        next = tokio::time::timeout_at(deadline, tokens.next()) => Step::Next(next),
                    };

                    match step {
                        Step::Cancelled => break 'analysis Err(cancelled()),
                        Step::Next(Err(_)) => {
                            break 'analysis Err(AppError::upstream_interrupted("analysis timed out"))
                        }
                        Step::Next(Ok(None)) => break 'analysis Ok(()),
                        Step::Next(Ok(Some(Err(e)))) => break 'analysis Err(e.into_interrupted()),
                        Step::Next(Ok(Some(Ok(text)))) => {
                            chunks += 1;
                            rendered.push_str(&text);
                            yield StreamChunk::Content(text);
                        }
                    }
                }
            };

            handle.release().await;

            match outcome {
                Ok(()) => {
                    if rendered.trim().is_empty() {
                        warn!(request_id = %in_flight.request_id, "Upstream produced no content, not caching");
                    } else {
                        self.remember(&key, CacheEntry::new(rendered, None)).await;
                    }
                    info!(
                        request_id = %in_flight.request_id,
                        chunks = chunks,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Streamed analysis completed"
                    );
                    yield StreamChunk::Done;
                }
                Err(e) => {
                    warn!(
                        request_id = %in_flight.request_id,
                        error_code = e.error_code(),
                        error = %e,
                        chunks = chunks,
                        "Streamed analysis failed"
                    );
                    yield StreamChunk::Error(e.to_string());
                }
            }
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.cache.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn remember(&self, key: &CacheKey, entry: CacheEntry) {
        if let Err(e) = self.cache.put(key, entry).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}

/// Registry slot for one streamed analysis, freed on drop.
struct InFlight {
    registry: Registry,
    request_id: String,
    token: CancellationToken,
}

impl InFlight {
    fn register(registry: &Registry, request_id: &str) -> AppResult<Self> {
        let mut slots = lock(registry);
        if slots.contains_key(request_id) {
            return Err(AppError::invalid_upload(format!(
                "request id {} already has an analysis in flight",
                request_id
            )));
        }
        let token = CancellationToken::new();
        slots.insert(request_id.to_string(), token.clone());

        Ok(Self {
            registry: Arc::clone(registry),
            request_id: request_id.to_string(),
            token,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.request_id);
    }
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn cancelled() -> AppError {
    AppError::upstream_interrupted("analysis cancelled by client")
}

/// Drops a surrounding ```json fence if the model added one.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}
