use std::time::Instant;

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    response::Json,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::upload::read_upload;
use crate::middleware::request_id;
use crate::models::AnalyzeResponse;
use crate::services::CacheKey;
use crate::state::AppState;

/// Non-streaming analysis returning `{result, json_data}`.
pub async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<AnalyzeResponse>> {
    let start = Instant::now();
    let request_id = request_id(&headers).unwrap_or_else(|| Uuid::new_v4().to_string());

    let _permit = state.limiter.try_acquire(&request_id)?;
    let upload = read_upload(&mut multipart, state.config.max_file_size_bytes()).await?;

    info!(
        request_id = %request_id,
        file_name = %upload.file_name,
        file_size = upload.size(),
        deep_thinker = upload.options.deep_thinker,
        "Starting analysis request"
    );

    let entry = match state.pipeline.analyze(upload).await {
        Ok(entry) => entry,
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Analysis failed");
            return Err(e);
        }
    };

    info!(
        request_id = %request_id,
        total_time_ms = start.elapsed().as_millis() as u64,
        "Request completed successfully"
    );

    Ok(Json(AnalyzeResponse::from(entry)))
}

/// Looks up a result by a fingerprint computed by the client.
pub async fn result_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<AnalyzeResponse>> {
    let key = CacheKey::parse(&key).ok_or(AppError::InvalidCacheKey { key })?;
    let entry = state.pipeline.cached(&key).await?;
    Ok(Json(AnalyzeResponse::from(entry)))
}
