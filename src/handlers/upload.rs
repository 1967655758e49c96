use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use bytes::BytesMut;
use futures::StreamExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::request_id;
use crate::models::{AnalysisOptions, AnalyzeResponse, UploadRequest, OCTET_STREAM};
use crate::services::{relay, Submission};
use crate::state::AppState;

pub const CACHE_HEADER: &str = "x-cache";

/// Streams an analysis of the uploaded file as server-sent events, or returns
/// the cached result as JSON when the same file and options were seen before.
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let request_id = request_id(&headers).unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(request_id = %request_id, "Starting upload request");

    let permit = state.limiter.try_acquire(&request_id)?;

    let upload = match read_upload(&mut multipart, state.config.max_file_size_bytes()).await {
        Ok(upload) => {
            info!(
                request_id = %request_id,
                file_name = %upload.file_name,
                file_size = upload.size(),
                media_type = %upload.media_type,
                deep_thinker = upload.options.deep_thinker,
                "File extracted from multipart form"
            );
            upload
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Failed to extract file from multipart");
            return Err(e);
        }
    };

    match state.pipeline.submit(&request_id, upload).await? {
        Submission::Cached(entry) => {
            Ok(([(CACHE_HEADER, "hit")], Json(AnalyzeResponse::from(entry))).into_response())
        }
        Submission::Streaming(chunks) => {
            // The permit travels with the stream and is released when it closes.
            let events = relay(chunks).map(move |event| {
                let _held = &permit;
                event
            });
            Ok((
                [(CACHE_HEADER, "miss")],
                Sse::new(events).keep_alive(KeepAlive::default()),
            )
                .into_response())
        }
    }
}

/// `cancel()` for a streamed analysis started under `request_id`.
pub async fn cancel_handler(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<StatusCode> {
    state.pipeline.cancel(&request_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reads the `file` part (bounded by `max_size_bytes`) and the analysis mode flag.
pub async fn read_upload(multipart: &mut Multipart, max_size_bytes: usize) -> AppResult<UploadRequest> {
    let mut file: Option<(String, String, BytesMut)> = None;
    let mut options = AnalysisOptions::default();
    let mut received = 0usize;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, received, max_size_bytes))?
    {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or(OCTET_STREAM).to_string();
                let mut data = BytesMut::new();

                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| multipart_error(e, received, max_size_bytes))?
                {
                    received += chunk.len();
                    if data.len() + chunk.len() > max_size_bytes {
                        return Err(AppError::PayloadTooLarge {
                            size: data.len() + chunk.len(),
                            limit: max_size_bytes,
                        });
                    }
                    data.extend_from_slice(&chunk);
                }

                if data.is_empty() {
                    return Err(AppError::invalid_upload("File is empty"));
                }
                file = Some((file_name, content_type, data));
            }
            "useDeepThinker" | "use_deep_thinker" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, received, max_size_bytes))?;
                options = AnalysisOptions::from_form_value(&value);
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let (file_name, content_type, data) = file.ok_or(AppError::MissingFile)?;
    Ok(UploadRequest::new(file_name, content_type, data.freeze()).with_options(options))
}

fn multipart_error(err: MultipartError, received: usize, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            size: received.max(limit + 1),
            limit,
        }
    } else {
        AppError::invalid_upload(format!("Failed to read multipart field: {}", err.body_text()))
    }
}
