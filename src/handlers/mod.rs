pub mod analyze;
pub mod health;
pub mod upload;

pub use analyze::*;
pub use health::*;
pub use upload::*;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::logging_middleware;
use crate::state::AppState;

/// Room for multipart boundaries and the form fields next to the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/results/:key", get(result_handler))
        .route("/api/uploads/:request_id", delete(cancel_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(axum::middleware::from_fn(logging_middleware)),
        )
        .with_state(state)
}
