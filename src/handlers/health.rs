use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::Json};
use once_cell::sync::Lazy;
use tracing::info;

use crate::error::AppResult;
use crate::models::{HealthResponse, RateLimitStatus, ServiceStatus};
use crate::state::AppState;

pub static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

/// Health check endpoint
pub async fn health_handler(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let uploads_ready = state.pipeline.uploads().is_writable();
    let upstream_configured = !state.config.standard_profile.api_key.is_empty();
    let (total_requests, rejected_requests, available_permits) = state.limiter.metrics();

    let status = if uploads_ready && upstream_configured {
        "healthy"
    } else {
        "degraded"
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: STARTED_AT.elapsed().as_secs(),
        services: ServiceStatus {
            cache_backend: state.pipeline.cache().backend().to_string(),
            upstream_configured,
            in_flight_analyses: state.pipeline.in_flight(),
        },
        rate_limiting: RateLimitStatus {
            total_requests,
            rejected_requests,
            available_permits,
        },
    };

    info!(
        status = status,
        uploads_ready = uploads_ready,
        upstream_configured = upstream_configured,
        "Health check completed"
    );

    Ok(Json(response))
}

/// Readiness check endpoint
pub async fn ready_handler(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.pipeline.uploads().is_writable() {
        Ok(StatusCode::OK)
    } else {
        info!("Readiness check failed - upload directory unavailable");
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
