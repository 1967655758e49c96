use serde::{Deserialize, Serialize};

use crate::services::cache::CacheEntry;

/// Body of the non-streaming result endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub result: String,
    pub json_data: Option<String>,
}

impl From<CacheEntry> for AnalyzeResponse {
    fn from(entry: CacheEntry) -> Self {
        Self {
            result: entry.result,
            json_data: entry.json_data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub services: ServiceStatus,
    pub rate_limiting: RateLimitStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub cache_backend: String,
    pub upstream_configured: bool,
    pub in_flight_analyses: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub available_permits: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub timestamp: String,
}
