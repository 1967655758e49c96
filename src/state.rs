use std::sync::Arc;

use crate::config::Config;
use crate::middleware::RequestLimiter;
use crate::services::AnalysisPipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub limiter: Arc<RequestLimiter>,
}

impl AppState {
    pub fn new(config: Arc<Config>, pipeline: AnalysisPipeline) -> Self {
        let limiter = RequestLimiter::new(config.max_concurrent_requests);
        Self {
            config,
            pipeline: Arc::new(pipeline),
            limiter: Arc::new(limiter),
        }
    }
}
