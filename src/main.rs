use std::env;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wajez::config::{Config, LogFormat};
use wajez::handlers::{create_router, STARTED_AT};
use wajez::services::{
    AnalysisClient, AnalysisPipeline, CacheStore, FileCacheStore, InMemoryCacheStore, OpenAiClient,
    UploadStore,
};
use wajez::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    Lazy::force(&STARTED_AT);

    init_tracing();

    let config = Arc::new(Config::from_env()?);

    tracing::info!("Starting Wajez document analysis service");
    tracing::info!("Max file size: {}MB", config.max_file_size_mb);
    tracing::info!("Max concurrent requests: {}", config.max_concurrent_requests);
    tracing::info!("Standard model: {}", config.standard_profile.model);
    tracing::info!("Deep thinker model: {}", config.deep_thinker_profile.model);

    let cache: Arc<dyn CacheStore> = match &config.cache_path {
        Some(path) => Arc::new(FileCacheStore::open(path.clone(), config.cache_ttl()).await?),
        None => Arc::new(InMemoryCacheStore::new(config.cache_ttl())),
    };
    let client: Arc<dyn AnalysisClient> = Arc::new(OpenAiClient::new(Duration::from_secs(10))?);
    let uploads = UploadStore::new(config.upload_dir.clone())?;

    let pipeline = AnalysisPipeline::new(Arc::clone(&config), client, cache, uploads);
    let state = AppState::new(Arc::clone(&config), pipeline);
    let app = create_router(state);

    // Determine port from environment (Railway compatibility)
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(config.server_port);

    let addr = format!("{}:{}", config.server_host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wajez=debug,tower_http=debug,axum::rejection=trace".into());

    let registry = tracing_subscriber::registry().with(filter);
    match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}
