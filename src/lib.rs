//! Wajez document analysis service
//!
//! Accepts a document upload, streams a model-generated summary back as
//! server-sent events and short-circuits repeat submissions through a
//! content-addressed result cache.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
