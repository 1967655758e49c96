pub mod cache;
pub mod extractor;
pub mod llm_client;
pub mod openai_client;
pub mod pipeline;
pub mod relay;
pub mod uploads;
pub mod validator;

pub use cache::{CacheEntry, CacheKey, CacheStore, FileCacheStore, InMemoryCacheStore};
pub use extractor::{ContentExtractor, ExtractionResult};
pub use llm_client::{AnalysisClient, ChatMessage, LlmClientError, Role, TokenStream};
pub use openai_client::OpenAiClient;
pub use pipeline::{AnalysisPipeline, ChunkStream, Submission};
pub use relay::relay;
pub use uploads::{UploadHandle, UploadStore};
pub use validator::FileValidator;
