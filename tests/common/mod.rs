#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use futures::{Stream, StreamExt};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream as PdfStream};

use wajez::config::{Config, ModelProfile};
use wajez::models::StreamChunk;
use wajez::services::{
    AnalysisClient, AnalysisPipeline, ChatMessage, InMemoryCacheStore, LlmClientError, TokenStream,
    UploadStore,
};
use wajez::state::AppState;

pub const BOUNDARY: &str = "wajez-test-boundary";

/// Builds a small but well-formed PDF with one line of text per page.
pub fn pdf_with_pages(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Invoice page {}", page))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(PdfStream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}

#[derive(Clone, Debug)]
pub enum Ending {
    Clean,
    Interrupted(String),
    Hang,
}

/// Test double for the remote completion service.
pub struct ScriptedClient {
    chunks: Vec<String>,
    ending: Ending,
    open_error: Option<String>,
    completions: Vec<String>,
    pub stream_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    pub models: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    pub fn streaming(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ending: Ending::Clean,
            open_error: None,
            completions: Vec::new(),
            stream_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            models: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }

    pub fn failing_to_open(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    /// Answers for `complete`: the table pass, then the JSON pass.
    pub fn completions(mut self, answers: &[&str]) -> Self {
        self.completions = answers.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn total_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst) + self.complete_calls.load(Ordering::SeqCst)
    }

    fn record(&self, messages: &[ChatMessage], profile: &ModelProfile) {
        self.models.lock().unwrap().push(profile.model.clone());
        self.requests.lock().unwrap().push(messages.to_vec());
    }
}

#[async_trait]
impl AnalysisClient for ScriptedClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        profile: &ModelProfile,
    ) -> Result<String, LlmClientError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages, profile);
        if let Some(message) = &self.open_error {
            return Err(LlmClientError::ApiRequestFailed(message.clone()));
        }
        // First answer serves the table pass, second the JSON pass.
        let answer = if messages[0].content.contains("JSON") {
            self.completions.get(1).or(self.completions.first())
        } else {
            self.completions.first()
        };
        Ok(answer.cloned().unwrap_or_default())
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        profile: &ModelProfile,
    ) -> Result<TokenStream, LlmClientError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages, profile);
        if let Some(message) = &self.open_error {
            return Err(LlmClientError::ApiRequestFailed(message.clone()));
        }

        let head = futures::stream::iter(
            self.chunks
                .clone()
                .into_iter()
                .map(Ok::<_, LlmClientError>)
                .collect::<Vec<_>>(),
        );
        let tokens: TokenStream = match self.ending.clone() {
            Ending::Clean => Box::pin(head),
            Ending::Interrupted(message) => Box::pin(head.chain(futures::stream::once(async move {
                Err(LlmClientError::Interrupted(message))
            }))),
            Ending::Hang => Box::pin(head.chain(futures::stream::pending())),
        };
        Ok(tokens)
    }
}

pub fn test_config(upload_dir: &Path) -> Config {
    let mut config = Config {
        upload_dir: upload_dir.to_path_buf(),
        stream_timeout_seconds: 5,
        ..Config::default()
    };
    config.standard_profile.model = "standard-model".to_string();
    config.standard_profile.api_key = "test-key".to_string();
    config.deep_thinker_profile.model = "deep-model".to_string();
    config.deep_thinker_profile.temperature = 1.3;
    config
}

pub fn pipeline_with(config: Config, client: Arc<ScriptedClient>) -> Arc<AnalysisPipeline> {
    let config = Arc::new(config);
    let cache = Arc::new(InMemoryCacheStore::new(config.cache_ttl()));
    let uploads = UploadStore::new(config.upload_dir.clone()).unwrap();
    Arc::new(AnalysisPipeline::new(config, client, cache, uploads))
}

pub fn state_with(config: Config, client: Arc<ScriptedClient>) -> AppState {
    let config = Arc::new(config);
    let cache = Arc::new(InMemoryCacheStore::new(config.cache_ttl()));
    let uploads = UploadStore::new(config.upload_dir.clone()).unwrap();
    let pipeline = AnalysisPipeline::new(Arc::clone(&config), client, cache, uploads);
    AppState::new(config, pipeline)
}

pub fn multipart_body(file_name: &str, content_type: &str, content: &[u8], deep_thinker: Option<bool>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");

    if let Some(flag) = deep_thinker {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"useDeepThinker\"\r\n\r\n");
        body.extend_from_slice(flag.to_string().as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(uri: &str, request_id: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("x-request-id", request_id)
        .body(Body::from(body))
        .unwrap()
}

/// `data:` payloads of an SSE body, in order.
pub fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}

pub async fn collect<S>(stream: S) -> Vec<StreamChunk>
where
    S: Stream<Item = StreamChunk>,
{
    tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
        .await
        .expect("stream did not finish")
}

pub fn stored_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
