use std::time::Instant;

use lopdf::Document;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{MediaType, ValidatedFile};
use crate::services::llm_client::ChatMessage;

/// Output shape required from the model for the rendered result.
pub const TABLE_SYSTEM_PROMPT: &str = "\
You analyze documents and answer only with GitHub-flavored markdown tables.
Lay every table out like this:

| Header1 | Header2 |
|---------|---------|
| Data1   | Data2   |

Put a short markdown heading above each table saying what it contains.
Group related facts into separate tables and keep columns aligned with pipes and dashes.
When the content contains Arabic text, answer in Arabic.";

/// Output shape required from the model for the structured payload.
pub const JSON_SYSTEM_PROMPT: &str = "\
You turn document analyses into a single JSON object.
Choose descriptive keys, group related information into nested objects or arrays,
use numbers for numeric values and include document metadata where it is known.
When the content contains Arabic text, write the values in Arabic.
Answer with the JSON object only, without commentary.";

/// A model-ready conversation built from one validated upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub page_count: usize,
    pub document_text: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl ExtractionResult {
    /// Same user turn under a different system instruction.
    pub fn with_system_prompt(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(prompt)];
        messages.extend(
            self.messages
                .iter()
                .filter(|m| m.role != crate::services::llm_client::Role::System)
                .cloned(),
        );
        messages
    }
}

#[derive(Debug, Clone)]
pub struct ContentExtractor {
    include_document_text: bool,
    max_document_chars: usize,
}

impl ContentExtractor {
    pub fn new(include_document_text: bool, max_document_chars: usize) -> Self {
        Self {
            include_document_text,
            max_document_chars,
        }
    }

    pub async fn extract(&self, file: &ValidatedFile, content: Vec<u8>) -> AppResult<ExtractionResult> {
        match file.media_type {
            MediaType::Pdf => {
                let extractor = self.clone();
                let file_name = file.file_name.clone();
                tokio::task::spawn_blocking(move || extractor.extract_pdf(&file_name, &content)).await?
            }
            other => {
                info!(
                    file_name = %file.file_name,
                    media_type = %other,
                    "Refusing image analysis"
                );
                Err(AppError::UnsupportedModality {
                    media_type: other.to_string(),
                })
            }
        }
    }

    fn extract_pdf(&self, file_name: &str, content: &[u8]) -> AppResult<ExtractionResult> {
        let start = Instant::now();

        let document = Document::load_mem(content).map_err(|e| {
            warn!(file_name = %file_name, error = %e, "PDF structure validation failed");
            AppError::corrupt(e.to_string())
        })?;
        let page_count = document.get_pages().len();

        let document_text = if self.include_document_text {
            self.document_text(content)
        } else {
            None
        };

        let messages = vec![
            ChatMessage::system(TABLE_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt(page_count, document_text.as_deref())),
        ];

        info!(
            file_name = %file_name,
            pages = page_count,
            text_chars = document_text.as_ref().map(|t| t.chars().count()).unwrap_or(0),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "PDF prompt prepared"
        );

        Ok(ExtractionResult {
            page_count,
            document_text,
            messages,
        })
    }

    // pdf-extract panics on some malformed font tables; a missing text layer is not fatal.
    fn document_text(&self, content: &[u8]) -> Option<String> {
        let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(content));

        let text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                debug!(error = %e, "PDF text layer unavailable");
                return None;
            }
            Err(_) => {
                warn!("PDF text extraction panicked, continuing without text layer");
                return None;
            }
        };

        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            return None;
        }

        Some(truncate_chars(&cleaned, self.max_document_chars))
    }
}

fn user_prompt(page_count: usize, document_text: Option<&str>) -> String {
    let pages = if page_count == 1 {
        "1 page".to_string()
    } else {
        format!("{} pages", page_count)
    };

    let mut prompt = format!(
        "Analyze this PDF document ({pages}). Extract and organize its key information:
1. Document type and purpose
2. Important dates, names and amounts
3. Key sections and what they contain
4. Notable formatting or structure

Present everything in well-organized markdown tables."
    );

    if let Some(text) = document_text {
        prompt.push_str("\n\nDocument text:\n");
        prompt.push_str(text);
    }

    prompt
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
