use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// The closed set of media types an upload may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl MediaType {
    pub const ALL: [MediaType; 5] = [
        MediaType::Pdf,
        MediaType::Png,
        MediaType::Jpeg,
        MediaType::Gif,
        MediaType::Webp,
    ];

    pub fn as_mime(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Gif => "image/gif",
            MediaType::Webp => "image/webp",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, MediaType::Pdf)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let essence = normalize_mime(s);
        MediaType::ALL
            .into_iter()
            .find(|mt| mt.as_mime() == essence)
            .ok_or_else(|| format!("unsupported media type: {}", s.trim()))
    }
}

/// Lowercased mime essence with any `; param=...` suffix removed.
pub fn normalize_mime(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Selects the model profile used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Standard,
    DeepThinker,
}

/// Options that change the analysis result. Every field here must be part of
/// [`AnalysisOptions::canonical`], otherwise cache keys collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub deep_thinker: bool,
}

impl AnalysisOptions {
    pub fn new(deep_thinker: bool) -> Self {
        Self { deep_thinker }
    }

    /// Parses the `useDeepThinker` form value. Anything but `true`/`1`/`on` is off.
    pub fn from_form_value(value: &str) -> Self {
        let flag = matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "on" | "yes"
        );
        Self::new(flag)
    }

    pub fn mode(&self) -> AnalysisMode {
        if self.deep_thinker {
            AnalysisMode::DeepThinker
        } else {
            AnalysisMode::Standard
        }
    }

    pub fn canonical(&self) -> String {
        format!("deep_thinker={}", self.deep_thinker)
    }
}

/// A raw upload as read off the wire, owned by exactly one request.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub media_type: String,
    pub content: Bytes,
    pub options: AnalysisOptions,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            content,
            options: AnalysisOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// An upload whose media type has been confirmed against the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    pub file_name: String,
    pub media_type: MediaType,
    pub size: usize,
    pub options: AnalysisOptions,
}
