//! AI provider backends and the router that dispatches to them.
//!
//! Supports four backends:
//! - OpenAI: chat completions (`gpt-*`, `o1*`, `o3*` models)
//! - Anthropic: messages API (`claude-*` models)
//! - Gemini: generateContent (`gemini-*` models)
//! - Document AI: promptless OCR processors (`document_ai_*` models)
//!
//! Backends report errors through [`ProviderError`]; the [`Router`] folds
//! every failure into an empty string so callers only see text.

mod anthropic;
mod api;
pub mod cleanup;
mod document_ai;
mod gemini;
mod openai;
mod router;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use anthropic::AnthropicBackend;
pub use document_ai::DocumentAiBackend;
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use router::{RouteCall, Router};

/// Errors from provider backends.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{backend} not configured: {hint}")]
    NotConfigured { backend: BackendKind, hint: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} API error ({status}): {message}")]
    Api {
        backend: BackendKind,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {backend}, retry after {retry_after_secs:?}s")]
    RateLimited {
        backend: BackendKind,
        retry_after_secs: Option<u64>,
    },

    #[error("Response validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProviderError::NotConfigured { .. } | ProviderError::InvalidInput(_)
        )
    }
}

/// Backend families an engine name can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    OpenAi,
    Anthropic,
    Gemini,
    DocumentAi,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Gemini => "gemini",
            BackendKind::DocumentAi => "document_ai",
        }
    }

    /// Map an engine/model name to a backend.
    ///
    /// Case-insensitive substring match; the first matching family wins.
    pub fn from_engine(engine: &str) -> Option<Self> {
        let engine = engine.to_lowercase();
        if ["gpt", "o1", "o3"].iter().any(|p| engine.contains(p)) {
            Some(BackendKind::OpenAi)
        } else if engine.contains("gemini") {
            Some(BackendKind::Gemini)
        } else if engine.contains("claude") {
            Some(BackendKind::Anthropic)
        } else if engine.contains("document_ai") || engine.contains("documentai") {
            Some(BackendKind::DocumentAi)
        } else {
            None
        }
    }

    pub fn all() -> [BackendKind; 4] {
        [
            BackendKind::OpenAi,
            BackendKind::Anthropic,
            BackendKind::Gemini,
            BackendKind::DocumentAi,
        ]
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a page contributes to a provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderInput {
    /// A page image, optionally with text substituted into the prompt.
    Image { path: PathBuf, text: Option<String> },
    /// Text substituted into the prompt; no image is sent.
    Text(String),
}

impl ProviderInput {
    pub fn image(&self) -> Option<&Path> {
        match self {
            ProviderInput::Image { path, .. } => Some(path),
            ProviderInput::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ProviderInput::Image { text, .. } => text.as_deref(),
            ProviderInput::Text(text) => Some(text),
        }
    }
}

/// A single, fully prepared backend request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub image: Option<PathBuf>,
}

/// A backend capable of turning a request into raw response text.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether credentials are present.
    fn is_available(&self) -> bool;

    /// Human-readable setup hint.
    fn availability_hint(&self) -> String;

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError>;
}

/// Shared provider handle.
pub type SharedProvider = Arc<dyn Provider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_mapping() {
        assert_eq!(BackendKind::from_engine("gpt-4o"), Some(BackendKind::OpenAi));
        assert_eq!(BackendKind::from_engine("o3-mini"), Some(BackendKind::OpenAi));
        assert_eq!(
            BackendKind::from_engine("Gemini-2.5-Pro"),
            Some(BackendKind::Gemini)
        );
        assert_eq!(
            BackendKind::from_engine("claude-sonnet-4-20250514"),
            Some(BackendKind::Anthropic)
        );
        assert_eq!(
            BackendKind::from_engine("document_ai_handwriting"),
            Some(BackendKind::DocumentAi)
        );
        assert_eq!(
            BackendKind::from_engine("DocumentAI-ocr"),
            Some(BackendKind::DocumentAi)
        );
        assert_eq!(BackendKind::from_engine("llama-3"), None);
    }

    #[test]
    fn test_input_accessors() {
        let input = ProviderInput::Image {
            path: PathBuf::from("p.jpg"),
            text: Some("draft".into()),
        };
        assert_eq!(input.image(), Some(Path::new("p.jpg")));
        assert_eq!(input.text(), Some("draft"));

        let input = ProviderInput::Text("hello".into());
        assert!(input.image().is_none());
        assert_eq!(input.text(), Some("hello"));
    }
}
