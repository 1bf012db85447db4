//! Google Gemini generateContent backend.
//!
//! Requires GEMINI_API_KEY (GOOGLE_API_KEY is accepted as a fallback).
//! Output length is fixed at the model's 8192-token ceiling.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::api::{
    encode_image_base64, ensure_success, env_first, require_key, retry_on_rate_limit,
};
use super::{BackendKind, Provider, ProviderError, ProviderRequest};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const MAX_OUTPUT_TOKENS: u32 = 8192;
const KEY_HINT: &str = "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/";

/// Gemini backend using Google's Generative AI API.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiBackend {
    /// Create a backend using GEMINI_API_KEY or GOOGLE_API_KEY.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: env_first(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the API base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(&self, request: &ProviderRequest) -> Result<GeminiRequest, ProviderError> {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = &request.image {
            let (data, mime_type) = encode_image_base64(image)?;
            parts.push(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: mime_type.to_string(),
                    data,
                },
            });
        }
        parts.push(GeminiPart::Text {
            text: request.user_prompt.clone(),
        });

        let system_instruction = (!request.system_prompt.trim().is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text {
                text: request.system_prompt.clone(),
            }],
        });

        Ok(GeminiRequest {
            system_instruction,
            contents: vec![GeminiContent {
                role: Some("user"),
                parts,
            }],
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        })
    }
}

#[async_trait::async_trait]
impl Provider for GeminiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            KEY_HINT.to_string()
        } else {
            format!("Gemini is available ({})", self.endpoint)
        }
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let api_key = require_key(BackendKind::Gemini, &self.api_key, KEY_HINT)?;
        let body = self.build_request(request)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, request.model
        );

        debug!("Gemini request: model={}", request.model);
        let response = retry_on_rate_limit(BackendKind::Gemini, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
        })
        .await?;
        let response = ensure_success(BackendKind::Gemini, response).await?;

        let parsed: GeminiResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(ProviderError::Api {
                backend: BackendKind::Gemini,
                status: 200,
                message: error.message,
            });
        }

        // Responses can be split across several text parts.
        let text = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gemini-2.5-pro".to_string(),
            system_prompt: "You transcribe.".to_string(),
            user_prompt: "Transcribe.".to_string(),
            temperature: 0.3,
            max_tokens: 1500,
            image: None,
        }
    }

    #[tokio::test]
    async fn test_generate_content_joins_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
            .and(header("x-goog-api-key", "g-test"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"maxOutputTokens": 8192}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [
                    {"text": "Transcription: "},
                    {"text": "Anno 1723"}
                ]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(reqwest::Client::new())
            .with_api_key("g-test")
            .with_endpoint(server.uri());
        assert_eq!(
            backend.complete(&request()).await.unwrap(),
            "Transcription: Anno 1723"
        );
    }

    #[tokio::test]
    async fn test_error_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"message": "quota exhausted"}
            })))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(reqwest::Client::new())
            .with_api_key("g-test")
            .with_endpoint(server.uri());
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("quota exhausted"));
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let backend = GeminiBackend::new(reqwest::Client::new());
        let mut req = request();
        req.system_prompt = "  ".to_string();
        let json = serde_json::to_value(backend.build_request(&req).unwrap()).unwrap();
        assert!(json.get("systemInstruction").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
    }
}
