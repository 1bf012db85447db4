//! OpenAI chat completions backend.
//!
//! Requires OPENAI_API_KEY. Reasoning models (`o1*`, `o3*`) take a
//! `developer` message and reject sampling parameters, so those are only
//! sent to the regular chat models.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::api::{
    encode_image_base64, ensure_success, env_first, require_key, retry_on_rate_limit,
};
use super::{BackendKind, Provider, ProviderError, ProviderRequest};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com";
const KEY_HINT: &str = "OPENAI_API_KEY not set. Create a key at https://platform.openai.com/";

/// OpenAI chat completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ChatImageUrl },
}

#[derive(Debug, Serialize)]
struct ChatImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

fn is_reasoning_model(model: &str) -> bool {
    let model = model.to_lowercase();
    model.contains("o1") || model.contains("o3")
}

impl OpenAiBackend {
    /// Create a backend using OPENAI_API_KEY from the environment.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: env_first(&["OPENAI_API_KEY"]),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the API base URL (without `/v1`).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(&self, request: &ProviderRequest) -> Result<ChatRequest, ProviderError> {
        let reasoning = is_reasoning_model(&request.model);

        let mut user_content = vec![ChatContent::Text {
            text: request.user_prompt.clone(),
        }];
        if let Some(image) = &request.image {
            let (data, mime_type) = encode_image_base64(image)?;
            user_content.push(ChatContent::ImageUrl {
                image_url: ChatImageUrl {
                    url: format!("data:{};base64,{}", mime_type, data),
                    detail: "high",
                },
            });
        }

        Ok(ChatRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: if reasoning { "developer" } else { "system" },
                    content: vec![ChatContent::Text {
                        text: request.system_prompt.clone(),
                    }],
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens: (!reasoning).then_some(request.max_tokens),
            temperature: (!reasoning).then_some(request.temperature),
            reasoning_effort: reasoning.then_some("low"),
        })
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            KEY_HINT.to_string()
        } else {
            format!("OpenAI is available ({})", self.endpoint)
        }
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let api_key = require_key(BackendKind::OpenAi, &self.api_key, KEY_HINT)?;
        let body = self.build_request(request)?;
        let url = format!("{}/v1/chat/completions", self.endpoint);

        debug!("OpenAI request: model={}", request.model);
        let response = retry_on_rate_limit(BackendKind::OpenAi, || {
            self.client.post(&url).bearer_auth(api_key).json(&body).send()
        })
        .await?;
        let response = ensure_success(BackendKind::OpenAi, response).await?;

        let parsed: ChatResponse = response.json().await?;
        Ok(parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.to_string(),
            system_prompt: "You transcribe.".to_string(),
            user_prompt: "Transcribe this.".to_string(),
            temperature: 0.3,
            max_tokens: 1500,
            image: None,
        }
    }

    #[tokio::test]
    async fn test_chat_completion_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 1500
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Transcription: Dear Sir"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new(reqwest::Client::new())
            .with_api_key("sk-test")
            .with_endpoint(server.uri());
        let text = backend.complete(&request("gpt-4o")).await.unwrap();
        assert_eq!(text, "Transcription: Dear Sir");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new(reqwest::Client::new())
            .with_api_key("sk-test")
            .with_endpoint(server.uri());
        let err = backend.complete(&request("gpt-4o")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
    }

    #[test]
    fn test_reasoning_models_skip_sampling_params() {
        let backend = OpenAiBackend::new(reqwest::Client::new()).with_api_key("k");
        let body = backend.build_request(&request("o3-mini")).unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "developer");
        assert_eq!(json["reasoning_effort"], "low");
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_image_is_inlined_as_data_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = dir.path().join("page.png");
        std::fs::write(&image, [0u8, 1]).unwrap();

        let backend = OpenAiBackend::new(reqwest::Client::new()).with_api_key("k");
        let mut req = request("gpt-4o");
        req.image = Some(image);
        let json = serde_json::to_value(backend.build_request(&req).unwrap()).unwrap();
        let url = json["messages"][1]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let backend = OpenAiBackend {
            client: reqwest::Client::new(),
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        };
        assert!(!backend.is_available());
        let err = backend.complete(&request("gpt-4o")).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
