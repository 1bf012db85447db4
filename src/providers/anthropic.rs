//! Anthropic messages backend.
//!
//! Requires ANTHROPIC_API_KEY.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::api::{
    encode_image_base64, ensure_success, env_first, require_key, retry_on_rate_limit,
};
use super::{BackendKind, Provider, ProviderError, ProviderRequest};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const KEY_HINT: &str = "ANTHROPIC_API_KEY not set. Create a key at https://console.anthropic.com/";

/// Anthropic messages backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicBackend {
    /// Create a backend using ANTHROPIC_API_KEY from the environment.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: env_first(&["ANTHROPIC_API_KEY"]),
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

    fn build_request(&self, request: &ProviderRequest) -> Result<MessagesRequest, ProviderError> {
        let mut content = Vec::with_capacity(2);
        if let Some(image) = &request.image {
            let (data, mime_type) = encode_image_base64(image)?;
            content.push(ContentBlock::Image {
                source: ImageSource {
                    source_type: "base64",
                    media_type: mime_type.to_string(),
                    data,
                },
            });
        }
        let prompt = request.user_prompt.trim();
        if !prompt.is_empty() {
            content.push(ContentBlock::Text {
                text: prompt.to_string(),
            });
        }
        if content.is_empty() {
            return Err(ProviderError::InvalidInput(
                "Anthropic request has neither prompt nor image".to_string(),
            ));
        }

        Ok(MessagesRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system_prompt.clone(),
            temperature: request.temperature,
            messages: vec![Message {
                role: "user",
                content,
            }],
        })
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            KEY_HINT.to_string()
        } else {
            format!("Anthropic is available ({})", self.endpoint)
        }
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let api_key = require_key(BackendKind::Anthropic, &self.api_key, KEY_HINT)?;
        let body = self.build_request(request)?;
        let url = format!("{}/v1/messages", self.endpoint);

        debug!("Anthropic request: model={}", request.model);
        let response = retry_on_rate_limit(BackendKind::Anthropic, || {
            self.client
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
        })
        .await?;
        let response = ensure_success(BackendKind::Anthropic, response).await?;

        let parsed: MessagesResponse = response.json().await?;
        Ok(parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .find_map(|b| b.text)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            system_prompt: "You translate.".to_string(),
            user_prompt: "Text to translate:\n\nBonjour".to_string(),
            temperature: 0.2,
            max_tokens: 1500,
            image: None,
        }
    }

    #[tokio::test]
    async fn test_messages_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-sonnet-4-20250514",
                "system": "You translate.",
                "max_tokens": 1500
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "Translation: Hello"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new(reqwest::Client::new())
            .with_api_key("ak-test")
            .with_endpoint(server.uri());
        assert_eq!(
            backend.complete(&request()).await.unwrap(),
            "Translation: Hello"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "ok"}]
            })))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new(reqwest::Client::new())
            .with_api_key("ak-test")
            .with_endpoint(server.uri());
        assert_eq!(backend.complete(&request()).await.unwrap(), "ok");
    }

    #[test]
    fn test_image_block_precedes_prompt() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = dir.path().join("page.jpg");
        std::fs::write(&image, [0xffu8, 0xd8]).unwrap();

        let backend = AnthropicBackend::new(reqwest::Client::new());
        let mut req = request();
        req.image = Some(image);
        let json = serde_json::to_value(backend.build_request(&req).unwrap()).unwrap();
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["type"], "text");
    }
}
