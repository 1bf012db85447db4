//! Google Document AI OCR backend.
//!
//! Document AI is promptless: it takes an image and returns the recognized
//! text. Configured through:
//! - `DOCUMENTAI_PROJECT_ID`
//! - `DOCUMENTAI_LOCATION` (default `us`)
//! - `DOCUMENTAI_PROCESSOR_ID` (default `general`)
//! - `DOCUMENTAI_ACCESS_TOKEN` (OAuth bearer token)

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::api::{encode_image_base64, ensure_success, env_first, retry_on_rate_limit};
use super::{BackendKind, Provider, ProviderError, ProviderRequest};

const KEY_HINT: &str =
    "DOCUMENTAI_PROJECT_ID and DOCUMENTAI_ACCESS_TOKEN must be set (see `gcloud auth print-access-token`)";

/// Document AI processor backend.
pub struct DocumentAiBackend {
    client: reqwest::Client,
    project_id: Option<String>,
    location: String,
    processor_id: String,
    access_token: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    text: String,
}

impl DocumentAiBackend {
    /// Create a backend configured from the environment.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            project_id: env_first(&["DOCUMENTAI_PROJECT_ID"]),
            location: env_first(&["DOCUMENTAI_LOCATION"]).unwrap_or_else(|| "us".to_string()),
            processor_id: env_first(&["DOCUMENTAI_PROCESSOR_ID"])
                .unwrap_or_else(|| "general".to_string()),
            access_token: env_first(&["DOCUMENTAI_ACCESS_TOKEN"]),
            endpoint: None,
        }
    }

    /// Set the project, location and processor explicitly.
    pub fn with_processor(
        mut self,
        project_id: impl Into<String>,
        location: impl Into<String>,
        processor_id: impl Into<String>,
    ) -> Self {
        self.project_id = Some(project_id.into());
        self.location = location.into();
        self.processor_id = processor_id.into();
        self
    }

    /// Set the OAuth access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Override the regional endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    fn base_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}-documentai.googleapis.com", self.location))
    }

    fn credentials(&self) -> Result<(&str, &str), ProviderError> {
        match (self.project_id.as_deref(), self.access_token.as_deref()) {
            (Some(project), Some(token)) => Ok((project, token)),
            _ => Err(ProviderError::NotConfigured {
                backend: BackendKind::DocumentAi,
                hint: KEY_HINT.to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl Provider for DocumentAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DocumentAi
    }

    fn is_available(&self) -> bool {
        self.credentials().is_ok()
    }

    fn availability_hint(&self) -> String {
        match &self.project_id {
            Some(project) if self.access_token.is_some() => format!(
                "Document AI is available (projects/{}/locations/{}/processors/{})",
                project, self.location, self.processor_id
            ),
            _ => KEY_HINT.to_string(),
        }
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let (project, token) = self.credentials()?;
        let image = request.image.as_ref().ok_or_else(|| {
            ProviderError::InvalidInput("Document AI requires an image to process".to_string())
        })?;
        if !image.exists() {
            return Err(ProviderError::InvalidInput(format!(
                "Image file not found: {}",
                image.display()
            )));
        }

        let (content, mime_type) = encode_image_base64(image)?;
        let body = ProcessRequest {
            raw_document: RawDocument {
                content,
                mime_type: mime_type.to_string(),
            },
        };
        let url = format!(
            "{}/v1/projects/{}/locations/{}/processors/{}:process",
            self.base_url(),
            project,
            self.location,
            self.processor_id
        );

        debug!("Document AI request: {}", image.display());
        let response = retry_on_rate_limit(BackendKind::DocumentAi, || {
            self.client.post(&url).bearer_auth(token).json(&body).send()
        })
        .await?;
        let response = ensure_success(BackendKind::DocumentAi, response).await?;

        let parsed: ProcessResponse = response.json().await?;
        Ok(parsed.document.map(|d| d.text).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(image: Option<PathBuf>) -> ProviderRequest {
        ProviderRequest {
            model: "document_ai_ocr".to_string(),
            system_prompt: String::new(),
            user_prompt: String::new(),
            temperature: 0.0,
            max_tokens: 1500,
            image,
        }
    }

    fn backend(uri: &str) -> DocumentAiBackend {
        DocumentAiBackend::new(reqwest::Client::new())
            .with_processor("proj", "eu", "abc123")
            .with_access_token("ya29.token")
            .with_endpoint(uri)
    }

    #[tokio::test]
    async fn test_process_returns_document_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1/projects/proj/locations/eu/processors/abc123:process",
            ))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "document": {"text": "Line one   \n\nLine two"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let image = dir.path().join("0001_p001.jpg");
        std::fs::write(&image, [0xffu8, 0xd8]).unwrap();

        let text = backend(&server.uri())
            .complete(&request(Some(image)))
            .await
            .unwrap();
        assert_eq!(text, "Line one   \n\nLine two");
    }

    #[tokio::test]
    async fn test_text_input_is_rejected() {
        let err = backend("http://127.0.0.1:9")
            .complete(&request(None))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_default_regional_endpoint() {
        let backend = DocumentAiBackend::new(reqwest::Client::new()).with_processor("p", "eu", "x");
        assert_eq!(backend.base_url(), "https://eu-documentai.googleapis.com");
    }
}
