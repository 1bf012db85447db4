//! Engine-name routing with validation and retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::cleanup::clean_ocr_text;
use super::{
    AnthropicBackend, BackendKind, DocumentAiBackend, GeminiBackend, OpenAiBackend, Provider,
    ProviderError, ProviderInput, ProviderRequest, SharedProvider,
};
use crate::config::Preset;

const PROMPT_PLACEHOLDER: &str = "{text_to_process}";

const DEFAULT_ATTEMPTS: u32 = 3;
const METADATA_ATTEMPTS: u32 = 5;
const DEFAULT_MAX_TOKENS: u32 = 1500;
const METADATA_MAX_TOKENS: u32 = 2000;
const MAX_TOKENS_CEILING: u32 = 4000;
const MAX_RETRY_TEMPERATURE: f32 = 0.9;

/// One routed call for one page.
#[derive(Debug, Clone, Copy)]
pub struct RouteCall<'a> {
    pub preset: &'a Preset,
    pub input: &'a ProviderInput,
    /// Page index, for logging.
    pub slot: u32,
    /// Metadata calls get more attempts, a larger token budget and a
    /// rising temperature on retries.
    pub metadata: bool,
}

/// Maps engine names to backends and normalizes their output.
///
/// `route` never fails: every error becomes an empty string.
pub struct Router {
    providers: HashMap<BackendKind, SharedProvider>,
    timeout: Duration,
    retry_base: Duration,
}

impl Router {
    /// Create an empty router.
    pub fn new(timeout: Duration, retry_base: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            timeout,
            retry_base,
        }
    }

    /// Router with all four HTTP backends configured from the environment.
    pub fn from_env(client: reqwest::Client, timeout: Duration, retry_base: Duration) -> Self {
        Self::new(timeout, retry_base)
            .with_provider(Arc::new(OpenAiBackend::new(client.clone())))
            .with_provider(Arc::new(AnthropicBackend::new(client.clone())))
            .with_provider(Arc::new(GeminiBackend::new(client.clone())))
            .with_provider(Arc::new(DocumentAiBackend::new(client)))
    }

    /// Register a backend, replacing any previous one of the same kind.
    pub fn with_provider(mut self, provider: SharedProvider) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: SharedProvider) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn provider(&self, kind: BackendKind) -> Option<&SharedProvider> {
        self.providers.get(&kind)
    }

    /// Check that an engine maps to a registered, credentialed backend.
    pub fn check_engine(&self, engine: &str) -> Result<BackendKind, ProviderError> {
        let kind = BackendKind::from_engine(engine).ok_or_else(|| {
            ProviderError::InvalidInput(format!("Unsupported engine: {}", engine))
        })?;
        match self.providers.get(&kind) {
            Some(provider) if provider.is_available() => Ok(kind),
            Some(provider) => Err(ProviderError::NotConfigured {
                backend: kind,
                hint: provider.availability_hint(),
            }),
            None => Err(ProviderError::NotConfigured {
                backend: kind,
                hint: "no backend registered".to_string(),
            }),
        }
    }

    /// Run one call, returning the validated text or an empty string.
    pub async fn route(&self, call: RouteCall<'_>) -> String {
        let kind = match BackendKind::from_engine(&call.preset.model) {
            Some(kind) => kind,
            None => {
                warn!(
                    "Page {}: unsupported engine '{}'",
                    call.slot, call.preset.model
                );
                return String::new();
            }
        };
        let provider = match self.providers.get(&kind) {
            Some(provider) => Arc::clone(provider),
            None => {
                warn!("Page {}: no {} backend registered", call.slot, kind);
                return String::new();
            }
        };

        match tokio::time::timeout(self.timeout, self.run(provider.as_ref(), kind, call)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Page {}: {} call failed: {}", call.slot, kind, e);
                String::new()
            }
            Err(_) => {
                warn!(
                    "Page {}: {} call timed out after {:?}",
                    call.slot, kind, self.timeout
                );
                String::new()
            }
        }
    }

    async fn run(
        &self,
        provider: &dyn Provider,
        kind: BackendKind,
        call: RouteCall<'_>,
    ) -> Result<String, ProviderError> {
        let preset = call.preset;
        let base_tokens = if call.metadata {
            METADATA_MAX_TOKENS
        } else {
            DEFAULT_MAX_TOKENS
        };
        let mut request = ProviderRequest {
            model: preset.model.clone(),
            system_prompt: preset.general_instructions.clone(),
            user_prompt: populate_prompt(&preset.specific_instructions, call.input.text()),
            temperature: preset.temperature,
            max_tokens: base_tokens,
            image: call.input.image().map(|p| p.to_path_buf()),
        };

        if kind == BackendKind::DocumentAi {
            let raw = provider.complete(&request).await?;
            return Ok(clean_ocr_text(&raw));
        }

        let attempts = if call.metadata {
            METADATA_ATTEMPTS
        } else {
            DEFAULT_ATTEMPTS
        };
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = retry_delay(self.retry_base, attempt);
                debug!(
                    "Page {}: retrying {} in {:?} (attempt {}/{})",
                    call.slot,
                    kind,
                    delay,
                    attempt + 1,
                    attempts
                );
                tokio::time::sleep(delay).await;
            }

            let response = match provider.complete(&request).await {
                Ok(response) => response,
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!("Page {}: {} error: {}", call.slot, kind, e);
                    last_error = Some(e);
                    continue;
                }
            };

            match validate_response(&response, &preset.val_text, &preset.required_headers) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    debug!("Page {}: {}", call.slot, e);
                    if call.metadata {
                        request.temperature = (preset.temperature + attempt as f32 * 0.1)
                            .min(MAX_RETRY_TEMPERATURE);
                        if attempt >= 2 {
                            request.max_tokens = (base_tokens + 500).min(MAX_TOKENS_CEILING);
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::Validation("no attempts made".to_string())))
    }
}

/// Substitute page text into a user prompt template.
pub fn populate_prompt(template: &str, text: Option<&str>) -> String {
    template.replace(PROMPT_PLACEHOLDER, text.unwrap_or(""))
}

/// Backoff before retry `attempt` (1-based): `base * 1.5^attempt`.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.mul_f64(1.5f64.powi(attempt as i32))
}

/// Check a raw response and extract the usable portion.
///
/// An empty or `None` marker accepts the whole response. Otherwise the
/// text after the first marker occurrence is returned. When headers are
/// required, each must appear as `Header:` and at least one must carry a
/// value.
pub fn validate_response(
    response: &str,
    val_text: &str,
    required_headers: &[String],
) -> Result<String, ProviderError> {
    if response.trim().is_empty() {
        return Err(ProviderError::Validation("empty response".to_string()));
    }
    let marker = val_text.trim();
    if marker.is_empty() || marker == "None" {
        return Ok(response.to_string());
    }

    let start = response.find(marker).ok_or_else(|| {
        ProviderError::Validation(format!("response is missing '{}'", marker))
    })?;
    let body = response[start + marker.len()..].trim();

    if !required_headers.is_empty() {
        let missing: Vec<&str> = required_headers
            .iter()
            .map(String::as_str)
            .filter(|h| !body.contains(&format!("{}:", h)))
            .collect();
        if !missing.is_empty() {
            return Err(ProviderError::Validation(format!(
                "missing headers: {}",
                missing.join(", ")
            )));
        }
        let any_filled = body.lines().any(|line| {
            required_headers.iter().any(|h| {
                line.trim()
                    .strip_prefix(h.as_str())
                    .and_then(|rest| rest.strip_prefix(':'))
                    .is_some_and(|value| !value.trim().is_empty())
            })
        });
        if !any_filled {
            return Err(ProviderError::Validation(
                "all required headers are empty".to_string(),
            ));
        }
    }

    Ok(body.to_string())
}
