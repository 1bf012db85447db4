//! Shared infrastructure for HTTP provider backends.
//!
//! Image encoding, rate-limit retries and error-body extraction.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use reqwest::{Response, StatusCode};
use tracing::warn;

use super::{BackendKind, ProviderError};

/// Maximum retry attempts on rate limit (429) errors.
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Read an image file and encode it as base64, returning (base64_data, mime_type).
pub fn encode_image_base64(image_path: &Path) -> Result<(String, &'static str), ProviderError> {
    let image_bytes = std::fs::read(image_path)?;
    let base64_data = base64::engine::general_purpose::STANDARD.encode(&image_bytes);

    let ext = image_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    let mime_type = match ext.as_deref() {
        Some("png") => "image/png",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };

    Ok((base64_data, mime_type))
}

/// Parse Retry-After header value (seconds), capped at one minute.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}

/// Exponential backoff delay for a given attempt, capped at one minute.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(60_000))
}

/// Retry a request on 429 responses, honoring `Retry-After`.
///
/// Returns the first non-429 response.
pub async fn retry_on_rate_limit<F, Fut>(
    backend: BackendKind,
    make_request: F,
) -> Result<Response, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let response = make_request().await?;

        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok());
        let retry_after_secs = retry_after.and_then(|s| s.trim().parse::<u64>().ok());

        if attempt >= MAX_RATE_LIMIT_RETRIES {
            return Err(ProviderError::RateLimited {
                backend,
                retry_after_secs,
            });
        }

        let wait = parse_retry_after(retry_after).unwrap_or_else(|| backoff_delay(attempt, 1000));

        warn!(
            "{} rate limited (attempt {}), waiting {:?}",
            backend,
            attempt + 1,
            wait
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

/// Turn a non-success response into an API error carrying the body.
pub async fn ensure_success(
    backend: BackendKind,
    response: Response,
) -> Result<Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        backend,
        status,
        message,
    })
}

/// Require an API credential, producing a setup hint when missing.
pub fn require_key<'a>(
    backend: BackendKind,
    key: &'a Option<String>,
    hint: &str,
) -> Result<&'a str, ProviderError> {
    key.as_deref().ok_or_else(|| ProviderError::NotConfigured {
        backend,
        hint: hint.to_string(),
    })
}

/// First non-empty environment variable among `keys`.
pub fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}
