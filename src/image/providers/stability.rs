//! Stability AI image generation provider (Stable Diffusion 3 / 3.5).

use crate::error::{parse_retry_after, sanitize_error_message, GenStudioError, Result};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProviderKind,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;

/// Stable Image generate endpoint serving the SD3 family.
pub const STABILITY_API_URL: &str = "https://api.stability.ai/v2beta/stable-image/generate/sd3";

/// Builder for [`StabilityProvider`].
#[derive(Debug, Clone)]
pub struct StabilityProviderBuilder {
    api_key: Option<String>,
    endpoint: String,
}

impl Default for StabilityProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: STABILITY_API_URL.to_string(),
        }
    }
}

impl StabilityProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `STABILITY_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the generate endpoint.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    /// Builds the provider, resolving credentials.
    pub fn build(self) -> Result<StabilityProvider> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("STABILITY_API_KEY").ok())
            .filter(|key| !key.is_empty())
            .ok_or(GenStudioError::MissingCredential {
                provider: "Stability AI",
                env_var: "STABILITY_API_KEY",
            })?;

        Ok(StabilityProvider {
            client: reqwest::Client::new(),
            api_key,
            endpoint: self.endpoint,
        })
    }
}

/// Stability AI image generation provider.
///
/// Sends one multipart/form-data request per image and receives the raw
/// image bytes in the response body (`accept: image/*`).
pub struct StabilityProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl StabilityProvider {
    /// Creates a new [`StabilityProviderBuilder`].
    pub fn builder() -> StabilityProviderBuilder {
        StabilityProviderBuilder::new()
    }

    fn build_form(request: &GenerationRequest) -> reqwest::multipart::Form {
        reqwest::multipart::Form::new()
            .text("prompt", request.prompt.clone())
            .text("model", request.model.as_str())
            .text("output_format", request.format.output_format())
            .text("aspect_ratio", request.aspect_ratio.as_str())
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> GenStudioError {
        let message = serde_json::from_str::<StabilityErrorResponse>(text)
            .map(|error_resp| error_resp.message())
            .ok()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| text.to_string());
        let message = sanitize_error_message(&message);

        if status == 429 {
            return GenStudioError::RateLimited {
                retry_after: parse_retry_after(headers),
            };
        }
        if message.contains("content_moderation") {
            return GenStudioError::ContentBlocked(message);
        }
        if status == 401 || status == 403 {
            return GenStudioError::Auth(message);
        }
        GenStudioError::Api { status, message }
    }
}

#[async_trait]
impl ImageProvider for StabilityProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        if request.model.provider() != ImageProviderKind::Stability {
            return Err(GenStudioError::InvalidRequest(format!(
                "{} is not a Stability model",
                request.model
            )));
        }

        let start = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("accept", "image/*")
            .multipart(Self::build_form(request))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 200 {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text, &headers));
        }

        let seed = response
            .headers()
            .get("seed")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let data = response.bytes().await?.to_vec();
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %request.model,
            size_bytes = data.len(),
            duration_ms,
            "stability generation complete"
        );

        let format = ImageFormat::from_magic_bytes(&data).unwrap_or(request.format);

        Ok(GeneratedImage::new(
            data,
            format,
            ImageProviderKind::Stability,
            GenerationMetadata {
                model: Some(request.model.as_str().to_string()),
                seed,
                duration_ms: Some(duration_ms),
            },
        ))
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::Stability
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(GenStudioError::Auth("STABILITY_API_KEY is empty".into()));
        }
        Ok(())
    }
}

/// Error body returned by the Stable Image API.
#[derive(Debug, Deserialize)]
struct StabilityErrorResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

impl StabilityErrorResponse {
    fn message(&self) -> String {
        let detail = self.errors.join("; ");
        match (&self.name, detail.is_empty()) {
            (Some(name), false) => format!("{name}: {detail}"),
            (Some(name), true) => name.clone(),
            (None, _) => detail,
        }
    }
}
