//! Flux image generation through the fal.ai queue API.

use crate::error::{sanitize_error_message, GenStudioError, Result};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProviderKind, ModelId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Base URL of the fal.ai queue.
pub const FAL_QUEUE_URL: &str = "https://queue.fal.run";

/// Size preset used when the aspect ratio has no fal.ai equivalent.
const DEFAULT_IMAGE_SIZE: &str = "landscape_4_3";

/// Safety tolerance sent with every job (1 = strictest, 6 = most permissive).
const SAFETY_TOLERANCE: &str = "2";

/// Returns the fal.ai model path for a Flux model.
///
/// Non-Flux models have no fal.ai path.
pub fn flux_model_path(model: ModelId) -> Option<&'static str> {
    match model {
        ModelId::Flux11Pro => Some("fal-ai/flux-pro/v1.1"),
        ModelId::FluxDev => Some("fal-ai/flux/dev"),
        ModelId::FluxSchnell => Some("fal-ai/flux/schnell"),
        _ => None,
    }
}

/// Maps an aspect ratio string to the fal.ai `image_size` preset.
///
/// Total: anything unrecognized becomes `landscape_4_3`.
pub fn flux_image_size(aspect_ratio: &str) -> &'static str {
    match aspect_ratio {
        "1:1" => "square_hd",
        "16:9" => "landscape_16_9",
        "4:3" => "landscape_4_3",
        _ => DEFAULT_IMAGE_SIZE,
    }
}

/// Builder for [`FluxProvider`].
#[derive(Debug, Clone)]
pub struct FluxProviderBuilder {
    api_key: Option<String>,
    queue_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for FluxProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            queue_url: FAL_QUEUE_URL.to_string(),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
        }
    }
}

impl FluxProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `FAL_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the queue base URL.
    pub fn queue_url(mut self, url: impl Into<String>) -> Self {
        self.queue_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the polling interval for the queued job.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum time to wait for the job.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving credentials.
    pub fn build(self) -> Result<FluxProvider> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("FAL_KEY").ok())
            .filter(|key| !key.is_empty())
            .ok_or(GenStudioError::MissingCredential {
                provider: "fal.ai",
                env_var: "FAL_KEY",
            })?;

        Ok(FluxProvider {
            client: reqwest::Client::new(),
            api_key,
            queue_url: self.queue_url,
            poll_interval: self.poll_interval,
            timeout: self.timeout,
        })
    }
}

/// Flux image generation provider backed by fal.ai.
///
/// Submits a job to the fal.ai queue, polls it (forwarding job log lines to
/// `tracing`), fetches the result, and downloads the first image.
pub struct FluxProvider {
    client: reqwest::Client,
    api_key: String,
    queue_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl FluxProvider {
    /// Creates a new [`FluxProviderBuilder`].
    pub fn builder() -> FluxProviderBuilder {
        FluxProviderBuilder::new()
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }

    fn parse_error(&self, status: u16, text: &str) -> GenStudioError {
        let message = serde_json::from_str::<FalErrorResponse>(text)
            .map(|error_resp| match error_resp.detail {
                serde_json::Value::String(detail) => detail,
                other => other.to_string(),
            })
            .unwrap_or_else(|_| text.to_string());
        let message = sanitize_error_message(&message);

        match status {
            401 | 403 => GenStudioError::Auth(message),
            429 => GenStudioError::RateLimited { retry_after: None },
            _ => GenStudioError::Api { status, message },
        }
    }

    /// Submits the job and returns the queue handles.
    ///
    /// fal.ai queues nested model paths under their parent (e.g.
    /// `fal-ai/flux/dev` under `fal-ai/flux`), so the returned status and
    /// response URLs are used as-is instead of being rebuilt.
    async fn submit(&self, model_path: &str, body: &FalImageRequest) -> Result<FalSubmitResponse> {
        let url = format!("{}/{}", self.queue_url, model_path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text));
        }

        Ok(response.json().await?)
    }

    /// Polls the job until it completes, logging each new job log line once.
    async fn poll_until_ready(&self, submit: &FalSubmitResponse) -> Result<()> {
        let start = Instant::now();
        let mut logs_seen = 0usize;

        loop {
            if start.elapsed() > self.timeout {
                return Err(GenStudioError::Timeout(self.timeout));
            }

            let response = self
                .client
                .get(&submit.status_url)
                .query(&[("logs", "1")])
                .header("Authorization", self.auth_header())
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(self.parse_error(status.as_u16(), &text));
            }

            let poll: FalStatusResponse = response.json().await?;

            for log in unseen_logs(&poll.logs, &mut logs_seen) {
                tracing::info!(request_id = %submit.request_id, "{}", log.message);
            }

            match poll.status.as_str() {
                "COMPLETED" => return Ok(()),
                "IN_QUEUE" | "IN_PROGRESS" => {
                    tracing::debug!(
                        request_id = %submit.request_id,
                        status = %poll.status,
                        queue_position = ?poll.queue_position,
                        elapsed_secs = start.elapsed().as_secs(),
                        "polling fal.ai job"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
                other => {
                    return Err(GenStudioError::UpstreamJob(format!(
                        "fal.ai job {} ended with status {}",
                        submit.request_id, other
                    )));
                }
            }
        }
    }

    async fn fetch_result(&self, response_url: &str) -> Result<FalResultResponse> {
        let response = self
            .client
            .get(response_url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text));
        }

        Ok(response.json().await?)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        if status != 200 {
            if status == 403 || status == 410 {
                return Err(GenStudioError::UrlExpired);
            }
            return Err(GenStudioError::Api {
                status,
                message: "Failed to download image".into(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ImageProvider for FluxProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let model_path = flux_model_path(request.model).ok_or_else(|| {
            GenStudioError::InvalidRequest(format!("{} is not a Flux model", request.model))
        })?;

        let start = Instant::now();
        let body = FalImageRequest::from_request(request);

        let submit = self.submit(model_path, &body).await?;
        tracing::debug!(request_id = %submit.request_id, model = model_path, "submitted fal.ai job");

        self.poll_until_ready(&submit).await?;
        tracing::debug!(request_id = %submit.request_id, "fal.ai job complete");

        let result = self.fetch_result(&submit.response_url).await?;

        if result
            .has_nsfw_concepts
            .as_ref()
            .and_then(|flags| flags.first())
            .copied()
            .unwrap_or(false)
        {
            return Err(GenStudioError::ContentBlocked(
                "fal.ai safety checker flagged the image".into(),
            ));
        }

        let image_info = result.images.into_iter().next().ok_or_else(|| {
            GenStudioError::UpstreamJob("fal.ai returned no images".into())
        })?;

        let data = self.download(&image_info.url).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let format = ImageFormat::from_magic_bytes(&data)
            .or_else(|| {
                image_info
                    .content_type
                    .as_deref()
                    .and_then(|ct| ct.strip_prefix("image/"))
                    .and_then(ImageFormat::from_extension)
            })
            .unwrap_or(ImageFormat::Png);

        Ok(GeneratedImage::new(
            data,
            format,
            ImageProviderKind::Fal,
            GenerationMetadata {
                model: Some(request.model.as_str().to_string()),
                seed: result.seed,
                duration_ms: Some(duration_ms),
            },
        ))
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::Fal
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(GenStudioError::Auth("FAL_KEY is empty".into()));
        }
        Ok(())
    }
}

// -- Request types --

#[derive(Debug, Serialize)]
struct FalImageRequest {
    prompt: String,
    image_size: &'static str,
    num_images: u32,
    enable_safety_checker: bool,
    safety_tolerance: &'static str,
}

impl FalImageRequest {
    fn from_request(req: &GenerationRequest) -> Self {
        Self {
            prompt: req.prompt.clone(),
            image_size: flux_image_size(req.aspect_ratio.as_str()),
            num_images: 1,
            enable_safety_checker: true,
            safety_tolerance: SAFETY_TOLERANCE,
        }
    }
}

// -- Response types --

#[derive(Debug, Deserialize)]
struct FalSubmitResponse {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Debug, Deserialize)]
struct FalStatusResponse {
    status: String,
    #[serde(default)]
    queue_position: Option<u32>,
    #[serde(default, deserialize_with = "null_as_empty")]
    logs: Vec<FalLogLine>,
}

#[derive(Debug, Deserialize)]
struct FalLogLine {
    message: String,
}

#[derive(Debug, Deserialize)]
struct FalResultResponse {
    images: Vec<FalImageInfo>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    has_nsfw_concepts: Option<Vec<bool>>,
}

#[derive(Debug, Deserialize)]
struct FalImageInfo {
    url: String,
    #[serde(default)]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FalErrorResponse {
    detail: serde_json::Value,
}

/// Log lines not yet emitted. fal.ai returns the full history on every poll,
/// so `seen` only ever grows.
fn unseen_logs<'a>(logs: &'a [FalLogLine], seen: &mut usize) -> &'a [FalLogLine] {
    let new = logs.get(*seen..).unwrap_or(&[]);
    *seen = (*seen).max(logs.len());
    new
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
