//! Core types for image generation.

use crate::error::{GenStudioError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the value Stability expects in its `output_format` field.
    pub fn output_format(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

impl FromStr for ImageFormat {
    type Err = GenStudioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
            .ok_or_else(|| GenStudioError::InvalidRequest(format!("unsupported format '{s}'")))
    }
}

/// Upstream service an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageProviderKind {
    /// Stability AI Stable Image API.
    Stability,
    /// fal.ai queue API serving Flux models.
    Fal,
}

impl ImageProviderKind {
    /// Environment variable holding this provider's credential.
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Stability => "STABILITY_API_KEY",
            Self::Fal => "FAL_KEY",
        }
    }

    /// Human-readable provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Stability => "Stability AI",
            Self::Fal => "Flux (fal.ai)",
        }
    }

    /// Models served by this provider.
    pub fn models(&self) -> &'static [ModelId] {
        match self {
            Self::Stability => &STABILITY_MODELS,
            Self::Fal => &FLUX_MODELS,
        }
    }
}

impl std::fmt::Display for ImageProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stability => write!(f, "stability"),
            Self::Fal => write!(f, "fal"),
        }
    }
}

/// Supported model identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    /// Stable Diffusion 3.5 Large.
    #[serde(rename = "sd3.5-large")]
    Sd35Large,
    /// Stable Diffusion 3.5 Large Turbo.
    #[serde(rename = "sd3.5-large-turbo")]
    Sd35LargeTurbo,
    /// Stable Diffusion 3 Large.
    #[serde(rename = "sd3-large")]
    Sd3Large,
    /// Stable Diffusion 3 Large Turbo.
    #[serde(rename = "sd3-large-turbo")]
    Sd3LargeTurbo,
    /// Stable Diffusion 3 Medium.
    #[serde(rename = "sd3-medium")]
    Sd3Medium,
    /// Flux 1.1 Pro.
    #[serde(rename = "flux-1.1-pro")]
    Flux11Pro,
    /// Flux Dev.
    #[serde(rename = "flux-dev")]
    FluxDev,
    /// Flux Schnell.
    #[serde(rename = "flux-schnell")]
    FluxSchnell,
}

const STABILITY_MODELS: [ModelId; 5] = [
    ModelId::Sd35Large,
    ModelId::Sd35LargeTurbo,
    ModelId::Sd3Large,
    ModelId::Sd3LargeTurbo,
    ModelId::Sd3Medium,
];

const FLUX_MODELS: [ModelId; 3] = [ModelId::Flux11Pro, ModelId::FluxDev, ModelId::FluxSchnell];

impl ModelId {
    /// Every supported model, Stability models first.
    pub const ALL: [ModelId; 8] = [
        ModelId::Sd35Large,
        ModelId::Sd35LargeTurbo,
        ModelId::Sd3Large,
        ModelId::Sd3LargeTurbo,
        ModelId::Sd3Medium,
        ModelId::Flux11Pro,
        ModelId::FluxDev,
        ModelId::FluxSchnell,
    ];

    /// Returns the caller-facing identifier (e.g., "flux-dev").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sd35Large => "sd3.5-large",
            Self::Sd35LargeTurbo => "sd3.5-large-turbo",
            Self::Sd3Large => "sd3-large",
            Self::Sd3LargeTurbo => "sd3-large-turbo",
            Self::Sd3Medium => "sd3-medium",
            Self::Flux11Pro => "flux-1.1-pro",
            Self::FluxDev => "flux-dev",
            Self::FluxSchnell => "flux-schnell",
        }
    }

    /// Returns the provider that serves this model.
    pub fn provider(&self) -> ImageProviderKind {
        if self.is_flux() {
            ImageProviderKind::Fal
        } else {
            ImageProviderKind::Stability
        }
    }

    /// Returns true for the Flux models routed to fal.ai.
    pub fn is_flux(&self) -> bool {
        FLUX_MODELS.contains(self)
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = GenStudioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| GenStudioError::UnknownModel(s.to_string()))
    }
}

/// Aspect ratios offered for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1 square aspect ratio.
    #[default]
    #[serde(rename = "1:1")]
    Square,
    /// 16:9 landscape (widescreen) aspect ratio.
    #[serde(rename = "16:9")]
    Landscape,
    /// 4:3 standard landscape aspect ratio.
    #[serde(rename = "4:3")]
    Standard,
}

impl AspectRatio {
    /// Every supported aspect ratio.
    pub const ALL: [AspectRatio; 3] = [Self::Square, Self::Landscape, Self::Standard];

    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Standard => "4:3",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = GenStudioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == s)
            .ok_or_else(|| {
                GenStudioError::InvalidRequest(format!(
                    "invalid aspect ratio '{s}'. Valid values: 1:1, 16:9, 4:3"
                ))
            })
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Seed reported by the provider.
    pub seed: Option<u64>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
}

/// A request to generate one image with one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Model to generate with.
    pub model: ModelId,
    /// Aspect ratio of the output.
    pub aspect_ratio: AspectRatio,
    /// Desired output format.
    pub format: ImageFormat,
}

impl GenerationRequest {
    /// Creates a new request with the default aspect ratio and format.
    pub fn new(prompt: impl Into<String>, model: ModelId) -> Self {
        Self {
            prompt: prompt.into(),
            model,
            aspect_ratio: AspectRatio::default(),
            format: ImageFormat::default(),
        }
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Sets the desired output format.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Rejects prompts that are empty or whitespace only.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(GenStudioError::EmptyPrompt);
        }
        Ok(())
    }
}

/// Image bytes returned by a provider, not yet written to disk.
#[derive(Debug, Clone)]
#[must_use = "generated image should be stored"]
pub struct GeneratedImage {
    /// Raw image bytes, exactly as received from the upstream.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Provider that generated this image.
    pub provider: ImageProviderKind,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(
        data: Vec<u8>,
        format: ImageFormat,
        provider: ImageProviderKind,
        metadata: GenerationMetadata,
    ) -> Self {
        Self {
            data,
            format,
            provider,
            metadata,
        }
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&WEBP_MAGIC),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"short"), None);
    }

    #[test]
    fn test_format_output_format() {
        assert_eq!(ImageFormat::Jpeg.output_format(), "jpeg");
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!("jpeg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert!("gif".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn test_model_parse_and_display() {
        for model in ModelId::ALL {
            assert_eq!(model.as_str().parse::<ModelId>().unwrap(), model);
        }
        assert!(matches!(
            "dall-e-3".parse::<ModelId>(),
            Err(GenStudioError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_model_provider_split() {
        let flux: Vec<_> = ModelId::ALL.iter().filter(|m| m.is_flux()).collect();
        assert_eq!(
            flux,
            vec![&ModelId::Flux11Pro, &ModelId::FluxDev, &ModelId::FluxSchnell]
        );
        assert_eq!(ModelId::Sd3Medium.provider(), ImageProviderKind::Stability);
        assert_eq!(ModelId::FluxSchnell.provider(), ImageProviderKind::Fal);
    }

    #[test]
    fn test_model_serde_uses_identifier() {
        let json = serde_json::to_string(&ModelId::Sd35LargeTurbo).unwrap();
        assert_eq!(json, "\"sd3.5-large-turbo\"");
    }

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert_eq!(AspectRatio::Standard.as_str(), "4:3");
        assert!("21:9".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_request_validate() {
        assert!(GenerationRequest::new("A fox", ModelId::FluxDev)
            .validate()
            .is_ok());
        assert!(matches!(
            GenerationRequest::new("   ", ModelId::FluxDev).validate(),
            Err(GenStudioError::EmptyPrompt)
        ));
    }

    #[test]
    fn test_provider_kind_display() {
        assert_eq!(ImageProviderKind::Stability.to_string(), "stability");
        assert_eq!(ImageProviderKind::Fal.to_string(), "fal");
        assert_eq!(ImageProviderKind::Fal.env_var(), "FAL_KEY");
    }
}
