//! Image provider trait.

use crate::error::Result;
use crate::image::types::{GeneratedImage, GenerationRequest, ImageProviderKind, ModelId};
use async_trait::async_trait;

/// Trait for image generation providers.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generates an image from the given request.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage>;

    /// Returns the kind of this provider.
    fn kind(&self) -> ImageProviderKind;

    /// Models this provider can serve.
    fn models(&self) -> &'static [ModelId] {
        self.kind().models()
    }

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        self.kind().display_name()
    }

    /// Checks if the provider is configured well enough to be called.
    async fn health_check(&self) -> Result<()>;
}
