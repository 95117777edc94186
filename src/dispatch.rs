//! Routes generation requests to providers and stores the results.

use crate::error::Result;
use crate::image::{GenerationRequest, ModelId};
use crate::registry::ProviderRegistry;
use crate::store::{ImageStore, StoredImage};

/// Sends a request to the provider registered for its model and persists
/// the returned image.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: ProviderRegistry,
    store: ImageStore,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry` writing into `store`.
    pub fn new(registry: ProviderRegistry, store: ImageStore) -> Self {
        Self { registry, store }
    }

    /// Checks that every model has a usable provider without contacting any.
    pub fn preflight(&self, models: &[ModelId]) -> Result<()> {
        for model in models {
            self.registry.resolve(*model)?;
        }
        Ok(())
    }

    /// Generates one image and writes it to the store.
    ///
    /// Nothing is written unless the provider returns an image.
    pub async fn dispatch(&self, request: &GenerationRequest) -> Result<StoredImage> {
        request.validate()?;
        let provider = self.registry.resolve(request.model)?;

        tracing::debug!(
            model = %request.model,
            provider = provider.name(),
            aspect_ratio = %request.aspect_ratio,
            "dispatching generation"
        );

        let image = provider.generate(request).await?;
        self.store.save(&image, request)
    }
}
