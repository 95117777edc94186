//! Model-to-provider registry.

use crate::config::Config;
use crate::error::{GenStudioError, Result};
use crate::image::{ImageProvider, ImageProviderKind, ModelId};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each model identifier to the provider that serves it.
///
/// Providers that could not be built for lack of a credential are remembered
/// so lookups can report which variable to set.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ModelId, Arc<dyn ImageProvider>>,
    missing: HashMap<ImageProviderKind, &'static str>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("models", &self.models())
            .field("missing", &self.missing)
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` for every model it serves, replacing earlier entries.
    pub fn register(&mut self, provider: Arc<dyn ImageProvider>) -> &mut Self {
        self.missing.remove(&provider.kind());
        for model in provider.models() {
            self.providers.insert(*model, Arc::clone(&provider));
        }
        self
    }

    /// Records that `kind` is unavailable until `env_var` is set.
    pub fn mark_missing(&mut self, kind: ImageProviderKind, env_var: &'static str) -> &mut Self {
        self.missing.insert(kind, env_var);
        self
    }

    /// Builds every compiled-in provider whose credential resolves.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "stability-image")]
        {
            let mut builder = crate::image::providers::StabilityProvider::builder();
            if let Some(key) = &config.stability_api_key {
                builder = builder.api_key(key.clone());
            }
            if let Some(endpoint) = &config.stability_endpoint {
                builder = builder.endpoint(endpoint.clone());
            }
            registry.register_built(ImageProviderKind::Stability, builder.build());
        }

        #[cfg(feature = "fal-image")]
        {
            let mut builder = crate::image::providers::FluxProvider::builder()
                .poll_interval(config.poll_interval())
                .timeout(config.timeout());
            if let Some(key) = &config.fal_api_key {
                builder = builder.api_key(key.clone());
            }
            if let Some(url) = &config.fal_queue_url {
                builder = builder.queue_url(url.clone());
            }
            registry.register_built(ImageProviderKind::Fal, builder.build());
        }

        #[cfg(not(all(feature = "stability-image", feature = "fal-image")))]
        let _ = config;

        registry
    }

    #[allow(dead_code)]
    fn register_built<P>(&mut self, kind: ImageProviderKind, built: Result<P>)
    where
        P: ImageProvider + 'static,
    {
        match built {
            Ok(provider) => {
                self.register(Arc::new(provider));
            }
            Err(GenStudioError::MissingCredential { env_var, .. }) => {
                tracing::debug!(provider = %kind, env_var, "provider credential not set");
                self.mark_missing(kind, env_var);
            }
            Err(e) => {
                tracing::warn!(provider = %kind, "provider unavailable: {e}");
            }
        }
    }

    /// Returns the provider registered for `model`.
    pub fn resolve(&self, model: ModelId) -> Result<Arc<dyn ImageProvider>> {
        if let Some(provider) = self.providers.get(&model) {
            return Ok(Arc::clone(provider));
        }
        let kind = model.provider();
        match self.missing.get(&kind) {
            Some(env_var) => Err(GenStudioError::MissingCredential {
                provider: kind.display_name(),
                env_var,
            }),
            None => Err(GenStudioError::ProviderNotAvailable(format!(
                "{} ({})",
                kind.display_name(),
                model
            ))),
        }
    }

    /// Returns true if `model` can be dispatched.
    pub fn is_available(&self, model: ModelId) -> bool {
        self.providers.contains_key(&model)
    }

    /// Registered models in declaration order.
    pub fn models(&self) -> Vec<ModelId> {
        ModelId::ALL
            .iter()
            .copied()
            .filter(|model| self.providers.contains_key(model))
            .collect()
    }
}
