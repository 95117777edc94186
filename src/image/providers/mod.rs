//! Image generation providers.

#[cfg(feature = "fal-image")]
mod fal;
#[cfg(feature = "stability-image")]
mod stability;

#[cfg(feature = "fal-image")]
pub use fal::{flux_image_size, flux_model_path, FluxProvider, FluxProviderBuilder, FAL_QUEUE_URL};

#[cfg(feature = "stability-image")]
pub use stability::{StabilityProvider, StabilityProviderBuilder, STABILITY_API_URL};
