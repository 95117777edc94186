#![warn(missing_docs)]
//! GenStudio - text-to-image generation across Stability AI and Flux (fal.ai).
//!
//! A prompt is dispatched to the provider serving the selected model, the
//! returned bytes are written to the output directory under a unique name,
//! and the gallery lists everything generated so far. An optional second
//! model runs the same prompt for side-by-side comparison.
//!
//! # Quick Start
//!
//! ```no_run
//! use genstudio::{Config, Dispatcher, GenerationRequest, ImageStore, ModelId, ProviderRegistry};
//!
//! #[tokio::main]
//! async fn main() -> genstudio::Result<()> {
//!     let config = Config::load(None)?;
//!     let registry = ProviderRegistry::from_config(&config);
//!     let dispatcher = Dispatcher::new(registry, ImageStore::open(config.output_dir.clone())?);
//!
//!     let request = GenerationRequest::new("A lighthouse at dusk", ModelId::FluxDev);
//!     let stored = dispatcher.dispatch(&request).await?;
//!     println!("saved {}", stored.path.display());
//!     Ok(())
//! }
//! ```
//!
//! # Comparison
//!
//! ```no_run
//! use genstudio::{ComparisonPlan, Dispatcher, GenerationSession, ModelId};
//! use std::sync::Arc;
//!
//! # async fn run(dispatcher: Dispatcher) -> genstudio::Result<()> {
//! let session = GenerationSession::new(Arc::new(dispatcher));
//! let plan = ComparisonPlan::new("A lighthouse at dusk", ModelId::Sd35Large)
//!     .compare_with(ModelId::Flux11Pro);
//! let outcome = session.run(&plan).await?;
//! for image in outcome.stored() {
//!     println!("{} -> {}", image.model, image.path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `stability-image`: Stability AI (Stable Diffusion 3 / 3.5)
//! - `fal-image`: Flux via the fal.ai queue
//! - `image`: Both providers
//! - `cli`: Command-line interface

mod error;

pub mod config;
pub mod dispatch;
pub mod gallery;
pub mod image;
pub mod registry;
pub mod session;
pub mod store;

// Re-export error types at crate root
pub use error::{GenStudioError, Result};

pub use config::{Config, ThemeMode};
pub use dispatch::Dispatcher;
pub use gallery::{GalleryEntry, Manifest, ManifestRecord};
pub use image::{
    AspectRatio, GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProvider,
    ImageProviderKind, ModelId,
};
pub use registry::ProviderRegistry;
pub use session::{ComparisonOutcome, ComparisonPlan, GenerationEvent, GenerationSession, Slot};
pub use store::{ImageStore, StoredImage};

#[cfg(feature = "stability-image")]
pub use image::providers::{StabilityProvider, StabilityProviderBuilder};

#[cfg(feature = "fal-image")]
pub use image::providers::{FluxProvider, FluxProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{GenStudioError, Result};
    pub use crate::image::{GeneratedImage, GenerationRequest, ImageProvider, ModelId};
    pub use crate::{ComparisonPlan, Dispatcher, GenerationSession, ProviderRegistry};

    #[cfg(feature = "stability-image")]
    pub use crate::image::providers::StabilityProvider;

    #[cfg(feature = "fal-image")]
    pub use crate::image::providers::FluxProvider;
}
