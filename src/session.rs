//! Primary + comparison generation runs with progress events.

use crate::dispatch::Dispatcher;
use crate::error::{GenStudioError, Result};
use crate::image::{AspectRatio, GenerationRequest, ImageFormat, ModelId};
use crate::store::StoredImage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Which side of a comparison a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// The primary model.
    Primary,
    /// The comparison model.
    Comparison,
}

/// Lifecycle notifications for subscribers (e.g. a front-end).
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// A request was handed to its provider.
    Started {
        /// Comparison side.
        slot: Slot,
        /// Model being generated with.
        model: ModelId,
    },
    /// The image was generated and stored.
    Completed {
        /// Comparison side.
        slot: Slot,
        /// Stored result.
        image: StoredImage,
    },
    /// The request failed; nothing was stored for this slot.
    Failed {
        /// Comparison side.
        slot: Slot,
        /// Model that failed.
        model: ModelId,
        /// User-facing error message.
        message: String,
    },
}

/// One user action: a prompt, a primary model and an optional comparison model.
#[derive(Debug, Clone)]
pub struct ComparisonPlan {
    /// Prompt shared by both requests.
    pub prompt: String,
    /// Aspect ratio shared by both requests.
    pub aspect_ratio: AspectRatio,
    /// Format requested from providers that accept one.
    pub format: ImageFormat,
    /// Primary model.
    pub primary: ModelId,
    /// Comparison model, when comparison mode is on.
    pub comparison: Option<ModelId>,
    /// Run both requests at once instead of one after the other.
    pub concurrent: bool,
}

impl ComparisonPlan {
    /// Single-model plan with default ratio and format.
    pub fn new(prompt: impl Into<String>, primary: ModelId) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::default(),
            format: ImageFormat::default(),
            primary,
            comparison: None,
            concurrent: false,
        }
    }

    /// Enables comparison mode with `model`.
    pub fn compare_with(mut self, model: ModelId) -> Self {
        self.comparison = Some(model);
        self
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Runs both requests concurrently.
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    fn models(&self) -> Vec<ModelId> {
        std::iter::once(self.primary).chain(self.comparison).collect()
    }

    fn request(&self, model: ModelId) -> GenerationRequest {
        GenerationRequest::new(self.prompt.clone(), model)
            .with_aspect_ratio(self.aspect_ratio)
            .with_format(self.format)
    }
}

/// Per-slot results. A failure on one side leaves the other untouched.
#[derive(Debug)]
pub struct ComparisonOutcome {
    /// Primary result.
    pub primary: Result<StoredImage>,
    /// Comparison result, when comparison mode was on.
    pub comparison: Option<Result<StoredImage>>,
}

impl ComparisonOutcome {
    /// Successfully stored images, primary first.
    pub fn stored(&self) -> Vec<&StoredImage> {
        std::iter::once(&self.primary)
            .chain(self.comparison.iter())
            .filter_map(|result| result.as_ref().ok())
            .collect()
    }

    /// True when no request produced an image.
    pub fn all_failed(&self) -> bool {
        self.stored().is_empty()
    }
}

/// Runs comparison plans against a shared dispatcher.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    dispatcher: Arc<Dispatcher>,
    events: Option<UnboundedSender<GenerationEvent>>,
}

impl GenerationSession {
    /// Creates a session without an event subscriber.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            events: None,
        }
    }

    /// Publishes lifecycle events to `sender`.
    pub fn with_events(mut self, sender: UnboundedSender<GenerationEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Validates the plan, then runs each request as its own task.
    ///
    /// An empty prompt or a missing credential for either model fails the
    /// whole plan before any provider is contacted. After that, per-request
    /// failures are reported in the outcome instead of as an error.
    pub async fn run(&self, plan: &ComparisonPlan) -> Result<ComparisonOutcome> {
        if plan.prompt.trim().is_empty() {
            return Err(GenStudioError::EmptyPrompt);
        }
        self.dispatcher.preflight(&plan.models())?;

        let primary = self.spawn(Slot::Primary, plan.request(plan.primary));

        let outcome = match plan.comparison {
            None => ComparisonOutcome {
                primary: Self::join(primary).await,
                comparison: None,
            },
            Some(model) if plan.concurrent => {
                let comparison = self.spawn(Slot::Comparison, plan.request(model));
                let (primary, comparison) = tokio::join!(Self::join(primary), Self::join(comparison));
                ComparisonOutcome {
                    primary,
                    comparison: Some(comparison),
                }
            }
            Some(model) => {
                let primary = Self::join(primary).await;
                let comparison = Self::join(self.spawn(Slot::Comparison, plan.request(model))).await;
                ComparisonOutcome {
                    primary,
                    comparison: Some(comparison),
                }
            }
        };

        Ok(outcome)
    }

    fn spawn(
        &self,
        slot: Slot,
        request: GenerationRequest,
    ) -> tokio::task::JoinHandle<Result<StoredImage>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let events = self.events.clone();

        tokio::spawn(async move {
            let model = request.model;
            emit(&events, GenerationEvent::Started { slot, model });

            let result = dispatcher.dispatch(&request).await;
            match &result {
                Ok(image) => {
                    tracing::info!(?slot, %model, path = %image.path.display(), "image stored");
                    emit(
                        &events,
                        GenerationEvent::Completed {
                            slot,
                            image: image.clone(),
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(?slot, %model, "generation failed: {e}");
                    emit(
                        &events,
                        GenerationEvent::Failed {
                            slot,
                            model,
                            message: e.to_string(),
                        },
                    );
                }
            }
            result
        })
    }

    async fn join(handle: tokio::task::JoinHandle<Result<StoredImage>>) -> Result<StoredImage> {
        handle.await.map_err(|e| {
            GenStudioError::UpstreamJob(format!("generation task did not finish: {e}"))
        })?
    }
}

fn emit(events: &Option<UnboundedSender<GenerationEvent>>, event: GenerationEvent) {
    if let Some(sender) = events {
        // A dropped subscriber only stops notifications
        let _ = sender.send(event);
    }
}
