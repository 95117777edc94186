#![cfg(feature = "fal-image")]

mod common;

use common::{jpeg_bytes, mount_fal_job};
use genstudio::{
    gallery, Dispatcher, FluxProvider, GenStudioError, GenerationRequest, ImageFormat,
    ImageProvider, ImageStore, ModelId, ProviderRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> FluxProvider {
    FluxProvider::builder()
        .api_key("fal-test")
        .queue_url(server.uri())
        .poll_interval(Duration::from_millis(10))
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_queue_flow_writes_downloaded_bytes() {
    let server = MockServer::start().await;
    mount_fal_job(
        &server,
        "fal-ai/flux/dev",
        &["IN_QUEUE", "IN_PROGRESS", "COMPLETED"],
        jpeg_bytes(),
    )
    .await;
    let temp = tempfile::tempdir().unwrap();

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(provider(&server)));
    let dispatcher = Dispatcher::new(registry, ImageStore::open(temp.path()).unwrap());

    let stored = dispatcher
        .dispatch(&GenerationRequest::new("A koi pond", ModelId::FluxDev))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&stored.path).unwrap(), jpeg_bytes());
    assert!(stored.path.to_string_lossy().ends_with("_flux-dev.jpg"));

    let entries = gallery::load(temp.path()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].model.as_deref(), Some("flux-dev"));
    assert_eq!(entries[0].prompt.as_deref(), Some("A koi pond"));
}

#[tokio::test]
async fn test_submit_body_uses_image_size() {
    let server = MockServer::start().await;
    mount_fal_job(&server, "fal-ai/flux-pro/v1.1", &["COMPLETED"], jpeg_bytes()).await;

    let request = GenerationRequest::new("A koi pond", ModelId::Flux11Pro)
        .with_aspect_ratio("16:9".parse().unwrap());
    let image = provider(&server).generate(&request).await.unwrap();

    assert_eq!(image.format, ImageFormat::Jpeg);
    assert_eq!(image.metadata.seed, Some(99));

    let requests = server.received_requests().await.unwrap();
    let submit: serde_json::Value = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .unwrap();
    assert_eq!(submit["prompt"], "A koi pond");
    assert_eq!(submit["image_size"], "landscape_16_9");
    assert_eq!(submit["num_images"], 1);
    assert_eq!(submit["enable_safety_checker"], true);
}

#[tokio::test]
async fn test_failed_job_is_upstream_error() {
    let server = MockServer::start().await;
    mount_fal_job(&server, "fal-ai/flux/schnell", &["IN_PROGRESS", "FAILED"], jpeg_bytes()).await;
    let temp = tempfile::tempdir().unwrap();

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(provider(&server)));
    let dispatcher = Dispatcher::new(registry, ImageStore::open(temp.path()).unwrap());

    let result = dispatcher
        .dispatch(&GenerationRequest::new("A koi pond", ModelId::FluxSchnell))
        .await;

    assert!(matches!(result, Err(GenStudioError::UpstreamJob(_))));
    assert!(gallery::load(temp.path()).unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(serde_json::json!({"detail": "bad prompt"})),
        )
        .mount(&server)
        .await;

    let result = provider(&server)
        .generate(&GenerationRequest::new("A koi pond", ModelId::FluxDev))
        .await;

    match result {
        Err(GenStudioError::Api { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "bad prompt");
        }
        other => panic!("Expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expired_download_url() {
    let server = MockServer::start().await;
    // Mounted first so it takes precedence over the job's download mock.
    Mock::given(method("GET"))
        .and(path("/files/out.jpg"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;
    mount_fal_job(&server, "fal-ai/flux/dev", &["COMPLETED"], jpeg_bytes()).await;

    let result = provider(&server)
        .generate(&GenerationRequest::new("A koi pond", ModelId::FluxDev))
        .await;

    assert!(matches!(result, Err(GenStudioError::UrlExpired)));
}

#[tokio::test]
async fn test_stability_model_rejected_without_request() {
    let server = MockServer::start().await;

    let result = provider(&server)
        .generate(&GenerationRequest::new("A koi pond", ModelId::Sd3Medium))
        .await;

    assert!(matches!(result, Err(GenStudioError::InvalidRequest(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}
