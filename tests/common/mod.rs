//! Mock upstreams shared by the integration tests.

#![allow(dead_code)]

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STABILITY_PATH: &str = "/v2beta/stable-image/generate/sd3";

/// A tiny payload with a PNG signature.
pub fn png_bytes() -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(b"stability pixels");
    data
}

/// A tiny payload with a JPEG signature.
pub fn jpeg_bytes() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(b"flux pixels");
    data
}

pub async fn mount_stability_success(server: &MockServer, body: Vec<u8>) {
    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("accept", "image/*"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .insert_header("content-type", "image/png")
                .insert_header("seed", "1234"),
        )
        .mount(server)
        .await;
}

pub async fn mount_stability_error(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "name": "bad_request",
            "errors": ["prompt: too long"]
        })))
        .mount(server)
        .await;
}

/// Mounts submit, status, result and download for one fal.ai job.
///
/// `statuses` are served in order by the status endpoint; the last one keeps
/// answering once the earlier ones are used up.
pub async fn mount_fal_job(server: &MockServer, model_path: &str, statuses: &[&str], image: Vec<u8>) {
    let base = server.uri();
    let request_url = format!("{base}/fal-ai/flux/requests/req-123");

    Mock::given(method("POST"))
        .and(path(format!("/{model_path}")))
        .and(header("authorization", "Key fal-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "req-123",
            "status_url": format!("{request_url}/status"),
            "response_url": request_url,
        })))
        .mount(server)
        .await;

    let (last, earlier) = statuses.split_last().expect("at least one status");
    for (index, status) in earlier.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path("/fal-ai/flux/requests/req-123/status"))
            .and(query_param("logs", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": status,
                "queue_position": 0,
                "logs": (0..=index).map(|i| json!({"message": format!("step {i}")})).collect::<Vec<_>>(),
            })))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/req-123/status"))
        .and(query_param("logs", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": last,
            "logs": null,
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/req-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{
                "url": format!("{base}/files/out.jpg"),
                "content_type": "image/jpeg"
            }],
            "seed": 99,
            "has_nsfw_concepts": [false]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/out.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(image))
        .mount(server)
        .await;
}
