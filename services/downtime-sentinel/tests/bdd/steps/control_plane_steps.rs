//! BDD step definitions for control plane feature

use axum::body::Body;
use axum::http::Request;
use cucumber::{then, when};
use tower::ServiceExt;

use crate::world::{DowntimeWorld, API_KEY};

async fn send(world: &mut DowntimeWorld, request: Request<Body>) {
    let router = world.sentinel().await.control_plane();
    let response = router.oneshot(request).await.unwrap();
    world.response_status = Some(response.status().as_u16());

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    world.response_body = serde_json::from_slice(&body).ok();
}

fn send_message_request(key: Option<&str>, phone: &str, message: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/send-message")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    let body = serde_json::json!({ "phoneNumber": phone, "message": message });
    builder.body(Body::from(body.to_string())).unwrap()
}

#[when(expr = "I GET {string}")]
async fn get(world: &mut DowntimeWorld, uri: String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(world, request).await;
}

#[when(expr = "I POST to {string} without a key with phone {string} and message {string}")]
async fn post_without_key(world: &mut DowntimeWorld, uri: String, phone: String, message: String) {
    assert_eq!(uri, "/send-message");
    send(world, send_message_request(None, &phone, &message)).await;
}

#[when(expr = "I POST to {string} with key {string} with phone {string} and message {string}")]
async fn post_with_key(
    world: &mut DowntimeWorld,
    uri: String,
    key: String,
    phone: String,
    message: String,
) {
    assert_eq!(uri, "/send-message");
    send(world, send_message_request(Some(&key), &phone, &message)).await;
}

#[when(
    expr = "I POST to {string} with the configured key with phone {string} and message {string}"
)]
async fn post_with_configured_key(
    world: &mut DowntimeWorld,
    uri: String,
    phone: String,
    message: String,
) {
    assert_eq!(uri, "/send-message");
    send(world, send_message_request(Some(API_KEY), &phone, &message)).await;
}

#[then(expr = "the response status is {int}")]
fn response_status(world: &mut DowntimeWorld, status: u16) {
    assert_eq!(world.response_status, Some(status));
}

#[then(expr = "the response field {string} is {string}")]
fn response_field(world: &mut DowntimeWorld, path: String, expected: String) {
    let body = world.response_body.as_ref().expect("no JSON body");
    let value = path
        .split('.')
        .fold(body, |value, key| &value[key]);
    let actual = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    assert_eq!(actual, expected, "field {} in {}", path, body);
}
