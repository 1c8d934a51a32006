//! HTTP control plane: health, status, history and manual sends

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::clock::Clock;
use crate::dispatcher::NotificationDispatcher;
use crate::state::StateHandle;
use crate::template::{MessageContext, TemplateId};

/// Control plane application state
#[derive(Clone)]
pub struct ApiState {
    pub state: StateHandle,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub api_key: Option<String>,
}

/// Build the control plane router
pub fn build_router(api: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/send-message", post(send_message_handler))
        .route("/send-alert", post(send_alert_handler))
        .fallback(not_found_handler)
        .with_state(api)
}

/// JSON error body `{error, message}` with a status code
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    fn missing_fields(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Missing required fields", message)
    }

    fn not_ready() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Notification channel not ready",
            "The notification channel is not connected or ready to send messages",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.error,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let provided = headers
        .get("x-api-key")
        .or_else(|| headers.get(axum::http::header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
        .filter(|v| !v.is_empty());

    let Some(provided) = provided else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "API key required",
            "Please provide API key in x-api-key header or Authorization header",
        ));
    };

    if Some(provided) != expected {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Invalid API key",
            "The provided API key is invalid",
        ));
    }

    Ok(())
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes, message: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejecting request body: {}", e);
        ApiError::missing_fields(message)
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendAlertRequest {
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default)]
    duration: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

async fn health_handler(State(api): State<ApiState>) -> impl IntoResponse {
    let state = api.state.read().await;
    Json(serde_json::json!({
        "status": "ok",
        "channel": api.dispatcher.channel().status(),
        "provider": { "kind": state.provider_kind },
        "monitor": {
            "target_name": state.monitor.target_name,
            "is_online": state.monitor.is_online,
            "down_since": state.monitor.down_since,
            "phase": state.monitor.phase,
        },
        "timestamp": api.clock.now(),
    }))
}

async fn status_handler(State(api): State<ApiState>) -> impl IntoResponse {
    let state = api.state.read().await;
    Json(serde_json::json!({
        "monitor": state.monitor,
        "last_check": state.last_check,
        "consecutive_errors": state.consecutive_errors,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn history_handler(State(api): State<ApiState>) -> impl IntoResponse {
    let state = api.state.read().await;
    let history: Vec<_> = state.history.iter().cloned().collect();
    Json(history)
}

async fn send_message_handler(
    State(api): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, api.api_key.as_deref())?;

    const REQUIRED: &str = "Both phoneNumber and message are required";
    let request: SendMessageRequest = parse_body(&body, REQUIRED)?;
    let (Some(phone_number), Some(message)) =
        (non_empty(request.phone_number), non_empty(request.message))
    else {
        return Err(ApiError::missing_fields(REQUIRED));
    };

    deliver(&api, &phone_number, &message, "Message sent successfully").await
}

async fn send_alert_handler(
    State(api): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, api.api_key.as_deref())?;

    const REQUIRED: &str = "phoneNumber, deviceName, and duration are required";
    let request: SendAlertRequest = parse_body(&body, REQUIRED)?;
    let (Some(phone_number), Some(device_name), Some(duration)) = (
        non_empty(request.phone_number),
        non_empty(request.device_name),
        request.duration,
    ) else {
        return Err(ApiError::missing_fields(REQUIRED));
    };

    let ctx = MessageContext {
        target_name: device_name,
        duration_minutes: duration,
        timestamp: api.clock.now(),
    };
    let message = api.dispatcher.render(TemplateId::Alert, &ctx);

    deliver(&api, &phone_number, &message, "Alert sent successfully").await
}

async fn deliver(
    api: &ApiState,
    phone_number: &str,
    message: &str,
    confirmation: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !api.dispatcher.channel().is_ready() {
        return Err(ApiError::not_ready());
    }

    let outcome = api.dispatcher.send_direct(phone_number, message).await;
    match outcome.result {
        Ok(()) => Ok(Json(serde_json::json!({
            "success": true,
            "message": confirmation,
            "phoneNumber": phone_number,
            "timestamp": api.clock.now(),
        }))),
        Err(crate::error::ChannelError::NotReady) => Err(ApiError::not_ready()),
        Err(e) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to send message",
            e.to_string(),
        )),
    }
}

async fn not_found_handler() -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "Not found",
        "The requested endpoint does not exist",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use tower::ServiceExt;

    use crate::channel::{ChannelStatus, MockMessageChannel};
    use crate::clock::ManualClock;
    use crate::config::NotificationConfig;
    use crate::detector::MonitorState;
    use crate::error::ChannelError;
    use crate::provider::ProviderKind;
    use crate::state::new_state_handle;

    const KEY: &str = "secret";

    fn app(channel: MockMessageChannel) -> (Router, StateHandle) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
        let state = new_state_handle(
            ProviderKind::Cloudflare,
            MonitorState::new(now).snapshot("home-tunnel"),
            10,
        );
        let config = NotificationConfig {
            downtime_alert_message: "{{deviceName}} down {{duration}}m".to_string(),
            ..NotificationConfig::default()
        };
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(channel),
            &config,
            clock.clone(),
            state.clone(),
        ));
        let router = build_router(ApiState {
            state: state.clone(),
            dispatcher,
            clock,
            api_key: Some(KEY.to_string()),
        });
        (router, state)
    }

    fn ready_channel() -> MockMessageChannel {
        let mut channel = MockMessageChannel::new();
        channel.expect_is_ready().return_const(true);
        channel.expect_status().returning(|| ChannelStatus {
            ready: true,
            message: "Connected and ready".to_string(),
        });
        channel
    }

    fn post(uri: &str, key: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_channel_and_monitor() {
        let (app, _) = app(ready_channel());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["channel"]["ready"], true);
        assert_eq!(json["provider"]["kind"], "cloudflare");
        assert_eq!(json["monitor"]["target_name"], "home-tunnel");
        assert_eq!(json["monitor"]["phase"], "online");
    }

    #[tokio::test]
    async fn status_returns_snapshot() {
        let (app, _) = app(ready_channel());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["monitor"]["is_online"], true);
        assert_eq!(json["monitor"]["alert_sent"], false);
        assert!(json["last_check"].is_null());
    }

    #[tokio::test]
    async fn send_message_requires_key() {
        let (app, _) = app(ready_channel());
        let response = app
            .oneshot(post(
                "/send-message",
                None,
                serde_json::json!({"phoneNumber": "+1", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "API key required");
    }

    #[tokio::test]
    async fn send_message_rejects_wrong_key() {
        let (app, _) = app(ready_channel());
        let response = app
            .oneshot(post(
                "/send-message",
                Some("wrong"),
                serde_json::json!({"phoneNumber": "+1", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn bearer_token_is_accepted() {
        let mut channel = ready_channel();
        channel
            .expect_send_message()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        let (app, _) = app(channel);

        let request = Request::builder()
            .method("POST")
            .uri("/send-message")
            .header("authorization", format!("Bearer {}", KEY))
            .body(Body::from(
                serde_json::json!({"phoneNumber": "+1", "message": "hi"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn send_message_validates_fields() {
        let (app, _) = app(ready_channel());
        let response = app
            .oneshot(post(
                "/send-message",
                Some(KEY),
                serde_json::json!({"phoneNumber": "+1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Missing required fields");
    }

    #[tokio::test]
    async fn send_message_when_not_ready_is_unavailable() {
        let mut channel = MockMessageChannel::new();
        channel.expect_is_ready().return_const(false);
        channel.expect_send_message().never();
        let (app, _) = app(channel);

        let response = app
            .oneshot(post(
                "/send-message",
                Some(KEY),
                serde_json::json!({"phoneNumber": "+1", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn send_message_success_is_recorded() {
        let mut channel = ready_channel();
        channel
            .expect_send_message()
            .withf(|to, text| to == "+1" && text == "hi")
            .returning(|_, _| Box::pin(async { Ok(()) }));
        let (app, state) = app(channel);

        let response = app
            .oneshot(post(
                "/send-message",
                Some(KEY),
                serde_json::json!({"phoneNumber": "+1", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["phoneNumber"], "+1");
        assert_eq!(state.read().await.history.len(), 1);
    }

    #[tokio::test]
    async fn send_failure_is_internal_error() {
        let mut channel = ready_channel();
        channel.expect_send_message().returning(|_, _| {
            Box::pin(async { Err(ChannelError::SendFailed("status 500".to_string())) })
        });
        let (app, _) = app(channel);

        let response = app
            .oneshot(post(
                "/send-message",
                Some(KEY),
                serde_json::json!({"phoneNumber": "+1", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn send_alert_renders_template() {
        let mut channel = ready_channel();
        channel
            .expect_send_message()
            .withf(|to, text| to == "+1" && text == "router down 0m")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));
        let (app, _) = app(channel);

        let response = app
            .oneshot(post(
                "/send-alert",
                Some(KEY),
                serde_json::json!({"phoneNumber": "+1", "deviceName": "router", "duration": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "Alert sent successfully");
    }

    #[tokio::test]
    async fn send_alert_requires_duration() {
        let (app, _) = app(ready_channel());
        let response = app
            .oneshot(post(
                "/send-alert",
                Some(KEY),
                serde_json::json!({"phoneNumber": "+1", "deviceName": "router"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (app, _) = app(ready_channel());
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Not found");
    }
}
