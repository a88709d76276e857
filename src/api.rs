//! HTTP surface: the gateway webhook and a health check.

use crate::gateway::{Gateway, WebhookOutcome};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tally_core::config::ServerConfig;
use tracing::{error, info};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    gateway: Arc<Gateway>,
    webhook_token: Option<String>,
    uptime: Instant,
}

impl ApiState {
    pub fn new(gateway: Arc<Gateway>, webhook_token: &str) -> Self {
        Self {
            gateway,
            webhook_token: (!webhook_token.is_empty()).then(|| webhook_token.to_string()),
            uptime: Instant::now(),
        }
    }
}

/// Constant-time string comparison to prevent timing attacks on token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check the webhook token. Accepts `apikey: <token>` (the gateway's own
/// header) or `Authorization: Bearer <token>`. `None` means authorized.
fn check_auth(headers: &HeaderMap, token: &Option<String>) -> Option<(StatusCode, Json<Value>)> {
    let expected = token.as_ref()?;

    let presented = headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });

    match presented {
        Some(value) if constant_time_eq(value, expected) => None,
        Some(_) => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid token"})),
        )),
        None => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "missing token"})),
        )),
    }
}

/// `GET /api/health`: liveness with uptime.
async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
    }))
}

/// `POST /webhook`: one gateway event in, one outcome out.
async fn webhook(
    headers: HeaderMap,
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let start = Instant::now();

    if let Some(err) = check_auth(&headers, &state.webhook_token) {
        return err.into_response();
    }

    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("invalid request: {e}")})),
            )
                .into_response();
        }
    };

    let duration = || format!("{}ms", start.elapsed().as_millis());

    match state.gateway.handle_webhook(&body).await {
        Ok(WebhookOutcome::Ignored) => (StatusCode::OK, "Ignored").into_response(),
        Ok(WebhookOutcome::Duplicate) => (StatusCode::OK, "Duplicate").into_response(),
        Ok(WebhookOutcome::Unauthorized) => (StatusCode::OK, "Unauthorized").into_response(),
        Ok(WebhookOutcome::Processed { error: None }) => {
            let duration = duration();
            info!("webhook: processed in {duration}");
            (
                StatusCode::OK,
                Json(json!({"success": true, "duration": duration})),
            )
                .into_response()
        }
        Ok(WebhookOutcome::Processed { error: Some(e) }) => (
            StatusCode::OK,
            Json(json!({"success": false, "error": e, "duration": duration()})),
        )
            .into_response(),
        Err(e) => {
            error!("webhook: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string(), "duration": duration()})),
            )
                .into_response()
        }
    }
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/api/health", get(health))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &ServerConfig, state: ApiState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;

    info!("webhook server listening on {addr}");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }
}
