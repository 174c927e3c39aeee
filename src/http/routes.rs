//! Routes protected by the rate limiter.
//!
//! The OTP endpoints are keyed by phone number, so they call the limiter
//! directly; the chat and generic API routes go through [`enforce`].

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::adapter::{enforce, PolicyGuard};
use super::rejection::{apply_headers, Rejection};
use crate::ratelimit::{BlockList, PolicyName, RateLimiter};

/// How long a phone number is blocked after exhausting its verification attempts.
pub const OTP_ABUSE_BLOCK: Duration = Duration::from_secs(86400);

/// Shared state for the routes.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub blocks: Arc<BlockList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpRequest {
    pub phone: String,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let chat_routes = Router::new()
        .route("/api/chat", post(chat))
        .route_layer(from_fn_with_state(
            PolicyGuard::new(state.limiter.clone(), PolicyName::Chat),
            enforce,
        ));

    let api_routes = Router::new()
        .route("/api/status", get(status))
        .route_layer(from_fn_with_state(
            PolicyGuard::new(state.limiter.clone(), PolicyName::Api),
            enforce,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/otp/send", post(otp_send))
        .route("/api/otp/verify", post(otp_verify))
        .merge(chat_routes)
        .merge(api_routes)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn chat() -> impl IntoResponse {
    Json(json!({ "success": true }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "store": state.limiter.stores().primary()
    }))
}

async fn otp_send(State(state): State<AppState>, Json(req): Json<OtpRequest>) -> Response {
    admit_phone(&state, &req.phone, PolicyName::OtpSend).await
}

async fn otp_verify(State(state): State<AppState>, Json(req): Json<OtpRequest>) -> Response {
    admit_phone(&state, &req.phone, PolicyName::OtpVerify).await
}

/// Phone number safe for logs: everything but the last three digits hidden.
fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let visible = chars.len().min(3);
    let hidden = chars.len() - visible;
    std::iter::repeat('*')
        .take(hidden)
        .chain(chars[hidden..].iter().copied())
        .collect()
}

/// Gate an OTP request on the block list and the phone's counter.
async fn admit_phone(state: &AppState, phone: &str, policy: PolicyName) -> Response {
    let phone = phone.trim();
    if phone.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "رقم الجوال مطلوب",
                "error_en": "Phone number is required"
            })),
        )
            .into_response();
    }

    let now = state.limiter.stores().clock().now();

    if state.blocks.is_blocked(phone).await {
        // The block's own remaining TTL is not tracked; the block length is an upper bound
        return Rejection::blocked(OTP_ABUSE_BLOCK, now).into_response();
    }

    let decision = state.limiter.policy(policy).check(phone).await;
    if !decision.allowed {
        if policy == PolicyName::OtpVerify {
            debug!(phone = %mask_phone(phone), "OTP verification attempts exhausted, blocking phone");
            state.blocks.block(phone, OTP_ABUSE_BLOCK).await;
        }
        return Rejection::from_decision(&decision, now).into_response();
    }

    info!(policy = %policy, remaining = decision.remaining, "OTP request admitted");

    let mut response = Json(json!({ "success": true })).into_response();
    apply_headers(response.headers_mut(), &decision);
    response
}
