//! Rate limiting middleware for axum routes.
//!
//! Derives the caller identifier from the policy's identifier source, checks
//! the bound policy and either short-circuits with a 429 or forwards to the
//! handler. Allowed responses still carry the remaining/reset headers so
//! clients can slow down early.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, trace};

use super::rejection::{apply_headers, Rejection};
use crate::ratelimit::{IdentifierSource, PolicyName, RateLimiter};

pub const UNAUTHENTICATED_AR: &str = "يجب تسجيل الدخول أولاً";
pub const UNAUTHENTICATED_EN: &str = "Authentication required";

/// Identity of the caller, inserted as a request extension by the
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Identifier for the caller of `req` under `source`.
///
/// `user:<id>` when authenticated. Anonymous callers are keyed by
/// `ip:<addr>` (first `X-Forwarded-For` entry, then `X-Real-IP`) unless the
/// source requires a user. Phone numbers live in the request body, so
/// `None` is returned for them as well.
pub fn client_identifier(req: &Request, source: IdentifierSource) -> Option<String> {
    if source == IdentifierSource::PhoneNumber {
        return None;
    }

    if let Some(AuthenticatedUser(id)) = req.extensions().get::<AuthenticatedUser>() {
        return Some(format!("user:{}", id));
    }

    match source {
        IdentifierSource::UserIdOrIp | IdentifierSource::CallerSupplied => Some(ip_identifier(req)),
        IdentifierSource::UserId | IdentifierSource::PhoneNumber => None,
    }
}

fn ip_identifier(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return format!("ip:{}", ip);
    }

    let real_ip = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match real_ip {
        Some(ip) => format!("ip:{}", ip),
        None => "ip:unknown".to_string(),
    }
}

/// Middleware state: a limiter and the policy it enforces.
#[derive(Clone)]
pub struct PolicyGuard {
    limiter: Arc<RateLimiter>,
    policy: PolicyName,
}

impl PolicyGuard {
    pub fn new(limiter: Arc<RateLimiter>, policy: PolicyName) -> Self {
        Self { limiter, policy }
    }
}

/// Enforce the guard's policy. Use with `axum::middleware::from_fn_with_state`.
///
/// Requests whose identifier cannot be derived are refused with a 401.
pub async fn enforce(State(guard): State<PolicyGuard>, req: Request, next: Next) -> Response {
    let source = guard.policy.policy().source;
    let Some(identifier) = client_identifier(&req, source) else {
        debug!(policy = %guard.policy, "No identifier for caller, refusing request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "error": UNAUTHENTICATED_AR,
                "error_en": UNAUTHENTICATED_EN
            })),
        )
            .into_response();
    };

    let decision = guard.limiter.policy(guard.policy).check(&identifier).await;

    if !decision.allowed {
        let now = guard.limiter.stores().clock().now();
        return Rejection::from_decision(&decision, now).into_response();
    }

    trace!(
        policy = %guard.policy,
        identifier = %identifier,
        remaining = decision.remaining,
        "Request admitted"
    );

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &decision);
    response
}
