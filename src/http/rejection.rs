//! The 429 response shape and the rate limit headers.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::ratelimit::Decision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// User-facing message, Arabic.
pub const TOO_MANY_REQUESTS_AR: &str = "طلبات كثيرة جداً. يرجى المحاولة مرة أخرى لاحقاً";
/// User-facing message, English.
pub const TOO_MANY_REQUESTS_EN: &str = "Too many requests. Please try again later.";

#[derive(Debug, Serialize)]
struct RejectionBody {
    success: bool,
    error: &'static str,
    error_en: &'static str,
    #[serde(rename = "retryAfter")]
    retry_after: u64,
}

/// A 429 answer.
///
/// Rate limit denials and abuse blocks produce the same response so the
/// client cannot tell which one it hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    retry_after_secs: u64,
    reset_at: DateTime<Utc>,
    limit: Option<u64>,
}

impl Rejection {
    pub fn from_decision(decision: &Decision, now: DateTime<Utc>) -> Self {
        Self {
            retry_after_secs: decision
                .retry_after_secs
                .unwrap_or_else(|| decision.reset_in(now))
                .max(1),
            reset_at: decision.reset_at,
            limit: Some(decision.limit),
        }
    }

    /// Answer for an identifier on the block list.
    pub fn blocked(retry_after: Duration, now: DateTime<Utc>) -> Self {
        let retry_after_secs = retry_after.as_secs().max(1);
        Self {
            retry_after_secs,
            reset_at: now + chrono::Duration::seconds(retry_after_secs as i64),
            limit: None,
        }
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_secs
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = RejectionBody {
            success: false,
            error: TOO_MANY_REQUESTS_AR,
            error_en: TOO_MANY_REQUESTS_EN,
            retry_after: self.retry_after_secs,
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after_secs));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u64));
        headers.insert(X_RATELIMIT_RESET, reset_value(self.reset_at));
        if let Some(limit) = self.limit {
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
        }
        response
    }
}

/// Attach the limit, remaining and reset headers for an allowed request.
pub fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, reset_value(decision.reset_at));
}

/// Reset time as Unix epoch seconds.
fn reset_value(reset_at: DateTime<Utc>) -> HeaderValue {
    HeaderValue::from(reset_at.timestamp().max(0) as u64)
}
