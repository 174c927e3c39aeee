//! HTTP surface: the rate limiting middleware, the 429 response, and the
//! routes it protects.

mod adapter;
mod rejection;
mod routes;

pub use adapter::{
    client_identifier, enforce, AuthenticatedUser, PolicyGuard, UNAUTHENTICATED_AR,
    UNAUTHENTICATED_EN,
};
pub use rejection::{
    apply_headers, Rejection, TOO_MANY_REQUESTS_AR, TOO_MANY_REQUESTS_EN, X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use routes::{router, AppState, OtpRequest, OTP_ABUSE_BLOCK};
