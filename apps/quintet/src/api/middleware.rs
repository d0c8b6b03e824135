//! # Middleware Module
//!
//! Rate limiting and reader identity for the Quintet HTTP API.
//!
//! ## Configuration
//!
//! - `[server] rate_limit`: requests per second (default: 100, 0 disables)
//! - `X-Quintet-Identity` request header: the reader the access filter checks.
//!   Requests without it read as anonymous.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use quintet_core::{Subject, primitives::MAX_TEXT_LENGTH};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Default rate limit: 100 requests per second.
const DEFAULT_RPS: NonZeroU32 = NonZeroU32::new(100).unwrap();

/// Header carrying the reader identity.
pub const IDENTITY_HEADER: &str = "x-quintet-identity";

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a new global rate limiter. Zero falls back to the default.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    let quota = Quota::per_second(rps);
    Arc::new(RateLimiter::direct(quota))
}

/// Rate limiting middleware.
///
/// Returns 429 Too Many Requests if the limit is exceeded.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
        }
    }
}

// =============================================================================
// READER IDENTITY
// =============================================================================

/// The reader named by `X-Quintet-Identity`, if any.
///
/// Blank, non-UTF-8 or oversized values read as anonymous.
pub fn reader_from_headers(headers: &HeaderMap) -> Option<Subject> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty() && name.len() <= MAX_TEXT_LENGTH)
        .map(Subject::symbol)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_create_rate_limiter() {
        let limiter = create_rate_limiter(50);
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_create_rate_limiter_zero_defaults() {
        let limiter = create_rate_limiter(0);
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_reader_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(reader_from_headers(&headers), None);

        headers.insert(IDENTITY_HEADER, HeaderValue::from_static("person1"));
        assert_eq!(
            reader_from_headers(&headers),
            Some(Subject::symbol("person1"))
        );

        headers.insert(IDENTITY_HEADER, HeaderValue::from_static("   "));
        assert_eq!(reader_from_headers(&headers), None);
    }
}
