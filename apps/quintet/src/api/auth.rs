//! # Authentication Module
//!
//! Simple API key authentication for the Quintet HTTP API.
//!
//! ## Configuration
//!
//! The key is read from the environment variable named by
//! `[server] api_key_env` (default `QUINTET_API_KEY`). When it is set, every
//! request except `/health` must carry it:
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```

use super::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Environment variable holding the API key unless configured otherwise.
pub const DEFAULT_API_KEY_ENV: &str = "QUINTET_API_KEY";

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// Read the API key from `var`.
///
/// Returns `None` when unset or empty, which disables authentication.
pub fn get_api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.is_empty())
}

/// Compare two keys in constant time.
///
/// Both sides are padded to the same length so the comparison always runs
/// over the same number of bytes.
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();

    let max_len = provided_bytes.len().max(expected_bytes.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
    padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided_bytes.len() == expected_bytes.len()
}

/// API key authentication middleware.
///
/// `/health` is always allowed. Accepts both `Bearer <key>` and a raw key.
pub async fn api_key_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = state.api_key() else {
        return Ok(next.run(request).await);
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) => {
            let provided_key = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
            if keys_match(provided_key, expected) {
                Ok(next.run(request).await)
            } else {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_api_key",
                    "Authentication failed: invalid API key"
                );
                Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
            }
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_api_key_unset_returns_none() {
        assert!(get_api_key_from_env("QUINTET_TEST_KEY_THAT_IS_NEVER_SET").is_none());
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "secre"));
        assert!(!keys_match("", "secret"));
        assert!(!keys_match("Secret", "secret"));
    }
}
