use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::mask_key;
use crate::errors::AppError;
use crate::AppState;

/// Middleware: validates `X-API-Key` (or `Authorization`, with or without a
/// `Bearer ` prefix) against the configured key.
/// Returns 401 if missing, 403 if it does not match.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    match provided_key(req.headers()) {
        Some(k) if keys_match(k, &state.config.api_key) => {}
        Some(k) => {
            // SECURITY: Never log the expected key or the full provided key
            tracing::warn!(provided = %mask_key(k), "register: invalid API key");
            return Err(AppError::Forbidden);
        }
        None => {
            tracing::warn!("register: missing API key");
            return Err(AppError::Unauthorized);
        }
    }

    Ok(next.run(req).await)
}

fn provided_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-api-key")
        .or_else(|| headers.get(AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|v| strip_bearer(v.trim_start()).trim())
        .filter(|k| !k.is_empty())
}

fn strip_bearer(value: &str) -> &str {
    match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => value[7..].trim_start(),
        _ => value,
    }
}

fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_strip_bearer_prefix() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("bearer   abc"), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
        assert_eq!(strip_bearer("Beareré"), "Beareré");
    }

    #[test]
    fn test_x_api_key_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("from-header"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-auth"));
        assert_eq!(provided_key(&headers), Some("from-header"));
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(provided_key(&headers), None);
    }

    #[test]
    fn test_keys_match_exactly() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret ", "secret"));
        assert!(!keys_match("Secret", "secret"));
        assert!(!keys_match("", "secret"));
    }
}
