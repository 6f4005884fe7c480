// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared-secret authentication for `/internal/*` routes.
//!
//! The booking service and the scheduler call these routes with the
//! configured token in the `x-internal-token` header.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Require the internal API token.
pub async fn require_internal_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if !token_matches(provided, &state.config.internal_api_token) {
        tracing::warn!(
            path = %request.uri().path(),
            "Blocked internal request with invalid token"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}

fn token_matches(provided: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches() {
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("secreT", "secret"));
        assert!(!token_matches("", "secret"));
        assert!(!token_matches("", ""));
    }
}
