// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every rejection reason produced while extracting, resolving or verifying a
//! bearer token. The HTTP translation is the thin [`IntoResponse`] mapping at
//! the bottom of this file; nothing else in the crate decides status codes
//! for authentication failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,

    /// Authorization header is not `Bearer <token>`
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    /// Token segments or payload cannot be decoded
    #[error("Invalid or missing token.")]
    MalformedToken,

    /// The secret store has no key material for the claimed version
    #[error("Invalid or missing token.")]
    UnknownKeyVersion(u32),

    /// The secret store could not be reached and nothing usable is cached
    #[error("Signing key is temporarily unavailable")]
    SecretSourceUnavailable(String),

    /// Signature does not verify with the claimed version's key
    #[error("Invalid or missing token.")]
    InvalidSignature,

    /// Token `exp` has passed
    #[error("Token has expired")]
    TokenExpired,

    /// ACCESS token presented where REFRESH is required, or the reverse
    #[error("Invalid token type.")]
    WrongTokenType,

    /// Trust signature missing, stale or forged on a service that requires it
    #[error("Request was not routed through the gateway")]
    UntrustedOrigin,

    /// Issuance failed for a reason that is not the caller's fault
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnknownKeyVersion(_) => "unknown_key_version",
            AuthError::SecretSourceUnavailable(_) => "secret_source_unavailable",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::WrongTokenType => "wrong_token_type",
            AuthError::UntrustedOrigin => "untrusted_origin",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    ///
    /// Every verification failure is a 401, including an unreachable secret
    /// store: the request cannot be verified, so it is not trusted.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_auth_returns_401() {
        let (status, body) = body_of(AuthError::MissingAuthHeader).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn expired_message_differs_from_invalid() {
        let (expired_status, expired) = body_of(AuthError::TokenExpired).await;
        let (invalid_status, invalid) = body_of(AuthError::InvalidSignature).await;
        assert_eq!(expired_status, StatusCode::UNAUTHORIZED);
        assert_eq!(invalid_status, StatusCode::UNAUTHORIZED);
        assert_eq!(expired["error"], "Token has expired");
        assert_eq!(invalid["error"], "Invalid or missing token.");
    }

    #[tokio::test]
    async fn secret_source_outage_is_still_401() {
        let (status, body) =
            body_of(AuthError::SecretSourceUnavailable("timeout".to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "secret_source_unavailable");
    }

    #[test]
    fn unknown_version_is_distinguishable() {
        assert_eq!(AuthError::UnknownKeyVersion(7).error_code(), "unknown_key_version");
        assert_ne!(
            AuthError::UnknownKeyVersion(7).error_code(),
            AuthError::InvalidSignature.error_code()
        );
    }

    #[test]
    fn internal_is_500() {
        assert_eq!(
            AuthError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
