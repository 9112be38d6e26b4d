// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login and token renewal endpoints.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::{renewal, AuthError, Correlation, TokenPair};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::{check_credentials, LoginError};

/// Request body for POST /v1/api/authenticate
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email address
    pub username: String,
    pub password: String,
}

/// Request body for POST /v1/api/renewToken
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Log in with username or email and password.
///
/// Returns an ACCESS token (scope `user:add`) and a REFRESH token (scope
/// `token:renew`), both signed with the active key version.
#[utoipa::path(
    post,
    path = "/v1/api/authenticate",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 401, description = "Wrong credentials or inactive account"),
        (status = 500, description = "Signing key unavailable")
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, Response> {
    let user = check_credentials(state.users.as_ref(), &request.username, &request.password)
        .await
        .map_err(|e| {
            match e {
                LoginError::Inactive => warn!(login = %request.username, "Login by inactive user"),
                LoginError::WrongCredentials => info!(login = %request.username, "Login failed"),
            }
            ApiError::unauthorized(e.to_string()).into_response()
        })?;

    let pair = state
        .auth
        .issuer
        .issue_pair(&user.username, &user.authorities)
        .await
        .map_err(|e| match e {
            // A signing outage is not the caller's fault.
            AuthError::SecretSourceUnavailable(reason) => {
                AuthError::Internal(reason).into_response()
            }
            other => other.into_response(),
        })?;

    info!(user_id = %user.user_id, username = %user.username, "User authenticated");
    Ok(Json(pair))
}

/// Exchange a REFRESH token for a new ACCESS token.
///
/// The refresh token is returned unchanged.
#[utoipa::path(
    post,
    path = "/v1/api/renewToken",
    tag = "Authentication",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New access token issued", body = TokenPair),
        (status = 401, description = "Invalid, expired or non-refresh token")
    )
)]
pub async fn renew_token(
    State(state): State<AppState>,
    Correlation(ctx): Correlation,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    let pair = renewal::renew(
        &state.auth.validator,
        &state.auth.issuer,
        &request.refresh_token,
        &ctx,
    )
    .await?;
    Ok(Json(pair))
}
