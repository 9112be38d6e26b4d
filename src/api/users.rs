// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Auth, AuthenticatedUser};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::{NewUser, UserRecord, UserStatus, UserStoreError, DEFAULT_USER_AUTHORITY};

const MIN_PASSWORD_LEN: usize = 8;

/// Request body for POST /v1/api/user/register
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// 3 to 50 characters
    pub username: String,
    pub email: String,
    /// At least 8 characters
    pub password: String,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let username_len = self.username.trim().chars().count();
        if !(3..=50).contains(&username_len) {
            return Err(ApiError::bad_request("Username must be 3 to 50 characters"));
        }
        if self.username.contains('@') {
            return Err(ApiError::bad_request("Username must not contain '@'"));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err(ApiError::bad_request("Email is not valid")),
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::bad_request(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Response for POST /v1/api/user/register
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub status: UserStatus,
    pub authorities: Vec<String>,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            status: user.status,
            authorities: user.authorities,
        }
    }
}

/// Response for GET /v1/api/user/me
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserMeResponse {
    /// Token subject
    pub username: String,
    /// Authorities carried by the token
    pub authorities: Vec<String>,
    /// Key version that verified the token
    pub key_version: u32,
    pub expires_at: i64,
}

impl From<AuthenticatedUser> for UserMeResponse {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            username: user.user_id,
            authorities: user.authorities,
            key_version: user.key_version,
            expires_at: user.expires_at,
        }
    }
}

/// Register a new user with the default `ROLE_USER` authority.
#[utoipa::path(
    post,
    path = "/v1/api/user/register",
    tag = "Users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid registration data"),
        (status = 409, description = "Username or email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    request.validate()?;

    let record = state
        .users
        .create(NewUser {
            username: request.username.trim().to_string(),
            email: request.email.trim().to_string(),
            password: request.password,
            authorities: vec![DEFAULT_USER_AUTHORITY.to_string()],
        })
        .await
        .map_err(|e| match e {
            UserStoreError::AlreadyExists => ApiError::conflict(e.to_string()),
            UserStoreError::NotFound(_) | UserStoreError::Hashing(_) => {
                ApiError::internal(e.to_string())
            }
        })?;

    info!(user_id = %record.user_id, username = %record.username, "User registered");
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Get the identity bound to the current request.
#[utoipa::path(
    get,
    path = "/v1/api/user/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(Auth(user): Auth) -> Json<UserMeResponse> {
    Json(user.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn registration_validation() {
        assert!(request("alice", "alice@bank.test", "long-enough").validate().is_ok());
        assert!(request("al", "alice@bank.test", "long-enough").validate().is_err());
        assert!(request("a@b", "alice@bank.test", "long-enough").validate().is_err());
        assert!(request("alice", "alice.bank.test", "long-enough").validate().is_err());
        assert!(request("alice", "alice@bank.test", "short").validate().is_err());
    }

    #[test]
    fn me_response_from_authenticated_user() {
        let user = AuthenticatedUser {
            user_id: "alice".to_string(),
            authorities: vec!["ROLE_USER".to_string()],
            key_version: 2,
            expires_at: 100,
            issuer: "digital-bank".to_string(),
        };

        let response: UserMeResponse = user.into();
        assert_eq!(response.username, "alice");
        assert_eq!(response.authorities, vec!["ROLE_USER"]);
        assert_eq!(response.key_version, 2);
    }
}
