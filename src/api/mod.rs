// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{middleware::auth_middleware, secrets::SecretsManager, TokenPair},
    state::AppState,
    users::UserStatus,
};

pub mod auth;
pub mod health;
pub mod users;

impl FromRef<AppState> for Arc<SecretsManager> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.secrets.clone()
    }
}

/// User service router.
///
/// Every route runs behind the authentication middleware; allow-listed paths
/// pass through it without a token.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/v1/api/authenticate", post(auth::authenticate))
        .route("/v1/api/renewToken", post(auth::renew_token))
        .route("/v1/api/user/register", post(users::register))
        .route("/v1/api/user/me", get(users::get_current_user))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/actuator/health", get(health::health))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::authenticate,
        auth::renew_token,
        users::register,
        users::get_current_user,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            TokenPair,
            UserStatus,
            auth::LoginRequest,
            auth::RefreshTokenRequest,
            users::RegisterRequest,
            users::UserResponse,
            users::UserMeResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Authentication", description = "Login and token renewal"),
        (name = "Users", description = "Registration and current user"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
