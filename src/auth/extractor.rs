// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users and request context.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::claims::TokenType;
use super::validator::{bearer_token, RequestContext};
use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Uses the identity bound by the middleware when present. Without the
/// middleware the bearer token is validated here, as an ACCESS token.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let ctx = match Correlation::from_request_parts(parts, state).await {
            Ok(Correlation(ctx)) => ctx,
            Err(never) => match never {},
        };
        let token = bearer_token(parts.headers.get(AUTHORIZATION))?;
        let user = state
            .auth
            .validator
            .validate(token, TokenType::Access, &ctx)
            .await?;

        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// The request's correlation context.
///
/// Never rejects: a request that did not pass through the middleware gets a
/// fresh context, which is then stored for later extractors.
pub struct Correlation(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for Correlation {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = match parts.extensions.get::<RequestContext>() {
            Some(ctx) => ctx.clone(),
            None => {
                let ctx = RequestContext::fresh();
                parts.extensions.insert(ctx.clone());
                ctx
            }
        };
        Ok(Correlation(ctx))
    }
}
