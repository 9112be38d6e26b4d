// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for the user service.
//!
//! Runs every request through the [`TokenValidator`](super::TokenValidator)
//! independently of what the gateway already checked. On success the
//! [`AuthenticatedUser`] and the [`RequestContext`] are placed in the request
//! extensions, where the [`Auth`](super::Auth) extractor picks them up.
//!
//! The gateway's `requestId` is adopted as the correlation id only when it
//! arrives with a valid trust signature; otherwise a fresh id is generated.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/v1/api/user/me", get(me))
//!     .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware))
//!     .with_state(state);
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::trust::{now_millis, GATEWAY_SIGNATURE_HEADER, REQUEST_ID_HEADER};
use super::validator::{Outcome, RequestContext};
use super::AuthError;
use crate::state::AppState;

/// Authentication middleware function.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let validator = &state.auth.validator;

    let ctx = match gateway_context(&state, &request) {
        Some(ctx) => ctx,
        None => {
            if state.trust.require_signature && !validator.is_bypassed(&path) {
                warn!(path = %path, "Rejected request that bypassed the gateway");
                return AuthError::UntrustedOrigin.into_response();
            }
            RequestContext::fresh()
        }
    };

    let outcome = validator
        .authorize(&path, request.headers().get(AUTHORIZATION), &ctx)
        .await;

    match outcome {
        Outcome::Bypassed => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Outcome::Accepted(user) => {
            request.extensions_mut().insert(ctx);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Outcome::Rejected(e) => e.into_response(),
    }
}

/// Correlation id vouched for by a valid trust signature.
fn gateway_context(state: &AppState, request: &Request) -> Option<RequestContext> {
    let signer = state.trust.signer.as_ref()?;
    let headers = request.headers();
    let request_id = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?;
    let signature = headers
        .get(GATEWAY_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match signer.verify(
        signature,
        request_id,
        request.method().as_str(),
        request.uri().path(),
        now_millis(),
    ) {
        Ok(()) => Some(RequestContext::new(request_id)),
        Err(e) => {
            warn!(request_id = %request_id, reason = %e, "Trust signature rejected");
            None
        }
    }
}
