// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Edge gateway.
//!
//! Validates bearer tokens at the edge and forwards accepted requests to the
//! user service with a fresh `requestId` and an `X-Gateway-Signature`. Any
//! `requestId` or signature sent by the client is discarded. The service
//! verifies the token again on its side.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{FromRef, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use url::Url;

use crate::api::health;
use crate::auth::secrets::SecretsManager;
use crate::auth::trust::{GATEWAY_SIGNATURE_HEADER, REQUEST_ID_HEADER};
use crate::auth::{AuthRegistry, Outcome, RequestContext, TrustSigner};
use crate::error::ApiError;

/// Largest request body the gateway buffers for forwarding.
const MAX_FORWARD_BODY: usize = 2 * 1024 * 1024;

/// Headers that describe one hop and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request body could not be read: {0}")]
    Body(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream URL could not be built: {0}")]
    Url(#[from] url::ParseError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            GatewayError::Body(_) => ApiError::bad_request(self.to_string()).into_response(),
            GatewayError::Upstream(_) | GatewayError::Url(_) => {
                warn!(error = %self, "Forwarding failed");
                ApiError::bad_gateway("Upstream service unavailable").into_response()
            }
        }
    }
}

/// State shared by the gateway's middleware and proxy handler.
#[derive(Clone)]
pub struct GatewayState {
    pub auth: AuthRegistry,
    pub signer: TrustSigner,
    pub upstream: Url,
    pub client: reqwest::Client,
}

impl GatewayState {
    pub fn new(
        auth: AuthRegistry,
        signer: TrustSigner,
        upstream: Url,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            auth,
            signer,
            upstream,
            client,
        })
    }
}

impl FromRef<GatewayState> for Arc<SecretsManager> {
    fn from_ref(state: &GatewayState) -> Self {
        state.auth.secrets.clone()
    }
}

/// Gateway router: local health probes, everything else forwarded.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .fallback(forward)
        .layer(from_fn_with_state(state.clone(), gateway_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Validate the request and stamp it with the gateway's headers.
pub async fn gateway_auth(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::fresh();
    let path = request.uri().path().to_string();

    let outcome = state
        .auth
        .validator
        .authorize(&path, request.headers().get(header::AUTHORIZATION), &ctx)
        .await;

    if let Outcome::Rejected(e) = outcome {
        return e.into_response();
    }
    if let Outcome::Accepted(user) = &outcome {
        debug!(request_id = %ctx.correlation_id, subject = %user.user_id, "Gateway accepted token");
    }

    let signature = state
        .signer
        .sign_now(&ctx.correlation_id, request.method().as_str(), &path);
    let headers = request.headers_mut();
    headers.remove(REQUEST_ID_HEADER);
    headers.remove(GATEWAY_SIGNATURE_HEADER);
    match (
        HeaderValue::from_str(&ctx.correlation_id),
        HeaderValue::from_str(&signature),
    ) {
        (Ok(id), Ok(sig)) => {
            headers.insert(REQUEST_ID_HEADER, id);
            headers.insert(GATEWAY_SIGNATURE_HEADER, sig);
        }
        _ => {
            return ApiError::internal("Could not sign forwarded request").into_response();
        }
    }

    request.extensions_mut().insert(ctx);
    next.run(request).await
}

/// Forward the request to the upstream service and relay its response.
pub async fn forward(
    State(state): State<GatewayState>,
    request: Request,
) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|e| GatewayError::Body(e.to_string()))?;

    let mut url = state.upstream.join(parts.uri.path())?;
    url.set_query(parts.uri.query());

    let upstream = state
        .client
        .request(parts.method, url)
        .headers(forwardable(&parts.headers, true))
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let headers = forwardable(upstream.headers(), false);
    let bytes = upstream.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Copy headers minus hop-by-hop ones (and `Host` on requests).
fn forwardable(headers: &HeaderMap, is_request: bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || (is_request && name == header::HOST) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_and_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer x"));

        let request_headers = forwardable(&headers, true);
        assert!(request_headers.get(header::HOST).is_none());
        assert!(request_headers.get(header::CONNECTION).is_none());
        assert!(request_headers.get(header::TRANSFER_ENCODING).is_none());
        assert!(request_headers.get(header::AUTHORIZATION).is_some());

        let response_headers = forwardable(&headers, false);
        assert!(response_headers.get(header::HOST).is_some());
    }

    #[test]
    fn upstream_errors_map_to_bad_gateway() {
        let err = GatewayError::Url(url::ParseError::EmptyHost);
        assert_eq!(err.into_response().status(), axum::http::StatusCode::BAD_GATEWAY);
        let err = GatewayError::Body("too large".to_string());
        assert_eq!(err.into_response().status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
