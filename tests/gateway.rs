// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::{Json, Router};
use bank_auth::auth::trust::{now_millis, GATEWAY_SIGNATURE_HEADER, REQUEST_ID_HEADER};
use bank_auth::auth::{AuthRegistry, InMemorySecretSource, TrustSigner};
use bank_auth::gateway::{router, GatewayState};
use bank_auth::state::TrustPolicy;
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "requestId": header("requestid"),
        "signature": header("x-gateway-signature"),
        "authorization": header("authorization"),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn signer() -> TrustSigner {
    TrustSigner::new(SHARED_SECRET, Duration::from_secs(30)).unwrap()
}

fn gateway(auth: AuthRegistry, upstream: SocketAddr) -> Router {
    let upstream = Url::parse(&format!("http://{upstream}")).unwrap();
    router(GatewayState::new(auth, signer(), upstream, Duration::from_secs(5)).unwrap())
}

async fn echo_gateway() -> (Router, AuthRegistry) {
    let upstream = spawn(Router::new().fallback(echo)).await;
    let auth = registry(source_with(&[1]));
    (gateway(auth.clone(), upstream), auth)
}

#[tokio::test]
async fn missing_token_is_rejected_at_the_edge() {
    let (app, _) = echo_gateway().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/api/user/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["error_code"], "missing_auth_header");
}

#[tokio::test]
async fn forged_token_is_rejected_at_the_edge() {
    let (app, auth) = echo_gateway().await;
    let pair = auth.issuer.issue_pair("alice", &[]).await.unwrap();
    let response = app
        .oneshot(bearer_request(
            "GET",
            "/v1/api/user/me",
            &tamper_signature(&pair.access_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["error_code"], "invalid_signature");
}

#[tokio::test]
async fn accepted_request_is_forwarded_with_a_fresh_signed_request_id() {
    let (app, auth) = echo_gateway().await;
    let pair = auth.issuer.issue_pair("alice", &[]).await.unwrap();

    let mut request = bearer_request("GET", "/v1/api/user/me?verbose=1", &pair.access_token);
    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER, "client-chosen".parse().unwrap());
    request
        .headers_mut()
        .insert(GATEWAY_SIGNATURE_HEADER, "t=1,v1=AAAA".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let seen = read_json(response).await;

    assert_eq!(seen["path"], "/v1/api/user/me");
    assert_eq!(seen["query"], "verbose=1");
    assert_eq!(
        seen["authorization"],
        format!("Bearer {}", pair.access_token)
    );

    let request_id = seen["requestId"].as_str().unwrap();
    assert_ne!(request_id, "client-chosen");
    let signature = seen["signature"].as_str().unwrap();
    signer()
        .verify(Some(signature), request_id, "GET", "/v1/api/user/me", now_millis())
        .unwrap();
}

#[tokio::test]
async fn allow_listed_paths_are_forwarded_without_a_token() {
    let (app, _) = echo_gateway().await;
    let body = json!({ "username": "alice", "password": "correct-horse" });
    let response = app
        .oneshot(json_request("POST", "/v1/api/authenticate", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let seen = read_json(response).await;
    assert_eq!(seen["method"], "POST");
    assert_eq!(seen["body"], body.to_string());
    assert!(seen["requestId"].is_string());
}

#[tokio::test]
async fn unreachable_upstream_is_a_bad_gateway() {
    let auth = registry(source_with(&[1]));
    // Nothing listens on the discard port.
    let app = gateway(auth, "127.0.0.1:9".parse().unwrap());
    let response = app
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    // Health is answered locally, forwarding is not.
    assert_eq!(response.status(), StatusCode::OK);

    let app = gateway(registry(source_with(&[1])), "127.0.0.1:9".parse().unwrap());
    let response = app
        .oneshot(json_request("POST", "/v1/api/authenticate", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

/// Gateway and service share a key store but nothing else.
async fn gateway_in_front_of_service(source: Arc<InMemorySecretSource>) -> Router {
    let service = service_state(registry(source.clone())).with_trust(TrustPolicy {
        signer: Some(signer()),
        require_signature: true,
    });
    let upstream = spawn(bank_auth::api::router(service)).await;
    gateway(registry(source), upstream)
}

#[tokio::test]
async fn end_to_end_login_and_rotation_through_the_gateway() {
    let source = source_with(&[1, 2]);
    let app = gateway_in_front_of_service(source.clone()).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/api/user/register",
            json!({ "username": "alice", "email": "alice@bank.example", "password": "correct-horse" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/api/authenticate",
            json!({ "username": "alice", "password": "correct-horse" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let before = read_json(response).await;

    source.rotate(2).unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/api/renewToken",
            json!({ "refreshToken": before["refreshToken"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let after = read_json(response).await;

    for (token, version) in [(&before["accessToken"], 1), (&after["accessToken"], 2)] {
        let response = app
            .clone()
            .oneshot(bearer_request("GET", "/v1/api/user/me", token.as_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = read_json(response).await;
        assert_eq!(me["username"], "alice");
        assert_eq!(me["keyVersion"], version);
    }
}
