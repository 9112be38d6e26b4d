// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use bank_auth::auth::{AuthRegistry, InMemorySecretSource, SigningKeyMaterial};
use bank_auth::config::AuthSettings;
use bank_auth::state::AppState;
use bank_auth::users::InMemoryCredentialStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

pub const V1_PUBLIC: &str = include_str!("../fixtures/keys/v1_public.pem");
pub const V1_PRIVATE: &str = include_str!("../fixtures/keys/v1_private.pem");
pub const V2_PUBLIC: &str = include_str!("../fixtures/keys/v2_public.pem");
pub const V2_PRIVATE: &str = include_str!("../fixtures/keys/v2_private.pem");
pub const V3_PUBLIC: &str = include_str!("../fixtures/keys/v3_public.pem");
pub const V3_PRIVATE: &str = include_str!("../fixtures/keys/v3_private.pem");

pub const SHARED_SECRET: &str = "gateway-shared-secret";

pub fn material(version: u32) -> SigningKeyMaterial {
    let (public, private) = match version {
        1 => (V1_PUBLIC, V1_PRIVATE),
        2 => (V2_PUBLIC, V2_PRIVATE),
        3 => (V3_PUBLIC, V3_PRIVATE),
        other => panic!("no fixture for key version {other}"),
    };
    SigningKeyMaterial::from_text(version, public, Some(private)).expect("fixture key")
}

/// Source holding the given versions; the first one is active.
pub fn source_with(versions: &[u32]) -> Arc<InMemorySecretSource> {
    let source = Arc::new(InMemorySecretSource::new());
    for v in versions {
        source.insert(material(*v));
    }
    source
}

pub fn auth_settings() -> AuthSettings {
    AuthSettings {
        secret_source_timeout: Duration::from_millis(200),
        ..AuthSettings::default()
    }
}

pub fn registry(source: Arc<InMemorySecretSource>) -> AuthRegistry {
    AuthRegistry::new(source, &auth_settings())
}

pub fn service_state(registry: AuthRegistry) -> AppState {
    AppState::new(registry, Arc::new(InMemoryCredentialStore::with_hash_cost(4)))
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

/// Rewrite the payload with `edit` and keep the original signature.
pub fn tamper_payload(token: &str, edit: impl FnOnce(&mut serde_json::Value)) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.decode(parts[1]).expect("payload b64");
    let mut claims: serde_json::Value = serde_json::from_slice(&payload).expect("payload json");
    edit(&mut claims);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.{}", parts[0], payload, parts[2])
}

/// Flip one bit of the signature.
pub fn tamper_signature(token: &str) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    let mut signature = URL_SAFE_NO_PAD.decode(parts[2]).expect("signature b64");
    signature[0] ^= 0x01;
    format!("{}.{}.{}", parts[0], parts[1], URL_SAFE_NO_PAD.encode(signature))
}

/// Sign arbitrary claims with a fixture's private key.
pub fn sign_raw(version: u32, claims: &serde_json::Value) -> String {
    let material = material(version);
    let pem = material.private_key_pem.expect("private key");
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key");
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
        claims,
        &key,
    )
    .expect("sign")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
