// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance.
//!
//! Tokens are always signed with the currently active key version. The
//! encoding key of that version is kept and rebuilt only when the active
//! version changes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use super::claims::{TokenClaims, TokenType, SCOPE_TOKEN_RENEW, SCOPE_USER_ADD};
use super::error::AuthError;
use super::secret_source::SecretBundle;
use super::secrets::SecretsManager;
use crate::config::AuthSettings;

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub key_version: u32,
    pub expires_at: i64,
}

/// Access and refresh token returned by login.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints access and refresh tokens.
pub struct TokenIssuer {
    secrets: Arc<SecretsManager>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    encoder: Mutex<Option<(u32, Arc<EncodingKey>)>>,
}

impl TokenIssuer {
    pub fn new(secrets: Arc<SecretsManager>, settings: &AuthSettings) -> Self {
        Self {
            secrets,
            issuer: settings.issuer.clone(),
            access_ttl: settings.access_token_ttl,
            refresh_ttl: settings.refresh_token_ttl,
            encoder: Mutex::new(None),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue a token valid from now for `ttl`.
    pub async fn issue(
        &self,
        principal: &str,
        authorities: &[String],
        token_type: TokenType,
        ttl: Duration,
        scope: &str,
    ) -> Result<IssuedToken, AuthError> {
        let now = chrono::Utc::now().timestamp();
        self.issue_at(now, principal, authorities, token_type, ttl, scope)
            .await
    }

    /// Issue a token as if the current time were `now` (Unix seconds).
    pub async fn issue_at(
        &self,
        now: i64,
        principal: &str,
        authorities: &[String],
        token_type: TokenType,
        ttl: Duration,
        scope: &str,
    ) -> Result<IssuedToken, AuthError> {
        let bundle = self.secrets.active_bundle().await?;
        let key = self.encoding_key(&bundle)?;
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| AuthError::Internal("token ttl out of range".to_string()))?;

        let claims = TokenClaims {
            sub: principal.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + ttl_secs,
            token_type,
            key_version: bundle.version(),
            scope: scope.to_string(),
            authorities: authorities.to_vec(),
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| AuthError::Internal(format!("signing failed: {e}")))?;

        debug!(
            subject = %principal,
            token_type = %token_type,
            key_version = claims.key_version,
            "Issued token"
        );

        Ok(IssuedToken {
            token,
            key_version: claims.key_version,
            expires_at: claims.exp,
        })
    }

    /// Issue the access and refresh token handed out at login.
    pub async fn issue_pair(
        &self,
        principal: &str,
        authorities: &[String],
    ) -> Result<TokenPair, AuthError> {
        let access = self
            .issue(principal, authorities, TokenType::Access, self.access_ttl, SCOPE_USER_ADD)
            .await?;
        let refresh = self
            .issue(
                principal,
                authorities,
                TokenType::Refresh,
                self.refresh_ttl,
                SCOPE_TOKEN_RENEW,
            )
            .await?;
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Encoding key for the bundle's version, reusing the cached one.
    fn encoding_key(&self, bundle: &SecretBundle) -> Result<Arc<EncodingKey>, AuthError> {
        let version = bundle.version();
        if let Ok(cached) = self.encoder.lock() {
            if let Some((cached_version, key)) = cached.as_ref() {
                if *cached_version == version {
                    return Ok(key.clone());
                }
            }
        }

        let private_pem = bundle.active.private_key_pem.as_deref().ok_or_else(|| {
            AuthError::Internal(format!("active key version {version} has no private key"))
        })?;
        let key = Arc::new(
            EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|e| AuthError::Internal(format!("private key: {e}")))?,
        );

        if let Ok(mut cached) = self.encoder.lock() {
            *cached = Some((version, key.clone()));
        }
        info!(key_version = version, "Signing with key version");
        Ok(key)
    }
}
