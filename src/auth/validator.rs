// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token validation.
//!
//! One request moves through these steps in order:
//!
//! 1. **Bypass** - allow-listed paths are let through without a token
//! 2. **Extraction** - `Authorization: Bearer <token>` is required
//! 3. **Version** - the request's existing key binding, or else the token's
//!    unverified version hint
//! 4. **Verifier** - resolved through the [`KeyCache`]
//! 5. **Verification** - signature, issuer, expiry, then token type
//! 6. **Binding** - the verified version is published for the correlation id
//!
//! The result is an [`Outcome`]. Turning a rejection into an HTTP response is
//! left to the caller.

use std::sync::Arc;

use axum::http::HeaderValue;
use tracing::debug;
use uuid::Uuid;

use super::bindings::KeyBindings;
use super::claims::{AuthenticatedUser, TokenType};
use super::error::AuthError;
use super::key_cache::KeyCache;
use super::version::extract_version_hint;
use crate::config::AuthSettings;

/// Per-request values threaded through validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
        }
    }

    /// Context with a newly generated correlation id.
    pub fn fresh() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

/// Result of running a request through the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Allow-listed path; no identity attached
    Bypassed,
    /// Token verified; identity to attach to the request
    Accepted(AuthenticatedUser),
    /// Terminal rejection
    Rejected(AuthError),
}

/// Paths that skip authentication.
///
/// A path matches an entry when it is equal to it or continues it with a
/// `/`, so `/health` covers `/health/ready` but not `/healthz`.
#[derive(Debug, Clone, Default)]
pub struct BypassList {
    prefixes: Vec<String>,
}

impl BypassList {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = paths
            .into_iter()
            .map(|p| p.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let value = header
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::MalformedToken);
    }
    Ok(token)
}

/// Verifies bearer tokens against the key version they were signed with.
pub struct TokenValidator {
    keys: Arc<KeyCache>,
    bindings: Arc<KeyBindings>,
    bypass: BypassList,
    issuer: String,
    leeway: u64,
}

impl TokenValidator {
    pub fn new(keys: Arc<KeyCache>, bindings: Arc<KeyBindings>, settings: &AuthSettings) -> Self {
        Self {
            keys,
            bindings,
            bypass: BypassList::new(&settings.bypass_paths),
            issuer: settings.issuer.clone(),
            leeway: settings.leeway.as_secs(),
        }
    }

    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass.matches(path)
    }

    /// Run the full per-request sequence for an API call.
    pub async fn authorize(
        &self,
        path: &str,
        authorization: Option<&HeaderValue>,
        ctx: &RequestContext,
    ) -> Outcome {
        if self.is_bypassed(path) {
            return Outcome::Bypassed;
        }

        let token = match bearer_token(authorization) {
            Ok(token) => token,
            Err(e) => return Outcome::Rejected(e),
        };

        match self.validate(token, TokenType::Access, ctx).await {
            Ok(user) => Outcome::Accepted(user),
            Err(e) => {
                debug!(
                    request_id = %ctx.correlation_id,
                    path = %path,
                    error_code = e.error_code(),
                    "Token rejected"
                );
                Outcome::Rejected(e)
            }
        }
    }

    /// Verify `token` and require it to be of type `expected`.
    pub async fn validate(
        &self,
        token: &str,
        expected: TokenType,
        ctx: &RequestContext,
    ) -> Result<AuthenticatedUser, AuthError> {
        let version = match self.bindings.lookup(&ctx.correlation_id) {
            Some(bound) => bound,
            None => extract_version_hint(token)?,
        };

        let verifier = self.keys.get_or_create_verifier(version).await?;
        let claims = verifier.verify(token, &self.issuer, self.leeway)?;

        // Only reachable with a genuine signature from `version`'s key.
        if claims.key_version != version {
            return Err(AuthError::MalformedToken);
        }
        if claims.token_type != expected {
            return Err(AuthError::WrongTokenType);
        }

        self.bindings.publish(&ctx.correlation_id, version);
        Ok(AuthenticatedUser::from_claims(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_matches_whole_segments() {
        let bypass = BypassList::new(["/health", "/v1/api/authenticate", "/eureka/"]);
        assert!(bypass.matches("/health"));
        assert!(bypass.matches("/health/ready"));
        assert!(bypass.matches("/eureka/apps"));
        assert!(bypass.matches("/v1/api/authenticate"));
        assert!(!bypass.matches("/healthz"));
        assert!(!bypass.matches("/v1/api/user/me"));
        assert!(!bypass.matches("/v1/api/authenticated-admin"));
    }

    #[test]
    fn empty_entries_are_ignored() {
        let bypass = BypassList::new(["", "  ", "/"]);
        assert!(!bypass.matches("/anything"));
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(None), Err(AuthError::MissingAuthHeader));

        let basic = HeaderValue::from_static("Basic abc");
        assert_eq!(bearer_token(Some(&basic)), Err(AuthError::InvalidAuthHeader));

        let empty = HeaderValue::from_static("Bearer   ");
        assert_eq!(bearer_token(Some(&empty)), Err(AuthError::MalformedToken));

        let good = HeaderValue::from_static("Bearer a.b.c");
        assert_eq!(bearer_token(Some(&good)), Ok("a.b.c"));
    }

    #[test]
    fn fresh_contexts_are_unique() {
        assert_ne!(RequestContext::fresh(), RequestContext::fresh());
    }
}
