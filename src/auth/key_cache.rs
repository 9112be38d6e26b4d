// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-version verifier cache.
//!
//! Verifiers are built lazily from the public key of the version a token
//! names. The secret source is fetched outside the lock and the result is
//! published with insert-if-absent, so concurrent misses on one version all
//! end up holding the same instance.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use lru::LruCache;
use tracing::debug;

use super::claims::TokenClaims;
use super::error::AuthError;
use super::secrets::SecretsManager;

/// Signature checker bound to one version's public key.
pub struct Verifier {
    version: u32,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Verifier {
    pub fn from_public_pem(version: u32, public_key_pem: &str) -> Result<Self, AuthError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes()).map_err(|e| {
            AuthError::SecretSourceUnavailable(format!("public key for version {version}: {e}"))
        })?;
        Ok(Self {
            version,
            decoding_key,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Verify signature, issuer and expiry.
    ///
    /// Expiry is reported as [`AuthError::TokenExpired`] only after the
    /// signature has verified, so a forged expired token is never mistaken
    /// for a genuine one.
    pub fn verify(&self, token: &str, issuer: &str, leeway: u64) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = leeway;
        validation.validate_aud = false;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            })?;

        // The library accepts `exp == now`; a token is only valid strictly
        // before its expiry.
        let leeway = i64::try_from(leeway).unwrap_or(i64::MAX);
        if claims.exp.saturating_add(leeway) <= chrono::Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }
}

/// Registry of verifiers keyed by key version.
pub struct KeyCache {
    secrets: Arc<SecretsManager>,
    verifiers: Mutex<LruCache<u32, Arc<Verifier>>>,
}

impl KeyCache {
    pub fn new(secrets: Arc<SecretsManager>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            secrets,
            verifiers: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the verifier for `version`, building it on first use.
    pub async fn get_or_create_verifier(&self, version: u32) -> Result<Arc<Verifier>, AuthError> {
        if let Some(verifier) = self.cached(version) {
            return Ok(verifier);
        }

        let material = self.secrets.key_material(version).await?;
        let built = Arc::new(Verifier::from_public_pem(version, &material.public_key_pem)?);

        let mut verifiers = self
            .verifiers
            .lock()
            .map_err(|_| AuthError::Internal("verifier cache poisoned".to_string()))?;
        if let Some(existing) = verifiers.get(&version) {
            return Ok(existing.clone());
        }
        verifiers.put(version, built.clone());
        debug!(key_version = version, "Published verifier");
        Ok(built)
    }

    /// Number of cached verifiers.
    pub fn len(&self) -> usize {
        self.verifiers.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, version: u32) -> Option<Arc<Verifier>> {
        self.verifiers.lock().ok()?.get(&version).cloned()
    }
}
