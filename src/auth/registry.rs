// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared authentication state, built once per process.
//!
//! The registry owns the verifier cache and the request bindings and hands
//! out the issuer and validator built on them. Tests build their own
//! instance, so nothing leaks between them.

use std::sync::Arc;

use super::bindings::KeyBindings;
use super::issuer::TokenIssuer;
use super::key_cache::KeyCache;
use super::secret_source::{SecretSource, SigningKeyMaterial};
use super::secrets::SecretsManager;
use super::validator::TokenValidator;
use crate::config::AuthSettings;

#[derive(Clone)]
pub struct AuthRegistry {
    pub secrets: Arc<SecretsManager>,
    pub keys: Arc<KeyCache>,
    pub bindings: Arc<KeyBindings>,
    pub issuer: Arc<TokenIssuer>,
    pub validator: Arc<TokenValidator>,
}

impl AuthRegistry {
    pub fn new(source: Arc<dyn SecretSource>, settings: &AuthSettings) -> Self {
        Self::with_seed(source, settings, None)
    }

    /// Build with locally configured key material as the outage fallback.
    pub fn with_seed(
        source: Arc<dyn SecretSource>,
        settings: &AuthSettings,
        seed: Option<SigningKeyMaterial>,
    ) -> Self {
        let mut secrets = SecretsManager::new(
            source,
            settings.secret_source_timeout,
            settings.key_fallback_capacity,
        );
        if let Some(material) = seed {
            secrets = secrets.with_seed(material);
        }
        let secrets = Arc::new(secrets);

        let keys = Arc::new(KeyCache::new(secrets.clone(), settings.key_cache_capacity));
        let bindings = Arc::new(KeyBindings::new(
            settings.binding_capacity,
            settings.binding_ttl,
        ));
        let issuer = Arc::new(TokenIssuer::new(secrets.clone(), settings));
        let validator = Arc::new(TokenValidator::new(keys.clone(), bindings.clone(), settings));

        Self {
            secrets,
            keys,
            bindings,
            issuer,
            validator,
        }
    }
}
