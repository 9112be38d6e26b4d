// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Timeout and fallback policy in front of a [`SecretSource`].
//!
//! Every fetch carries an explicit timeout. When the source is unavailable
//! (timeout included) the last observed value is served from a small local
//! cache; with nothing cached the call fails with
//! [`AuthError::SecretSourceUnavailable`]. There is no retry.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tracing::{debug, warn};

use super::error::AuthError;
use super::secret_source::{SecretBundle, SecretSource, SecretSourceError, SigningKeyMaterial};

/// Secret source wrapper owning the fallback state.
pub struct SecretsManager {
    source: Arc<dyn SecretSource>,
    timeout: Duration,
    /// Last active bundle observed, served while the source is down
    last_active: Mutex<Option<SecretBundle>>,
    /// Public key material by version, served while the source is down
    fallback: Mutex<LruCache<u32, SigningKeyMaterial>>,
}

impl SecretsManager {
    pub fn new(source: Arc<dyn SecretSource>, timeout: Duration, fallback_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(fallback_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            timeout,
            last_active: Mutex::new(None),
            fallback: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Seed the fallback with locally configured key material.
    ///
    /// Used at boot so issuance works even if the store is down from the
    /// start. A value later fetched from the source replaces it.
    pub fn with_seed(self, material: SigningKeyMaterial) -> Self {
        self.remember(&material);
        if let Ok(mut last) = self.last_active.lock() {
            *last = Some(SecretBundle { active: material });
        }
        self
    }

    /// Current active key pair, degrading to the last observed one.
    pub async fn active_bundle(&self) -> Result<SecretBundle, AuthError> {
        match self.guarded(self.source.fetch_active()).await {
            Ok(bundle) => {
                self.remember(&bundle.active);
                if let Ok(mut last) = self.last_active.lock() {
                    *last = Some(bundle.clone());
                }
                Ok(bundle)
            }
            Err(SecretSourceError::Unavailable(reason)) => {
                let cached = self.last_active.lock().ok().and_then(|last| last.clone());
                match cached {
                    Some(bundle) => {
                        warn!(
                            key_version = bundle.version(),
                            reason = %reason,
                            "Secret source unavailable, issuing with cached key"
                        );
                        Ok(bundle)
                    }
                    None => Err(AuthError::SecretSourceUnavailable(reason)),
                }
            }
            Err(e) => Err(AuthError::Internal(e.to_string())),
        }
    }

    /// Public key material of one version, degrading to the fallback cache.
    pub async fn key_material(&self, version: u32) -> Result<SigningKeyMaterial, AuthError> {
        match self.guarded(self.source.fetch_version(version)).await {
            Ok(material) => {
                self.remember(&material);
                Ok(material)
            }
            Err(SecretSourceError::NotFound(v)) => Err(AuthError::UnknownKeyVersion(v)),
            Err(SecretSourceError::Unavailable(reason)) => {
                let cached = self
                    .fallback
                    .lock()
                    .ok()
                    .and_then(|mut fallback| fallback.get(&version).cloned());
                match cached {
                    Some(material) => {
                        debug!(key_version = version, "Serving key material from fallback");
                        Ok(material)
                    }
                    None => Err(AuthError::SecretSourceUnavailable(reason)),
                }
            }
            Err(SecretSourceError::Malformed(reason)) => {
                warn!(key_version = version, reason = %reason, "Unusable key material");
                Err(AuthError::SecretSourceUnavailable(reason))
            }
        }
    }

    /// Apply the fetch timeout; elapsed counts as unavailable.
    async fn guarded<T>(
        &self,
        fetch: impl std::future::Future<Output = Result<T, SecretSourceError>>,
    ) -> Result<T, SecretSourceError> {
        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(SecretSourceError::Unavailable(format!(
                "no answer within {} ms",
                self.timeout.as_millis()
            ))),
        }
    }

    fn remember(&self, material: &SigningKeyMaterial) {
        if let Ok(mut fallback) = self.fallback.lock() {
            fallback.put(material.version, material.public_only());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::secret_source::test_keys::material;
    use super::super::secret_source::InMemorySecretSource;
    use super::*;

    fn manager(source: Arc<InMemorySecretSource>, fallback: usize) -> SecretsManager {
        SecretsManager::new(source, Duration::from_millis(100), fallback)
    }

    #[tokio::test]
    async fn active_bundle_degrades_to_last_seen() {
        let source = Arc::new(InMemorySecretSource::new());
        source.insert(material(1));
        let secrets = manager(source.clone(), 4);

        assert_eq!(secrets.active_bundle().await.unwrap().version(), 1);
        source.set_available(false);
        let bundle = secrets.active_bundle().await.unwrap();
        assert_eq!(bundle.version(), 1);
        assert!(bundle.active.private_key_pem.is_some());
    }

    #[tokio::test]
    async fn active_bundle_without_history_is_unavailable() {
        let source = Arc::new(InMemorySecretSource::new());
        source.insert(material(1));
        source.set_available(false);
        let secrets = manager(source, 4);
        assert!(matches!(
            secrets.active_bundle().await,
            Err(AuthError::SecretSourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn seed_covers_boot_time_outage() {
        let source = Arc::new(InMemorySecretSource::new());
        source.set_available(false);
        let secrets = manager(source, 4).with_seed(material(2));
        assert_eq!(secrets.active_bundle().await.unwrap().version(), 2);
        assert_eq!(secrets.key_material(2).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn unknown_version_is_not_masked_by_fallback() {
        let source = Arc::new(InMemorySecretSource::new());
        source.insert(material(1));
        let secrets = manager(source, 4);
        assert_eq!(
            secrets.key_material(5).await.unwrap_err(),
            AuthError::UnknownKeyVersion(5)
        );
    }

    #[tokio::test]
    async fn version_fetch_uses_fallback_when_offline() {
        let source = Arc::new(InMemorySecretSource::new());
        source.insert(material(1));
        source.insert(material(2));
        let secrets = manager(source.clone(), 4);

        secrets.key_material(1).await.unwrap();
        source.set_available(false);
        assert_eq!(secrets.key_material(1).await.unwrap().version, 1);
        assert!(matches!(
            secrets.key_material(2).await,
            Err(AuthError::SecretSourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let source = Arc::new(InMemorySecretSource::new());
        source.insert(material(1));
        source.set_delay(Some(Duration::from_millis(500)));
        let secrets = manager(source, 4);
        assert!(matches!(
            secrets.key_material(1).await,
            Err(AuthError::SecretSourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn fallback_is_bounded() {
        let source = Arc::new(InMemorySecretSource::new());
        source.insert(material(1));
        source.insert(material(2));
        let secrets = manager(source.clone(), 1);

        secrets.key_material(1).await.unwrap();
        secrets.key_material(2).await.unwrap();
        source.set_available(false);
        assert!(secrets.key_material(1).await.is_err());
        assert!(secrets.key_material(2).await.is_ok());
    }
}
