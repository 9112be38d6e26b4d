// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret source abstraction and key material.
//!
//! A secret source holds the active signing key pair and every historical
//! version, addressable by version number. Implementations:
//!
//! - [`VaultSecretSource`](super::vault::VaultSecretSource) - HashiCorp Vault KV v2
//! - [`StaticSecretSource`] - a single key pair from configuration
//! - [`InMemorySecretSource`] - mutable versions for tests and local runs
//!
//! Sources never retry. Timeouts and fallback are applied one level up by
//! [`SecretsManager`](super::secrets::SecretsManager).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::config::LocalKeySettings;

/// Errors returned by a secret source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretSourceError {
    /// The store could not be reached or answered with a server error
    #[error("secret source unavailable: {0}")]
    Unavailable(String),

    /// The store has no key material for this version
    #[error("key version {0} not found")]
    NotFound(u32),

    /// The store answered but the key material is unusable
    #[error("malformed key material: {0}")]
    Malformed(String),
}

/// One generation of key material.
///
/// Immutable once fetched. Keys are stored as normalized PEM text.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKeyMaterial {
    pub version: u32,
    pub public_key_pem: String,
    /// Only present on the issuing side
    pub private_key_pem: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl std::fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyMaterial")
            .field("version", &self.version)
            .field("has_private_key", &self.private_key_pem.is_some())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

impl SigningKeyMaterial {
    /// Build key material from PEM or bare base64 DER text.
    ///
    /// Public keys are SubjectPublicKeyInfo, private keys PKCS#8. Both are
    /// parsed once here so that a bad key fails at fetch time rather than on
    /// the first request that needs it.
    pub fn from_text(
        version: u32,
        public_key: &str,
        private_key: Option<&str>,
    ) -> Result<Self, SecretSourceError> {
        let public_key_pem = normalize_key(public_key, "PUBLIC KEY")?;
        DecodingKey::from_rsa_pem(public_key_pem.as_bytes()).map_err(|e| {
            SecretSourceError::Malformed(format!("public key for version {version}: {e}"))
        })?;

        let private_key_pem = match private_key {
            Some(text) => {
                let pem = normalize_key(text, "PRIVATE KEY")?;
                EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    SecretSourceError::Malformed(format!("private key for version {version}: {e}"))
                })?;
                Some(pem)
            }
            None => None,
        };

        Ok(Self {
            version,
            public_key_pem,
            private_key_pem,
            fetched_at: Utc::now(),
        })
    }

    /// Copy without the private half.
    pub fn public_only(&self) -> Self {
        Self {
            private_key_pem: None,
            ..self.clone()
        }
    }
}

/// The currently active key material as seen by the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBundle {
    pub active: SigningKeyMaterial,
}

impl SecretBundle {
    pub fn version(&self) -> u32 {
        self.active.version
    }
}

/// Read API of the external key store.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the currently active key pair.
    async fn fetch_active(&self) -> Result<SecretBundle, SecretSourceError>;

    /// Fetch the key material of one specific version.
    async fn fetch_version(&self, version: u32) -> Result<SigningKeyMaterial, SecretSourceError>;
}

/// Normalize PEM or bare base64 DER to PEM text with the given label.
pub fn normalize_key(text: &str, label: &str) -> Result<String, SecretSourceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SecretSourceError::Malformed(format!("empty {label}")));
    }
    if trimmed.starts_with("-----BEGIN") {
        return Ok(trimmed.to_string());
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let der = Base64::decode_vec(&compact)
        .map_err(|e| SecretSourceError::Malformed(format!("{label} is not base64: {e}")))?;
    Ok(pem::encode(&pem::Pem::new(label, der)))
}

// =============================================================================
// Static source
// =============================================================================

/// A single key pair configured locally.
pub struct StaticSecretSource {
    material: SigningKeyMaterial,
}

impl StaticSecretSource {
    pub fn new(material: SigningKeyMaterial) -> Self {
        Self { material }
    }

    pub fn from_settings(settings: &LocalKeySettings) -> Result<Self, SecretSourceError> {
        let material = SigningKeyMaterial::from_text(
            settings.version,
            &settings.public_key,
            settings.private_key.as_deref(),
        )?;
        Ok(Self::new(material))
    }

    pub fn material(&self) -> &SigningKeyMaterial {
        &self.material
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn fetch_active(&self) -> Result<SecretBundle, SecretSourceError> {
        Ok(SecretBundle {
            active: self.material.clone(),
        })
    }

    async fn fetch_version(&self, version: u32) -> Result<SigningKeyMaterial, SecretSourceError> {
        if version == self.material.version {
            Ok(self.material.public_only())
        } else {
            Err(SecretSourceError::NotFound(version))
        }
    }
}

// =============================================================================
// In-memory source
// =============================================================================

#[derive(Default)]
struct InMemoryState {
    versions: BTreeMap<u32, SigningKeyMaterial>,
    active: Option<u32>,
    available: bool,
    delay: Option<Duration>,
}

/// Mutable secret source holding several versions.
///
/// Supports rotation, simulated outages and simulated latency. Fetches are
/// counted so callers can observe how often the store was hit.
pub struct InMemorySecretSource {
    state: Mutex<InMemoryState>,
    active_fetches: AtomicUsize,
    version_fetches: AtomicUsize,
}

impl Default for InMemorySecretSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySecretSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                available: true,
                ..InMemoryState::default()
            }),
            active_fetches: AtomicUsize::new(0),
            version_fetches: AtomicUsize::new(0),
        }
    }

    /// Store a version. The first inserted version becomes active.
    pub fn insert(&self, material: SigningKeyMaterial) {
        if let Ok(mut state) = self.state.lock() {
            let version = material.version;
            state.versions.entry(version).or_insert(material);
            if state.active.is_none() {
                state.active = Some(version);
            }
        }
    }

    /// Make an already inserted version the active one.
    pub fn rotate(&self, version: u32) -> Result<(), SecretSourceError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SecretSourceError::Unavailable("state poisoned".to_string()))?;
        if !state.versions.contains_key(&version) {
            return Err(SecretSourceError::NotFound(version));
        }
        state.active = Some(version);
        Ok(())
    }

    /// Simulate the store going down or coming back.
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.available = available;
        }
    }

    /// Delay every fetch by the given duration.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut state) = self.state.lock() {
            state.delay = delay;
        }
    }

    /// Number of `fetch_version` calls that reached this source.
    pub fn version_fetches(&self) -> usize {
        self.version_fetches.load(Ordering::SeqCst)
    }

    /// Number of `fetch_active` calls that reached this source.
    pub fn active_fetches(&self) -> usize {
        self.active_fetches.load(Ordering::SeqCst)
    }

    fn poisoned() -> SecretSourceError {
        SecretSourceError::Unavailable("state poisoned".to_string())
    }

    async fn pause(&self) -> Result<(), SecretSourceError> {
        let (delay, available) = {
            let state = self.state.lock().map_err(|_| Self::poisoned())?;
            (state.delay, state.available)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if available {
            Ok(())
        } else {
            Err(SecretSourceError::Unavailable("store offline".to_string()))
        }
    }
}

#[async_trait]
impl SecretSource for InMemorySecretSource {
    async fn fetch_active(&self) -> Result<SecretBundle, SecretSourceError> {
        self.active_fetches.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        let state = self.state.lock().map_err(|_| Self::poisoned())?;
        let version = state
            .active
            .ok_or_else(|| SecretSourceError::Malformed("no active key version".to_string()))?;
        let active = state
            .versions
            .get(&version)
            .cloned()
            .ok_or(SecretSourceError::NotFound(version))?;
        Ok(SecretBundle { active })
    }

    async fn fetch_version(&self, version: u32) -> Result<SigningKeyMaterial, SecretSourceError> {
        self.version_fetches.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        let state = self.state.lock().map_err(|_| Self::poisoned())?;
        state
            .versions
            .get(&version)
            .map(SigningKeyMaterial::public_only)
            .ok_or(SecretSourceError::NotFound(version))
    }
}

#[cfg(test)]
pub(crate) mod test_keys {
    use super::SigningKeyMaterial;

    pub const V1_PUBLIC: &str = include_str!("../../tests/fixtures/keys/v1_public.pem");
    pub const V1_PRIVATE: &str = include_str!("../../tests/fixtures/keys/v1_private.pem");
    pub const V2_PUBLIC: &str = include_str!("../../tests/fixtures/keys/v2_public.pem");
    pub const V2_PRIVATE: &str = include_str!("../../tests/fixtures/keys/v2_private.pem");

    pub fn material(version: u32) -> SigningKeyMaterial {
        let (public, private) = match version {
            1 => (V1_PUBLIC, V1_PRIVATE),
            _ => (V2_PUBLIC, V2_PRIVATE),
        };
        SigningKeyMaterial::from_text(version, public, Some(private)).unwrap()
    }
}
