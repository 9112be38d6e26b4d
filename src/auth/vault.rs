// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HashiCorp Vault KV v2 secret source.
//!
//! The key pair lives at `{backend}/data/{application}` with fields
//! `private_key` and `public_key`; the KV version number is the key version.
//! A specific generation is read with `?version=N`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::secret_source::{SecretBundle, SecretSource, SecretSourceError, SigningKeyMaterial};
use crate::config::VaultSettings;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Deserialize)]
struct KvResponse {
    data: KvData,
}

#[derive(Debug, Deserialize)]
struct KvData {
    /// Null for deleted or destroyed versions
    data: Option<KeyPairFields>,
    metadata: KvMetadata,
}

#[derive(Debug, Deserialize)]
struct KeyPairFields {
    public_key: String,
    #[serde(default)]
    private_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KvMetadata {
    version: u32,
}

/// Vault-backed secret source.
#[derive(Clone)]
pub struct VaultSecretSource {
    secret_url: Url,
    token: String,
    client: reqwest::Client,
    /// Whether to hand out the private half (issuer side only)
    include_private: bool,
}

impl VaultSecretSource {
    /// Create a source reading `{addr}/v1/{backend}/data/{application}`.
    pub fn new(settings: &VaultSettings, timeout: Duration) -> Result<Self, SecretSourceError> {
        let path = format!(
            "v1/{}/data/{}",
            settings.kv_backend.trim_matches('/'),
            settings.application_name.trim_matches('/')
        );
        let secret_url = settings
            .addr
            .join(&path)
            .map_err(|e| SecretSourceError::Malformed(format!("vault url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SecretSourceError::Unavailable(format!("http client: {e}")))?;

        Ok(Self {
            secret_url,
            token: settings.token.clone(),
            client,
            include_private: true,
        })
    }

    /// Never return private keys from this source.
    pub fn public_only(mut self) -> Self {
        self.include_private = false;
        self
    }

    pub fn secret_url(&self) -> &Url {
        &self.secret_url
    }

    async fn read(&self, version: Option<u32>) -> Result<SigningKeyMaterial, SecretSourceError> {
        let mut url = self.secret_url.clone();
        if let Some(v) = version {
            url.query_pairs_mut().append_pair("version", &v.to_string());
        }

        let response = self
            .client
            .get(url)
            .header(VAULT_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| SecretSourceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return match version {
                Some(v) => Err(SecretSourceError::NotFound(v)),
                None => Err(SecretSourceError::Malformed(
                    "no key pair stored at the configured path".to_string(),
                )),
            };
        }
        if !status.is_success() {
            return Err(SecretSourceError::Unavailable(format!(
                "HTTP {status} from Vault"
            )));
        }

        let body: KvResponse = response
            .json()
            .await
            .map_err(|e| SecretSourceError::Malformed(e.to_string()))?;
        let stored_version = body.data.metadata.version;

        if let Some(requested) = version {
            if stored_version != requested {
                return Err(SecretSourceError::Malformed(format!(
                    "asked for version {requested}, Vault returned {stored_version}"
                )));
            }
        }

        let fields = body
            .data
            .data
            .ok_or(SecretSourceError::NotFound(stored_version))?;

        debug!(key_version = stored_version, "Read key pair from Vault");

        let private_key = if self.include_private {
            fields.private_key.as_deref()
        } else {
            None
        };
        SigningKeyMaterial::from_text(stored_version, &fields.public_key, private_key)
    }
}

#[async_trait]
impl SecretSource for VaultSecretSource {
    async fn fetch_active(&self) -> Result<SecretBundle, SecretSourceError> {
        let active = self.read(None).await?;
        Ok(SecretBundle { active })
    }

    async fn fetch_version(&self, version: u32) -> Result<SigningKeyMaterial, SecretSourceError> {
        self.read(Some(version))
            .await
            .map(|material| material.public_only())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(addr: &str, backend: &str) -> VaultSettings {
        VaultSettings {
            addr: Url::parse(addr).unwrap(),
            token: "root".to_string(),
            kv_backend: backend.to_string(),
            application_name: "user-service".to_string(),
        }
    }

    #[test]
    fn builds_kv_v2_data_path() {
        let source =
            VaultSecretSource::new(&settings("http://vault:8200", "/secret/"), Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            source.secret_url().as_str(),
            "http://vault:8200/v1/secret/data/user-service"
        );
    }

    #[test]
    fn parses_kv_v2_payload() {
        let body: KvResponse = serde_json::from_value(serde_json::json!({
            "data": {
                "data": { "public_key": "pub", "private_key": "priv" },
                "metadata": { "version": 7, "created_time": "2026-01-01T00:00:00Z" }
            }
        }))
        .unwrap();
        assert_eq!(body.data.metadata.version, 7);
        assert_eq!(body.data.data.unwrap().private_key.as_deref(), Some("priv"));
    }

    #[test]
    fn deleted_version_has_no_data() {
        let body: KvResponse = serde_json::from_value(serde_json::json!({
            "data": { "data": null, "metadata": { "version": 3 } }
        }))
        .unwrap();
        assert!(body.data.data.is_none());
    }

    #[tokio::test]
    async fn unreachable_vault_is_unavailable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let source =
            VaultSecretSource::new(&settings("http://127.0.0.1:9", "secret"), Duration::from_millis(500))
                .unwrap();
        assert!(matches!(
            source.fetch_version(1).await,
            Err(SecretSourceError::Unavailable(_))
        ));
    }
}
