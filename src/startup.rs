// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process wiring shared by the two binaries.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::bindings::{run_binding_sweeper, KeyBindings};
use crate::auth::trust::TrustError;
use crate::auth::{
    AuthRegistry, SecretSource, SecretSourceError, SigningKeyMaterial, StaticSecretSource,
    VaultSecretSource,
};
use crate::config::{ConfigError, Settings, SIGNING_PUBLIC_KEY_ENV};
use crate::gateway::GatewayError;

/// Errors that stop a binary from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("key source: {0}")]
    SecretSource(#[from] SecretSourceError),

    #[error("gateway trust key: {0}")]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

/// Which side of the token lifecycle a process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Issues and validates (user service)
    Issuer,
    /// Validates only (gateway)
    Verifier,
}

/// Build the authentication registry from settings.
///
/// Vault is used when configured; the locally configured key pair then only
/// seeds the outage fallback. Without Vault the local key pair is the source.
pub fn build_registry(settings: &Settings, role: Role) -> Result<AuthRegistry, StartupError> {
    let local = match &settings.local_key {
        Some(key) => Some(StaticSecretSource::from_settings(key)?),
        None => None,
    };
    let seed: Option<SigningKeyMaterial> = match (&local, role) {
        (Some(source), Role::Issuer) => Some(source.material().clone()),
        (Some(source), Role::Verifier) => Some(source.material().public_only()),
        (None, _) => None,
    };

    let source: Arc<dyn SecretSource> = match (&settings.vault, local) {
        (Some(vault), _) => {
            let source = VaultSecretSource::new(vault, settings.auth.secret_source_timeout)?;
            info!(url = %source.secret_url(), "Using Vault key source");
            match role {
                Role::Issuer => Arc::new(source),
                Role::Verifier => Arc::new(source.public_only()),
            }
        }
        (None, Some(local)) => {
            warn!("No Vault configured, using the locally configured key pair");
            Arc::new(local)
        }
        (None, None) => {
            return Err(ConfigError::Missing {
                name: SIGNING_PUBLIC_KEY_ENV,
            }
            .into())
        }
    };

    Ok(AuthRegistry::with_seed(source, &settings.auth, seed))
}

/// Start the binding sweeper; it runs until `shutdown` is cancelled.
pub fn spawn_binding_sweeper(
    bindings: Arc<KeyBindings>,
    settings: &Settings,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let interval = settings.auth.binding_ttl.max(std::time::Duration::from_secs(1));
    tokio::spawn(run_binding_sweeper(bindings, interval, shutdown))
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
pub async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::secret_source::test_keys::{V1_PRIVATE, V1_PUBLIC};
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(9491, |name| map.get(name).cloned()).unwrap()
    }

    #[test]
    fn requires_some_key_source() {
        let err = build_registry(&settings(&[]), Role::Issuer).err().unwrap();
        assert!(matches!(
            err,
            StartupError::Config(ConfigError::Missing { name: SIGNING_PUBLIC_KEY_ENV })
        ));
    }

    #[tokio::test]
    async fn local_key_pair_is_used_without_vault() {
        let settings = settings(&[
            ("SIGNING_PUBLIC_KEY", V1_PUBLIC),
            ("SIGNING_PRIVATE_KEY", V1_PRIVATE),
            ("SIGNING_KEY_VERSION", "4"),
        ]);
        let registry = build_registry(&settings, Role::Issuer).unwrap();
        let pair = registry.issuer.issue_pair("alice", &[]).await.unwrap();
        let user = registry
            .validator
            .validate(
                &pair.access_token,
                crate::auth::TokenType::Access,
                &crate::auth::RequestContext::fresh(),
            )
            .await
            .unwrap();
        assert_eq!(user.key_version, 4);
    }

    #[tokio::test]
    async fn shutdown_signal_returns_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        shutdown_signal(token.clone()).await;
        assert!(token.is_cancelled());
    }
}
