// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User service: login, registration, token renewal.

use std::sync::Arc;

use bank_auth::api::router;
use bank_auth::auth::TrustSigner;
use bank_auth::config::{Settings, DEFAULT_SERVICE_PORT};
use bank_auth::logging::init_tracing;
use bank_auth::startup::{build_registry, shutdown_signal, spawn_binding_sweeper, Role, StartupError};
use bank_auth::state::{AppState, TrustPolicy};
use bank_auth::users::InMemoryCredentialStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let settings = Settings::from_env(DEFAULT_SERVICE_PORT)?;
    init_tracing(settings.server.log_format);

    let registry = build_registry(&settings, Role::Issuer)?;

    let signer = match &settings.trust.shared_secret {
        Some(secret) => Some(TrustSigner::new(secret, settings.trust.max_age)?),
        None => {
            if settings.trust.require_signature {
                warn!("REQUIRE_GATEWAY_SIGNATURE is set without GATEWAY_SHARED_SECRET; all protected requests will be rejected");
            }
            None
        }
    };
    let trust = TrustPolicy {
        signer,
        require_signature: settings.trust.require_signature,
    };

    let shutdown = CancellationToken::new();
    let sweeper = spawn_binding_sweeper(registry.bindings.clone(), &settings, shutdown.clone());

    let state = AppState::new(registry, Arc::new(InMemoryCredentialStore::new())).with_trust(trust);
    let app = router(state);

    let addr = settings.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "User service listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    info!("User service stopped");
    Ok(())
}
