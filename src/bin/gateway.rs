// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Edge gateway: validates bearer tokens and forwards to the user service.

use std::time::Duration;

use bank_auth::auth::TrustSigner;
use bank_auth::config::{ConfigError, Settings, DEFAULT_GATEWAY_PORT, GATEWAY_SHARED_SECRET_ENV};
use bank_auth::gateway::{router, GatewayState};
use bank_auth::logging::init_tracing;
use bank_auth::startup::{build_registry, shutdown_signal, spawn_binding_sweeper, Role, StartupError};
use tokio_util::sync::CancellationToken;
use tracing::info;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let settings = Settings::from_env(DEFAULT_GATEWAY_PORT)?;
    init_tracing(settings.server.log_format);

    let secret = settings
        .trust
        .shared_secret
        .as_deref()
        .ok_or(ConfigError::Missing {
            name: GATEWAY_SHARED_SECRET_ENV,
        })?;
    let signer = TrustSigner::new(secret, settings.trust.max_age)?;

    let registry = build_registry(&settings, Role::Verifier)?;

    let shutdown = CancellationToken::new();
    let sweeper = spawn_binding_sweeper(registry.bindings.clone(), &settings, shutdown.clone());

    let state = GatewayState::new(
        registry,
        signer,
        settings.upstream_url.clone(),
        UPSTREAM_TIMEOUT,
    )?;
    let app = router(state);

    let addr = settings.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, upstream = %settings.upstream_url, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    info!("Gateway stopped");
    Ok(())
}
