// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{AuthRegistry, TrustSigner};
use crate::users::CredentialStore;

/// Gateway trust policy applied by the service.
#[derive(Clone, Debug, Default)]
pub struct TrustPolicy {
    /// Verifies `X-Gateway-Signature`; `None` when no shared secret is set
    pub signer: Option<TrustSigner>,
    /// Reject non-allow-listed requests without a valid signature
    pub require_signature: bool,
}

/// State shared by the user service handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthRegistry,
    pub users: Arc<dyn CredentialStore>,
    pub trust: TrustPolicy,
}

impl AppState {
    pub fn new(auth: AuthRegistry, users: Arc<dyn CredentialStore>) -> Self {
        Self {
            auth,
            users,
            trust: TrustPolicy::default(),
        }
    }

    pub fn with_trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }
}
