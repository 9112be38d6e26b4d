// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Versioned-key bearer token authentication shared by the gateway and the
//! user service.
//!
//! ## Auth Flow
//!
//! 1. Client logs in at the user service and receives an ACCESS and a
//!    REFRESH token, both signed with the active key version and carrying
//!    that version in `ras_key_version`
//! 2. Client sends `Authorization: Bearer <token>` to the gateway
//! 3. Gateway:
//!    - Reads the version hint from the unverified payload
//!    - Resolves the verifier for that version from the secret store
//!    - Verifies signature, issuer, expiry and token type
//!    - Forwards with a fresh `requestId` and an `X-Gateway-Signature`
//! 4. User service repeats the full verification independently
//!
//! ## Security
//!
//! - The version hint selects a key; it is never trusted on its own
//! - Tokens signed with an older version stay valid after rotation
//! - Secret store reads time out and fall back to recently seen keys
//! - Verifiers and request bindings are bounded caches

pub mod bindings;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod issuer;
pub mod key_cache;
pub mod middleware;
pub mod registry;
pub mod renewal;
pub mod secret_source;
pub mod secrets;
pub mod trust;
pub mod validator;
pub mod vault;
pub mod version;

pub use claims::{AuthenticatedUser, TokenClaims, TokenType};
pub use error::AuthError;
pub use extractor::{Auth, Correlation};
pub use issuer::{TokenIssuer, TokenPair};
pub use registry::AuthRegistry;
pub use secret_source::{
    InMemorySecretSource, SecretSource, SecretSourceError, SigningKeyMaterial, StaticSecretSource,
};
pub use trust::TrustSigner;
pub use validator::{Outcome, RequestContext, TokenValidator};
pub use vault::VaultSecretSource;
