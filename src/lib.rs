// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bank Auth - Versioned-Key Token Authentication
//!
//! Issues and verifies RS256 bearer tokens for the banking services. The
//! signing key can be rotated in the secret store at any time; tokens name
//! the key version they were signed with and stay valid until they expire.
//!
//! ## Modules
//!
//! - `auth` - Token issuance, versioned-key verification, trust signatures
//! - `api` - User service HTTP handlers (Axum)
//! - `gateway` - Edge gateway that validates and forwards
//! - `users` - Credential directory used by login and registration
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod startup;
pub mod state;
pub mod users;
