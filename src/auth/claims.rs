// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and authenticated user representation.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Scope written into access tokens.
pub const SCOPE_USER_ADD: &str = "user:add";

/// Scope written into refresh tokens.
pub const SCOPE_TOKEN_RENEW: &str = "token:renew";

/// Claim carrying the key version. The spelling is part of the wire format.
pub const KEY_VERSION_CLAIM: &str = "ras_key_version";

/// Token type claim.
///
/// ACCESS tokens authorize API calls; REFRESH tokens only mint new ACCESS
/// tokens through the renewal endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "ACCESS"),
            TokenType::Refresh => write!(f, "REFRESH"),
        }
    }
}

/// Claims carried by every token this crate issues.
///
/// `ras_key_version` is only trustworthy after the signature has been
/// verified with that version's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal identifier
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
    pub token_type: TokenType,
    #[serde(rename = "ras_key_version", deserialize_with = "deserialize_key_version")]
    pub key_version: u32,
    pub scope: String,
    /// Authorities snapshot taken at issuance, in order
    #[serde(default)]
    pub authorities: Vec<String>,
}

/// Read a key version written as a JSON integer or a numeric string.
pub fn key_version_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn deserialize_key_version<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    key_version_from_value(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("{KEY_VERSION_CLAIM} must be a non-negative integer"))
    })
}

/// Authenticated user information extracted from a verified token.
///
/// This is the identity handed to handlers; nothing in it comes from an
/// unverified source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Principal identifier (`sub` claim)
    pub user_id: String,

    /// Authorities granted at issuance
    pub authorities: Vec<String>,

    /// Key version that verified the token
    pub key_version: u32,

    /// Token expiration (Unix timestamp)
    pub expires_at: i64,

    /// Issuer (not serialized)
    #[serde(skip)]
    pub issuer: String,
}

impl AuthenticatedUser {
    /// Create from verified claims.
    pub fn from_claims(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            authorities: claims.authorities,
            key_version: claims.key_version,
            expires_at: claims.exp,
            issuer: claims.iss,
        }
    }
}
