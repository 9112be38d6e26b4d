// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key version hint extraction.
//!
//! ## Security
//!
//! Reading `ras_key_version` here is **not** a security check. The payload is
//! decoded without verifying the signature, so a forged token can name any
//! version it likes. The value only selects which verifier to try; the trust
//! boundary is the signature verification that follows, which fails unless
//! the token was actually signed by that version's private key.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::Value;

use super::claims::{key_version_from_value, KEY_VERSION_CLAIM};
use super::error::AuthError;

/// Extract the unverified key version named by a token's payload.
///
/// Accepts the version as a JSON integer or as a numeric string. Anything else
/// (wrong segment count, bad base64, non-JSON payload, missing or negative
/// version) is [`AuthError::MalformedToken`].
pub fn extract_version_hint(token: &str) -> Result<u32, AuthError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken);
    };

    // Tolerate padded input even though JWTs are unpadded on the wire.
    let payload = payload.trim_end_matches('=');
    let bytes = Base64UrlUnpadded::decode_vec(payload).map_err(|_| AuthError::MalformedToken)?;
    let claims: Value = serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)?;

    claims
        .get(KEY_VERSION_CLAIM)
        .and_then(key_version_from_value)
        .ok_or(AuthError::MalformedToken)
}
