// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway trust signature.
//!
//! The gateway signs every forwarded request with a key shared with the
//! backend services:
//!
//! ```text
//! X-Gateway-Signature: t=<unix millis>,v1=<base64 HMAC-SHA256>
//! ```
//!
//! The MAC covers `t:requestId:METHOD:path`, so a captured header cannot be
//! replayed onto another request id, method or path, and the service rejects
//! signatures older than the configured maximum age.

use std::time::Duration;

use axum::http::HeaderName;
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `X-Gateway-Signature`, carrying the trust signature.
pub const GATEWAY_SIGNATURE_HEADER: HeaderName = HeaderName::from_static("x-gateway-signature");

/// `requestId`, carrying the gateway-generated correlation id.
///
/// Header names are case-insensitive; `HeaderName` stores them lowercased.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("requestid");

/// Reasons a trust signature is not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    #[error("trust signature header missing")]
    Missing,
    #[error("trust signature header malformed")]
    Malformed,
    #[error("trust signature outside the accepted time window")]
    Stale,
    #[error("trust signature does not match")]
    Mismatch,
    #[error("trust signature key is empty")]
    EmptyKey,
}

/// Signs and verifies gateway trust signatures.
#[derive(Clone)]
pub struct TrustSigner {
    keyed: HmacSha256,
    max_age: Duration,
}

impl std::fmt::Debug for TrustSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustSigner")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl TrustSigner {
    pub fn new(secret: impl AsRef<[u8]>, max_age: Duration) -> Result<Self, TrustError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TrustError::EmptyKey);
        }
        let keyed = HmacSha256::new_from_slice(secret).map_err(|_| TrustError::EmptyKey)?;
        Ok(Self { keyed, max_age })
    }

    /// Header value for a request sent at `timestamp_ms`.
    pub fn sign(&self, timestamp_ms: i64, request_id: &str, method: &str, path: &str) -> String {
        let mac = self.mac(timestamp_ms, request_id, method, path);
        format!(
            "t={timestamp_ms},v1={}",
            Base64::encode_string(&mac.finalize().into_bytes())
        )
    }

    /// Header value for a request sent now.
    pub fn sign_now(&self, request_id: &str, method: &str, path: &str) -> String {
        self.sign(now_millis(), request_id, method, path)
    }

    /// Verify a header value against the request it arrived on.
    pub fn verify(
        &self,
        header: Option<&str>,
        request_id: &str,
        method: &str,
        path: &str,
        now_ms: i64,
    ) -> Result<(), TrustError> {
        let header = header.ok_or(TrustError::Missing)?;
        let (timestamp_ms, signature) = parse_header(header)?;

        // `t` is attacker-controlled; an unrepresentable age is stale.
        let age_ms = now_ms
            .checked_sub(timestamp_ms)
            .map(i64::unsigned_abs)
            .ok_or(TrustError::Stale)?;
        if u128::from(age_ms) > self.max_age.as_millis() {
            return Err(TrustError::Stale);
        }

        self.mac(timestamp_ms, request_id, method, path)
            .verify_slice(&signature)
            .map_err(|_| TrustError::Mismatch)
    }

    fn mac(&self, timestamp_ms: i64, request_id: &str, method: &str, path: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(format!("{timestamp_ms}:{request_id}:{method}:{path}").as_bytes());
        mac
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<u8>), TrustError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = Base64::decode_vec(value).ok(),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(t), Some(s)) => Ok((t, s)),
        _ => Err(TrustError::Malformed),
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;

    fn signer() -> TrustSigner {
        TrustSigner::new("shared-secret", Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn signature_verifies_for_same_request() {
        let header = signer().sign(NOW, "req-1", "GET", "/v1/api/user/me");
        assert!(header.starts_with(&format!("t={NOW},v1=")));
        assert_eq!(
            signer().verify(Some(&header), "req-1", "GET", "/v1/api/user/me", NOW + 1_000),
            Ok(())
        );
    }

    #[test]
    fn signature_is_bound_to_request() {
        let header = signer().sign(NOW, "req-1", "GET", "/a");
        assert_eq!(
            signer().verify(Some(&header), "req-2", "GET", "/a", NOW),
            Err(TrustError::Mismatch)
        );
        assert_eq!(
            signer().verify(Some(&header), "req-1", "POST", "/a", NOW),
            Err(TrustError::Mismatch)
        );
        assert_eq!(
            signer().verify(Some(&header), "req-1", "GET", "/b", NOW),
            Err(TrustError::Mismatch)
        );
    }

    #[test]
    fn other_secret_does_not_verify() {
        let header = TrustSigner::new("other", Duration::from_secs(30))
            .unwrap()
            .sign(NOW, "r", "GET", "/");
        assert_eq!(
            signer().verify(Some(&header), "r", "GET", "/", NOW),
            Err(TrustError::Mismatch)
        );
    }

    #[test]
    fn old_signature_is_stale() {
        let header = signer().sign(NOW, "r", "GET", "/");
        assert_eq!(
            signer().verify(Some(&header), "r", "GET", "/", NOW + 31_000),
            Err(TrustError::Stale)
        );
    }

    #[test]
    fn extreme_timestamps_are_stale() {
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1=AAAA");
            assert_eq!(
                signer().verify(Some(&header), "r", "GET", "/", NOW),
                Err(TrustError::Stale)
            );
        }
        let header = "t=0,v1=AAAA";
        assert_eq!(
            signer().verify(Some(header), "r", "GET", "/", i64::MIN),
            Err(TrustError::Stale)
        );
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            TrustSigner::new("", Duration::from_secs(30)),
            Err(TrustError::EmptyKey)
        ));
    }

    #[test]
    fn missing_or_garbled_header() {
        assert_eq!(signer().verify(None, "r", "GET", "/", NOW), Err(TrustError::Missing));
        assert_eq!(
            signer().verify(Some("t=abc,v1=???"), "r", "GET", "/", NOW),
            Err(TrustError::Malformed)
        );
        assert_eq!(
            signer().verify(Some("v1=AAAA"), "r", "GET", "/", NOW),
            Err(TrustError::Malformed)
        );
    }
}
