// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Refresh token renewal.

use tracing::info;

use super::claims::{TokenType, SCOPE_USER_ADD};
use super::error::AuthError;
use super::issuer::{TokenIssuer, TokenPair};
use super::validator::{RequestContext, TokenValidator};

/// Exchange a refresh token for a new access token.
///
/// The refresh token must verify as `REFRESH`. The new access token carries
/// the refresh token's subject and authorities unchanged; the refresh token
/// itself is handed back as-is.
pub async fn renew(
    validator: &TokenValidator,
    issuer: &TokenIssuer,
    refresh_token: &str,
    ctx: &RequestContext,
) -> Result<TokenPair, AuthError> {
    let token = refresh_token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedToken);
    }

    let holder = validator.validate(token, TokenType::Refresh, ctx).await?;
    let access = issuer
        .issue(
            &holder.user_id,
            &holder.authorities,
            TokenType::Access,
            issuer.access_ttl(),
            SCOPE_USER_ADD,
        )
        .await?;

    info!(
        subject = %holder.user_id,
        request_id = %ctx.correlation_id,
        key_version = access.key_version,
        "Renewed access token"
    );

    Ok(TokenPair {
        access_token: access.token,
        refresh_token: token.to_string(),
    })
}
