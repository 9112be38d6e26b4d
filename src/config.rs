// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! by both binaries. Configuration is loaded from the environment once at
//! startup into typed settings and then passed by value to the components
//! that need it.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `9491` (service), `8080` (gateway) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `TOKEN_ISSUER` | `iss` claim written into and required from tokens | `digital-bank` |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `900` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `86400` |
//! | `CLOCK_SKEW_LEEWAY_SECS` | Tolerance applied to `exp` | `0` |
//! | `SECRET_SOURCE_TIMEOUT_MS` | Timeout for a single secret store read | `2000` |
//! | `KEY_CACHE_CAPACITY` | Verifiers kept in memory | `32` |
//! | `KEY_FALLBACK_CAPACITY` | Key materials remembered for outages | `16` |
//! | `REQUEST_BINDING_TTL_SECS` | Lifetime of a request key binding | `60` |
//! | `REQUEST_BINDING_CAPACITY` | Live request key bindings | `10000` |
//! | `AUTH_BYPASS_PATHS` | Comma-separated unauthenticated paths | see [`DEFAULT_BYPASS_PATHS`] |
//! | `VAULT_ADDR` | Vault base URL (enables the Vault key source) | unset |
//! | `VAULT_TOKEN` | Vault token | Required with `VAULT_ADDR` |
//! | `VAULT_KV_BACKEND` | KV v2 mount | `secret` |
//! | `VAULT_APPLICATION_NAME` | Secret path holding the key pair | `user-service` |
//! | `SIGNING_PUBLIC_KEY` | Local public key (PEM or base64 DER) | unset |
//! | `SIGNING_PRIVATE_KEY` | Local private key (PEM or base64 DER) | unset |
//! | `SIGNING_KEY_VERSION` | Version of the local key pair | `1` |
//! | `GATEWAY_SHARED_SECRET` | Trust signature key shared by gateway and services | Required for the gateway |
//! | `GATEWAY_SIGNATURE_MAX_AGE_SECS` | Accepted trust signature age | `30` |
//! | `REQUIRE_GATEWAY_SIGNATURE` | Reject traffic that did not come through the gateway | `false` |
//! | `UPSTREAM_URL` | Gateway forward target | `http://user-service:9491` |

use std::str::FromStr;
use std::time::Duration;

use url::Url;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const TOKEN_ISSUER_ENV: &str = "TOKEN_ISSUER";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const CLOCK_SKEW_LEEWAY_ENV: &str = "CLOCK_SKEW_LEEWAY_SECS";
pub const SECRET_SOURCE_TIMEOUT_ENV: &str = "SECRET_SOURCE_TIMEOUT_MS";
pub const KEY_CACHE_CAPACITY_ENV: &str = "KEY_CACHE_CAPACITY";
pub const KEY_FALLBACK_CAPACITY_ENV: &str = "KEY_FALLBACK_CAPACITY";
pub const REQUEST_BINDING_TTL_ENV: &str = "REQUEST_BINDING_TTL_SECS";
pub const REQUEST_BINDING_CAPACITY_ENV: &str = "REQUEST_BINDING_CAPACITY";
pub const AUTH_BYPASS_PATHS_ENV: &str = "AUTH_BYPASS_PATHS";
pub const VAULT_ADDR_ENV: &str = "VAULT_ADDR";
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";
pub const VAULT_KV_BACKEND_ENV: &str = "VAULT_KV_BACKEND";
pub const VAULT_APPLICATION_NAME_ENV: &str = "VAULT_APPLICATION_NAME";
pub const SIGNING_PUBLIC_KEY_ENV: &str = "SIGNING_PUBLIC_KEY";
pub const SIGNING_PRIVATE_KEY_ENV: &str = "SIGNING_PRIVATE_KEY";
pub const SIGNING_KEY_VERSION_ENV: &str = "SIGNING_KEY_VERSION";
pub const GATEWAY_SHARED_SECRET_ENV: &str = "GATEWAY_SHARED_SECRET";
pub const GATEWAY_SIGNATURE_MAX_AGE_ENV: &str = "GATEWAY_SIGNATURE_MAX_AGE_SECS";
pub const REQUIRE_GATEWAY_SIGNATURE_ENV: &str = "REQUIRE_GATEWAY_SIGNATURE";
pub const UPSTREAM_URL_ENV: &str = "UPSTREAM_URL";

/// Default port of the backend user service.
pub const DEFAULT_SERVICE_PORT: u16 = 9491;

/// Default port of the edge gateway.
pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

/// Paths that never require a bearer token.
///
/// Login, registration, token renewal (the refresh token travels in the
/// body), health checks and service discovery.
pub const DEFAULT_BYPASS_PATHS: &[&str] = &[
    "/v1/api/user/register",
    "/v1/api/authenticate",
    "/v1/api/renewToken",
    "/actuator/health",
    "/health",
    "/eureka",
    "/docs",
    "/api-doc",
];

const DEFAULT_UPSTREAM_URL: &str = "http://user-service:9491";

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },

    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("expected `json` or `pretty`, got `{other}`")),
        }
    }
}

/// Bind address and log format.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token issuance and validation settings shared by gateway and service.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub issuer: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub leeway: Duration,
    pub secret_source_timeout: Duration,
    pub key_cache_capacity: usize,
    pub key_fallback_capacity: usize,
    pub binding_ttl: Duration,
    pub binding_capacity: usize,
    pub bypass_paths: Vec<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            issuer: "digital-bank".to_string(),
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(86_400),
            leeway: Duration::ZERO,
            secret_source_timeout: Duration::from_millis(2_000),
            key_cache_capacity: 32,
            key_fallback_capacity: 16,
            binding_ttl: Duration::from_secs(60),
            binding_capacity: 10_000,
            bypass_paths: DEFAULT_BYPASS_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Vault KV v2 connection settings.
#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub addr: Url,
    pub token: String,
    pub kv_backend: String,
    pub application_name: String,
}

/// Key pair configured directly in the environment.
///
/// Used as the secret source when no Vault is configured, and as the
/// issuer's boot-time fallback when Vault is configured but unreachable.
#[derive(Debug, Clone)]
pub struct LocalKeySettings {
    pub version: u32,
    pub public_key: String,
    pub private_key: Option<String>,
}

/// Gateway trust signature settings.
#[derive(Debug, Clone)]
pub struct TrustSettings {
    pub shared_secret: Option<String>,
    pub max_age: Duration,
    pub require_signature: bool,
}

impl Default for TrustSettings {
    fn default() -> Self {
        Self {
            shared_secret: None,
            max_age: Duration::from_secs(30),
            require_signature: false,
        }
    }
}

/// Everything a binary needs at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub vault: Option<VaultSettings>,
    pub local_key: Option<LocalKeySettings>,
    pub trust: TrustSettings,
    pub upstream_url: Url,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env(default_port: u16) -> Result<Self, ConfigError> {
        Self::from_lookup(default_port, |name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(default_port: u16, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };
        let defaults = AuthSettings::default();

        let server = ServerSettings {
            host: vars.string(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: vars.parse_or(PORT_ENV, default_port)?,
            log_format: vars.parse_or(LOG_FORMAT_ENV, LogFormat::Pretty)?,
        };

        let bypass_paths = match vars.string(AUTH_BYPASS_PATHS_ENV) {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.bypass_paths.clone(),
        };

        let auth = AuthSettings {
            issuer: vars.string(TOKEN_ISSUER_ENV).unwrap_or(defaults.issuer),
            access_token_ttl: vars.secs_or(ACCESS_TOKEN_TTL_ENV, defaults.access_token_ttl)?,
            refresh_token_ttl: vars.secs_or(REFRESH_TOKEN_TTL_ENV, defaults.refresh_token_ttl)?,
            leeway: vars.secs_or(CLOCK_SKEW_LEEWAY_ENV, defaults.leeway)?,
            secret_source_timeout: Duration::from_millis(vars.parse_or(
                SECRET_SOURCE_TIMEOUT_ENV,
                defaults.secret_source_timeout.as_millis() as u64,
            )?),
            key_cache_capacity: vars.parse_or(KEY_CACHE_CAPACITY_ENV, defaults.key_cache_capacity)?,
            key_fallback_capacity: vars
                .parse_or(KEY_FALLBACK_CAPACITY_ENV, defaults.key_fallback_capacity)?,
            binding_ttl: vars.secs_or(REQUEST_BINDING_TTL_ENV, defaults.binding_ttl)?,
            binding_capacity: vars
                .parse_or(REQUEST_BINDING_CAPACITY_ENV, defaults.binding_capacity)?,
            bypass_paths,
        };

        let vault = match vars.string(VAULT_ADDR_ENV) {
            Some(addr) => Some(VaultSettings {
                addr: parse_url(VAULT_ADDR_ENV, &addr)?,
                token: vars.required(VAULT_TOKEN_ENV)?,
                kv_backend: vars
                    .string(VAULT_KV_BACKEND_ENV)
                    .unwrap_or_else(|| "secret".to_string()),
                application_name: vars
                    .string(VAULT_APPLICATION_NAME_ENV)
                    .unwrap_or_else(|| "user-service".to_string()),
            }),
            None => None,
        };

        let local_key = match vars.string(SIGNING_PUBLIC_KEY_ENV) {
            Some(public_key) => Some(LocalKeySettings {
                version: vars.parse_or(SIGNING_KEY_VERSION_ENV, 1)?,
                public_key,
                private_key: vars.string(SIGNING_PRIVATE_KEY_ENV),
            }),
            None => None,
        };

        let trust = TrustSettings {
            shared_secret: vars.string(GATEWAY_SHARED_SECRET_ENV),
            max_age: vars.secs_or(GATEWAY_SIGNATURE_MAX_AGE_ENV, TrustSettings::default().max_age)?,
            require_signature: vars.parse_or(REQUIRE_GATEWAY_SIGNATURE_ENV, false)?,
        };

        let upstream_url = match vars.string(UPSTREAM_URL_ENV) {
            Some(raw) => parse_url(UPSTREAM_URL_ENV, &raw)?,
            None => parse_url(UPSTREAM_URL_ENV, DEFAULT_UPSTREAM_URL)?,
        };

        Ok(Self {
            server,
            auth,
            vault,
            local_key,
            trust,
            upstream_url,
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Non-empty value of a variable.
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.string(name).ok_or(ConfigError::Missing { name })
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(name) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn secs_or(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse_or(name, default.as_secs()).map(Duration::from_secs)
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
