// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User credential directory.
//!
//! Login only needs to find a principal by username or email, check its
//! password and read its status and authorities. Persistence is behind the
//! [`CredentialStore`] trait; [`InMemoryCredentialStore`] is the directory
//! used by the service binary and the tests.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

/// Authority granted to every self-registered user.
pub const DEFAULT_USER_AUTHORITY: &str = "ROLE_USER";

/// bcrypt cost used by the service directory.
pub const DEFAULT_HASH_COST: u32 = bcrypt::DEFAULT_COST;

/// Verified in place of a real hash when the login is unknown, so unknown
/// users cost the same bcrypt work as known ones.
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

fn dummy_hash() -> &'static str {
    DUMMY_HASH.get_or_init(|| {
        bcrypt::hash(Uuid::new_v4().to_string(), DEFAULT_HASH_COST).unwrap_or_default()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

/// A stored principal.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub authorities: Vec<String>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    password_hash: PasswordHash,
}

/// Input for creating a principal.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub authorities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserStoreError {
    #[error("username or email already registered")]
    AlreadyExists,
    #[error("user {0} not found")]
    NotFound(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Reasons a login attempt fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("Invalid username or password")]
    WrongCredentials,
    #[error("User account is not active")]
    Inactive,
}

/// bcrypt hash in modular crypt format.
#[derive(Clone)]
struct PasswordHash(String);

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash(..)")
    }
}

/// Hash a password off the async runtime.
async fn hash_password(password: String, cost: u32) -> Result<PasswordHash, UserStoreError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| UserStoreError::Hashing(e.to_string()))?
        .map(PasswordHash)
        .map_err(|e| UserStoreError::Hashing(e.to_string()))
}

/// Verify a password off the async runtime. Any error is a mismatch.
async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_string();
    let hash = hash.to_string();
    match tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await {
        Ok(Ok(valid)) => valid,
        Ok(Err(e)) => {
            warn!(error = %e, "Stored password hash is unusable");
            false
        }
        Err(e) => {
            warn!(error = %e, "Password verification task failed");
            false
        }
    }
}

/// Storage for principals and their credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find by username or, when `login` looks like an address, by email.
    async fn find_by_login(&self, login: &str) -> Option<UserRecord>;

    async fn create(&self, user: NewUser) -> Result<UserRecord, UserStoreError>;

    async fn set_status(&self, username: &str, status: UserStatus) -> Result<(), UserStoreError>;
}

/// Check a login attempt against a store.
///
/// Unknown users and wrong passwords are indistinguishable to the caller,
/// and both run one bcrypt verification. The account status is only
/// reported once the password has matched.
pub async fn check_credentials(
    store: &dyn CredentialStore,
    login: &str,
    password: &str,
) -> Result<UserRecord, LoginError> {
    let login = login.trim();
    let user = if login.is_empty() {
        None
    } else {
        store.find_by_login(login).await
    };

    let valid = match &user {
        Some(u) => verify_password(password, &u.password_hash.0).await,
        None => {
            let hash = tokio::task::spawn_blocking(dummy_hash).await.unwrap_or_default();
            verify_password(password, hash).await
        }
    };

    let user = user.ok_or(LoginError::WrongCredentials)?;
    if !valid || password.is_empty() {
        return Err(LoginError::WrongCredentials);
    }
    if user.status != UserStatus::Active {
        return Err(LoginError::Inactive);
    }
    Ok(user)
}

#[derive(Default)]
struct Directory {
    by_username: HashMap<String, UserRecord>,
    /// Lowercased email -> lowercased username
    email_index: HashMap<String, String>,
}

/// Process-local credential store.
pub struct InMemoryCredentialStore {
    directory: RwLock<Directory>,
    hash_cost: u32,
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::with_hash_cost(DEFAULT_HASH_COST)
    }
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store hashing new passwords with the given bcrypt cost.
    pub fn with_hash_cost(hash_cost: u32) -> Self {
        Self {
            directory: RwLock::new(Directory::default()),
            hash_cost,
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_login(&self, login: &str) -> Option<UserRecord> {
        let key = login.to_lowercase();
        let directory = self.directory.read().await;
        if key.contains('@') {
            let username = directory.email_index.get(&key)?;
            directory.by_username.get(username).cloned()
        } else {
            directory.by_username.get(&key).cloned()
        }
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, UserStoreError> {
        let username_key = user.username.to_lowercase();
        let email_key = user.email.to_lowercase();
        let password_hash = hash_password(user.password, self.hash_cost).await?;

        let mut directory = self.directory.write().await;
        if directory.by_username.contains_key(&username_key)
            || directory.email_index.contains_key(&email_key)
        {
            return Err(UserStoreError::AlreadyExists);
        }

        let record = UserRecord {
            user_id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            authorities: user.authorities,
            status: UserStatus::Active,
            created_at: Utc::now(),
            password_hash,
        };
        directory.email_index.insert(email_key, username_key.clone());
        directory.by_username.insert(username_key, record.clone());
        Ok(record)
    }

    async fn set_status(&self, username: &str, status: UserStatus) -> Result<(), UserStoreError> {
        let mut directory = self.directory.write().await;
        let record = directory
            .by_username
            .get_mut(&username.to_lowercase())
            .ok_or_else(|| UserStoreError::NotFound(username.to_string()))?;
        record.status = status;
        Ok(())
    }
}
