//! Account directory trait.
//!
//! Accounts are owned by the account service. The auth core reads the active
//! flag, the roles and the parent link, registers accounts created
//! through the OAuth broker and flips the active flag on activation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::token::Roles;

/// An account principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Unique lookup key, lower-cased. Either an email address or a
    /// provider-namespaced synthetic id for OAuth accounts.
    pub username: String,
    /// Argon2 PHC string. Empty for OAuth-only accounts.
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    pub active: bool,
    pub roles: Roles,
    /// Set for sub-accounts.
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub fname: String,
    #[serde(default)]
    pub lname: String,
}

impl Account {
    /// Sub-accounts have a parent.
    #[must_use]
    pub fn is_sub_account(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Fields needed to register an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub fname: String,
    pub lname: String,
    pub active: bool,
    pub roles: Roles,
    pub parent_id: Option<i64>,
}

/// Account lookup and registration.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Finds an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<Account>>;

    /// Finds an account by its (already normalised) username.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Account>>;

    /// Creates an account. The username must be unique.
    ///
    /// # Errors
    ///
    /// `USER_EXISTS` when the username is taken; a storage error otherwise.
    async fn register(&self, account: NewAccount) -> AuthResult<Account>;

    /// Overwrites an existing account. The username is not re-indexed.
    ///
    /// # Errors
    ///
    /// A storage error when the account does not exist or the write fails.
    async fn save(&self, account: &Account) -> AuthResult<()>;
}
