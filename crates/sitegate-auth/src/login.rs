//! Account login.
//!
//! Shared by the password endpoint and the OAuth broker's login action. The
//! two differ only in how the account is found: password logins must not
//! reach provider-backed accounts, and OAuth logins skip the password check.

use std::sync::Arc;

use serde::Serialize;

use crate::config::BrokerConfig;
use crate::error::{AuthError, ResponseCode};
use crate::password::verify_password;
use crate::storage::{Account, AccountStore};
use crate::token::{Audience, Issued, TokenLifecycle};

/// How the username was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    /// Typed by the user, checked against the stored password.
    Password,
    /// Synthetic provider-namespaced id vouched for by the OAuth broker.
    OAuth,
}

/// A completed login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account: Account,
    pub issued: Issued,
}

/// Public view of an account, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub uid: String,
    pub email: String,
    pub fname: String,
    pub lname: String,
}

impl From<&Account> for UserInfo {
    fn from(account: &Account) -> Self {
        Self {
            uid: account.id.to_string(),
            email: account.email.clone(),
            fname: account.fname.clone(),
            lname: account.lname.clone(),
        }
    }
}

/// A failed login. Once the account is known it rides along so the
/// response can say whose login failed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct LoginFailure {
    #[source]
    pub error: AuthError,
    pub account: Option<Account>,
}

impl LoginFailure {
    fn for_account(account: &Account, error: AuthError) -> Self {
        Self {
            error,
            account: Some(account.clone()),
        }
    }
}

impl From<AuthError> for LoginFailure {
    fn from(error: AuthError) -> Self {
        Self {
            error,
            account: None,
        }
    }
}

/// Checks credentials and issues login tokens.
pub struct LoginService {
    lifecycle: Arc<TokenLifecycle>,
    accounts: Arc<dyn AccountStore>,
    oauth_prefix: String,
}

impl LoginService {
    #[must_use]
    pub fn new(
        lifecycle: Arc<TokenLifecycle>,
        accounts: Arc<dyn AccountStore>,
        broker: &BrokerConfig,
    ) -> Self {
        Self {
            lifecycle,
            accounts,
            oauth_prefix: broker.user_id_prefix.clone(),
        }
    }

    /// Logs an account in and issues its credential.
    ///
    /// # Errors
    ///
    /// `MISSING_USERNAME`, `NOUSERNAME`, `NOT_ACTIVATED`, `MISSING_PASSWORD`
    /// and `WRONG_PASSWORD` for the respective user mistakes; `TECHNICAL`
    /// for storage and signing failures.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        audience: Audience,
        lookup: LookupKind,
    ) -> Result<LoginOutcome, LoginFailure> {
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(AuthError::rejected(ResponseCode::MissingUsername, "empty username").into());
        }

        if lookup == LookupKind::Password && username.starts_with(&self.oauth_prefix) {
            return Err(AuthError::rejected(
                ResponseCode::NoUsername,
                "provider accounts cannot log in with a password",
            )
            .into());
        }

        let Some(account) = self.accounts.find_by_username(&username).await? else {
            return Err(AuthError::rejected(ResponseCode::NoUsername, "unknown username").into());
        };

        if !account.active {
            return Err(LoginFailure::for_account(&account, AuthError::NotActivated));
        }

        if lookup == LookupKind::Password {
            if password.is_empty() {
                return Err(LoginFailure::for_account(
                    &account,
                    AuthError::rejected(ResponseCode::MissingPassword, "empty password"),
                ));
            }
            let matches = verify_password(password, &account.password_hash).unwrap_or_else(|err| {
                tracing::warn!(account_id = account.id, error = %err, "Stored password hash is unreadable");
                false
            });
            if !matches {
                return Err(LoginFailure::for_account(
                    &account,
                    AuthError::rejected(ResponseCode::WrongPassword, "password mismatch"),
                ));
            }
        }

        let issued = self
            .lifecycle
            .issue_login(&account, audience)
            .await
            .map_err(|err| LoginFailure::for_account(&account, err))?;

        tracing::info!(account_id = account.id, audience = %audience.as_str(), "Login completed");
        Ok(LoginOutcome { account, issued })
    }
}
