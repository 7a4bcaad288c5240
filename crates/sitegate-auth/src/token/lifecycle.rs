//! Credential lifecycle: issue, validate, refresh, revoke.
//!
//! Validation of a presented credential ends in one of three outcomes:
//!
//! - **Valid**: signature fine, not expired, and (when a persisted check is
//!   forced) the session record is still live.
//! - **Refreshed**: `exp` has passed but the session record is still within
//!   its final expiry. A new credential is signed from the *persisted*
//!   claims, never from the expired ones.
//! - **Rejected**: anything else. No detail is returned to the caller.
//!
//! Every successful outcome may also slide the record's final expiry
//! forward (see [`TokenLifecycle::validate`]). Those writes are best-effort.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::password::generate_session_id;
use crate::storage::{Account, AccountStore, SessionRecord, SessionStore};
use crate::token::claims::{Audience, Claims, NEVER_EXPIRES, PrincipalKind};
use crate::token::jwt::JwtService;
use crate::token::scopes::Scopes;
use crate::{AuthError, AuthResult};

/// Who a credential speaks for, after lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Account(Account),
    /// A fixed system identity.
    Service(i64),
    /// The subject could not be found. Claims are kept for diagnostics but
    /// authorization fails closed.
    Unresolved,
}

impl Principal {
    #[must_use]
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Account(account) => Some(account),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

/// Outcome of validating a presented credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid {
        claims: Claims,
        principal: Principal,
    },
    Refreshed {
        claims: Claims,
        principal: Principal,
        /// The newly signed credential to hand back to the client.
        credential: String,
    },
    Rejected,
}

impl Validation {
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Valid { claims, .. } | Self::Refreshed { claims, .. } => Some(claims),
            Self::Rejected => None,
        }
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Valid { principal, .. } | Self::Refreshed { principal, .. } => Some(principal),
            Self::Rejected => None,
        }
    }

    #[must_use]
    pub fn refreshed_credential(&self) -> Option<&str> {
        match self {
            Self::Refreshed { credential, .. } => Some(credential),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// A freshly issued credential and the claims it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    pub credential: String,
    pub claims: Claims,
}

/// Issues and validates credentials against the session store.
pub struct TokenLifecycle {
    jwt: JwtService,
    sessions: Arc<dyn SessionStore>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    tokens: TokenConfig,
}

impl TokenLifecycle {
    #[must_use]
    pub fn new(
        jwt: JwtService,
        sessions: Arc<dyn SessionStore>,
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        tokens: TokenConfig,
    ) -> Self {
        Self {
            jwt,
            sessions,
            accounts,
            clock,
            tokens,
        }
    }

    /// Current time in unix seconds, from the injected clock.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.unix_now()
    }

    /// Final duration for an audience in seconds, or [`NEVER_EXPIRES`].
    #[must_use]
    pub fn final_duration(&self, audience: Audience) -> i64 {
        match audience {
            Audience::App if self.tokens.app_never_expires => NEVER_EXPIRES,
            Audience::App => self.tokens.long_secs(),
            Audience::Cookie | Audience::OutOfBand => self.tokens.short_secs(),
        }
    }

    /// Persists a new session record and signs its claims.
    ///
    /// COOKIE credentials get a fresh CSRF session id.
    ///
    /// # Errors
    ///
    /// Storage and signing failures.
    pub async fn issue(
        &self,
        principal_kind: PrincipalKind,
        subject_id: i64,
        audience: Audience,
        scopes: Scopes,
        extra: String,
    ) -> AuthResult<Issued> {
        let now = self.now();
        let final_expires_at = match self.final_duration(audience) {
            NEVER_EXPIRES => NEVER_EXPIRES,
            duration => now + duration,
        };
        let session_id = if audience == Audience::Cookie {
            generate_session_id()
        } else {
            String::new()
        };

        let claims = Claims {
            self_id: String::new(),
            issuer: self.jwt.issuer().to_string(),
            audience,
            subject_id,
            principal_kind,
            expires_at: cap_expiry(now + self.tokens.short_secs(), final_expires_at),
            issued_at: now,
            scopes,
            session_id,
            final_expires_at,
            subject: String::new(),
            extra,
        };

        let record = self.sessions.create(claims).await?;
        let credential = match self.jwt.sign(&record.claims) {
            Ok(credential) => credential,
            Err(err) => {
                if let Err(cleanup) = self.sessions.delete(record.id).await {
                    tracing::warn!(self_id = record.id, error = %cleanup, "Failed to drop unsigned session record");
                }
                return Err(err.into());
            }
        };

        tracing::debug!(
            self_id = record.id,
            subject_id,
            audience = %audience,
            scopes = %scopes,
            "Issued credential"
        );

        Ok(Issued {
            credential,
            claims: record.claims,
        })
    }

    /// Issues the credential an account gets on login.
    ///
    /// Master accounts get `ACCOUNT_FULL_MASTER`, sub-accounts
    /// `ACCOUNT_FULL_SUB`.
    ///
    /// # Errors
    ///
    /// `MISSINGINFO` for audiences other than APP and COOKIE.
    pub async fn issue_login(&self, account: &Account, audience: Audience) -> AuthResult<Issued> {
        if audience == Audience::OutOfBand {
            return Err(AuthError::missing_info("login audience must be app or cookie"));
        }

        let scopes = if account.is_sub_account() {
            Scopes::ACCOUNT_FULL_SUB
        } else {
            Scopes::ACCOUNT_FULL_MASTER
        };
        self.issue(PrincipalKind::Account, account.id, audience, scopes, String::new())
            .await
    }

    /// Issues a single-purpose OUT_OF_BAND credential for an account, such
    /// as an activation or password-reset link.
    ///
    /// # Errors
    ///
    /// Storage and signing failures.
    pub async fn issue_account_oob(
        &self,
        account: &Account,
        scopes: Scopes,
        extra: Option<serde_json::Value>,
    ) -> AuthResult<Issued> {
        let extra = match extra {
            Some(value) => serde_json::to_string(&value)
                .map_err(|e| AuthError::internal(format!("cannot encode extra: {e}")))?,
            None => String::new(),
        };
        self.issue(PrincipalKind::Account, account.id, Audience::OutOfBand, scopes, extra)
            .await
    }

    /// Issues an OUT_OF_BAND credential for a fixed system identity.
    ///
    /// # Errors
    ///
    /// `MISSINGINFO` when `system_id` is not positive.
    pub async fn issue_service_oob(
        &self,
        system_id: i64,
        scopes: Scopes,
        extra: String,
    ) -> AuthResult<Issued> {
        if system_id <= 0 {
            return Err(AuthError::missing_info("system id must be positive"));
        }
        self.issue(PrincipalKind::Service, system_id, Audience::OutOfBand, scopes, extra)
            .await
    }

    /// Validates a presented credential.
    ///
    /// OUT_OF_BAND credentials always get the persisted check; other
    /// audiences only when `force_db_check` is set. A forced check returns
    /// the persisted claims (including their `extra`) with the presented
    /// `exp`.
    ///
    /// On every successful outcome the final expiry slides to
    /// `now + final_duration` once less than half of that duration remains.
    /// It never moves backwards and is never touched for never-expiring
    /// sessions.
    ///
    /// # Errors
    ///
    /// Storage failures while loading the session record or the principal,
    /// and signing failures during refresh. Everything the client got wrong
    /// is `Ok(Validation::Rejected)`.
    pub async fn validate(&self, raw: &str, force_db_check: bool) -> AuthResult<Validation> {
        let now = self.now();

        let verified = match self.jwt.verify(raw, now) {
            Ok(Some(verified)) => verified,
            Ok(None) => return Ok(Validation::Rejected),
            Err(err) => {
                tracing::debug!(error = %err, "Credential failed verification");
                return Ok(Validation::Rejected);
            }
        };
        let Some(self_id) = verified.claims.self_id_number() else {
            return Ok(Validation::Rejected);
        };

        if verified.expired {
            let Some(mut record) = self.load_active(self_id, now).await? else {
                tracing::debug!(self_id, "Expired credential has no live session");
                return Ok(Validation::Rejected);
            };
            self.extend_final_expiry(&mut record, now).await;

            let mut claims = record.claims;
            claims.expires_at = cap_expiry(now + self.tokens.short_secs(), claims.final_expires_at);
            let credential = self.jwt.sign(&claims)?;
            let principal = self.resolve_principal(&claims).await?;

            tracing::debug!(self_id, expires_at = claims.expires_at, "Refreshed credential");
            return Ok(Validation::Refreshed {
                claims,
                principal,
                credential,
            });
        }

        let claims = if force_db_check || verified.claims.audience == Audience::OutOfBand {
            let Some(mut record) = self.load_active(self_id, now).await? else {
                tracing::debug!(self_id, "Credential has no live session");
                return Ok(Validation::Rejected);
            };
            self.extend_final_expiry(&mut record, now).await;
            Claims {
                expires_at: verified.claims.expires_at,
                ..record.claims
            }
        } else {
            let mut claims = verified.claims;
            if self.needs_extension(claims.audience, claims.final_expires_at, now) {
                match self.sessions.load(self_id).await {
                    Ok(Some(mut record)) => {
                        self.extend_final_expiry(&mut record, now).await;
                        claims.final_expires_at = record.claims.final_expires_at;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(self_id, error = %err, "Failed to load session for final-expiry extension");
                    }
                }
            }
            claims
        };

        let principal = self.resolve_principal(&claims).await?;
        Ok(Validation::Valid { claims, principal })
    }

    /// Looks up the principal a claim set speaks for.
    ///
    /// # Errors
    ///
    /// Account storage failures. A missing account is
    /// [`Principal::Unresolved`], not an error.
    pub async fn resolve_principal(&self, claims: &Claims) -> AuthResult<Principal> {
        match claims.principal_kind {
            PrincipalKind::Account => Ok(self
                .accounts
                .find_by_id(claims.subject_id)
                .await?
                .map_or(Principal::Unresolved, Principal::Account)),
            PrincipalKind::Service if claims.subject_id > 0 => {
                Ok(Principal::Service(claims.subject_id))
            }
            PrincipalKind::Service => Ok(Principal::Unresolved),
        }
    }

    /// Deletes the session record behind a credential.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn revoke(&self, self_id: i64) -> AuthResult<()> {
        self.sessions.delete(self_id).await?;
        tracing::debug!(self_id, "Revoked session");
        Ok(())
    }

    /// Replaces the `extra` payload of a live session record.
    ///
    /// # Errors
    ///
    /// `AUTH` when the record is gone or past its final expiry, and storage
    /// failures.
    pub async fn update_extra(&self, self_id: i64, extra: String) -> AuthResult<Claims> {
        let now = self.now();
        let Some(mut record) = self.load_active(self_id, now).await? else {
            return Err(AuthError::invalid_token("session is no longer live"));
        };
        record.claims.extra = extra;
        self.sessions.save(&record).await?;
        Ok(record.claims)
    }

    /// Signs a claim set as-is.
    ///
    /// # Errors
    ///
    /// `MISSINGINFO` for a COOKIE claim set without session id; signing
    /// failures.
    pub fn sign(&self, claims: &Claims) -> AuthResult<String> {
        Ok(self.jwt.sign(claims)?)
    }

    async fn load_active(&self, self_id: i64, now: i64) -> AuthResult<Option<SessionRecord>> {
        Ok(self
            .sessions
            .load(self_id)
            .await?
            .filter(|record| record.is_active_at(now)))
    }

    fn needs_extension(&self, audience: Audience, final_expires_at: i64, now: i64) -> bool {
        let duration = self.final_duration(audience);
        final_expires_at != NEVER_EXPIRES
            && duration != NEVER_EXPIRES
            && final_expires_at - now < duration / 2
    }

    async fn extend_final_expiry(&self, record: &mut SessionRecord, now: i64) {
        let claims = &record.claims;
        if !self.needs_extension(claims.audience, claims.final_expires_at, now) {
            return;
        }
        let extended = now + self.final_duration(claims.audience);
        if extended <= claims.final_expires_at {
            return;
        }

        let previous = record.claims.final_expires_at;
        record.claims.final_expires_at = extended;
        if let Err(err) = self.sessions.save(record).await {
            record.claims.final_expires_at = previous;
            tracing::warn!(self_id = record.id, error = %err, "Failed to persist final-expiry extension");
        } else {
            tracing::debug!(self_id = record.id, final_expires_at = extended, "Extended final expiry");
        }
    }
}

/// `exp` never passes a finite final expiry.
///
/// A refreshed credential near the end of its session would otherwise
/// outlive the session record it refreshes from.
fn cap_expiry(expires_at: i64, final_expires_at: i64) -> i64 {
    if final_expires_at == NEVER_EXPIRES {
        expires_at
    } else {
        expires_at.min(final_expires_at)
    }
}
