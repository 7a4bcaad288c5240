//! Session record storage trait.
//!
//! One record is persisted per issued credential. The record holds the
//! authoritative copy of the claims: revocation is deleting it, and the
//! sliding final-expiry window is a write to it.

use async_trait::async_trait;

use crate::AuthResult;
use crate::token::Claims;

/// The durable twin of a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Auto-assigned id; appears in the claims as the self id (`jti`).
    pub id: i64,
    pub claims: Claims,
}

impl SessionRecord {
    /// The record can still back a credential at `now`.
    ///
    /// A record whose final expiry was never set (`0`) is never active.
    #[must_use]
    pub fn is_active_at(&self, now: i64) -> bool {
        self.claims.is_live_at(now)
    }
}

/// Storage trait for session records.
///
/// Last write wins. The only concurrent mutation is the final-expiry
/// extension, which is idempotent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new record and assigns its id.
    ///
    /// The returned record's claims carry the id as their self id.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    async fn create(&self, claims: Claims) -> AuthResult<SessionRecord>;

    /// Loads a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails. A missing record
    /// is `Ok(None)`.
    async fn load(&self, id: i64) -> AuthResult<Option<SessionRecord>>;

    /// Overwrites an existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, record: &SessionRecord) -> AuthResult<()>;

    /// Deletes a record. Deleting a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: i64) -> AuthResult<()>;
}
