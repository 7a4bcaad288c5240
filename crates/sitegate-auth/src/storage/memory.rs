//! In-memory storage backends.
//!
//! Concurrent maps from `dashmap`, plus atomic counters for ids. The session
//! store can be told to fail its reads or writes so callers can exercise
//! their storage-error paths.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;

use super::account::{Account, AccountStore, NewAccount};
use super::session::{SessionRecord, SessionStore};
use super::tasks::{Task, TaskQueue};
use crate::error::{AuthError, ResponseCode};
use crate::token::{Claims, NEVER_EXPIRES};
use crate::AuthResult;

// ============================================================================
// Sessions
// ============================================================================

/// In-memory session record store.
#[derive(Debug)]
pub struct MemorySessionStore {
    records: DashMap<i64, SessionRecord>,
    /// Next record id
    next_id: AtomicI64,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
            fail_loads: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent `load` fail with a storage error.
    pub fn fail_loads(&self, on: bool) {
        self.fail_loads.store(on, Ordering::SeqCst);
    }

    /// Makes every subsequent `save` fail with a storage error.
    pub fn fail_saves(&self, on: bool) {
        self.fail_saves.store(on, Ordering::SeqCst);
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops records whose final expiry has passed. Uninitialised and
    /// never-expiring records stay.
    fn sweep_expired(&self, now: i64) {
        let before = self.records.len();
        self.records.retain(|_, record| {
            let fexp = record.claims.final_expires_at;
            fexp == 0 || fexp == NEVER_EXPIRES || fexp > now
        });
        let swept = before.saturating_sub(self.records.len());
        if swept > 0 {
            tracing::debug!(swept, "Swept expired session records");
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, mut claims: Claims) -> AuthResult<SessionRecord> {
        self.sweep_expired(claims.issued_at);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        claims.self_id = id.to_string();
        let record = SessionRecord { id, claims };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn load(&self, id: i64) -> AuthResult<Option<SessionRecord>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(AuthError::storage("session store unavailable"));
        }
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, record: &SessionRecord) -> AuthResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AuthError::storage("session store is read-only"));
        }
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> AuthResult<()> {
        self.records.remove(&id);
        Ok(())
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// In-memory account directory with a unique username index.
#[derive(Debug)]
pub struct MemoryAccountStore {
    accounts: DashMap<i64, Account>,
    by_username: DashMap<String, i64>,
    next_id: AtomicI64,
    fail_lookups: AtomicBool,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            by_username: DashMap::new(),
            next_id: AtomicI64::new(1),
            fail_lookups: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent lookup fail with a storage error.
    pub fn fail_lookups(&self, on: bool) {
        self.fail_lookups.store(on, Ordering::SeqCst);
    }

    /// Inserts an account with a fixed id, replacing any previous one.
    /// Used for seeding.
    pub fn insert(&self, account: Account) {
        self.by_username.insert(account.username.clone(), account.id);
        // keep generated ids clear of seeded ones
        self.next_id.fetch_max(account.id + 1, Ordering::SeqCst);
        self.accounts.insert(account.id, account);
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<Account>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AuthError::storage("account directory unavailable"));
        }
        Ok(self.accounts.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Account>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AuthError::storage("account directory unavailable"));
        }
        let Some(id) = self.by_username.get(username).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn register(&self, new: NewAccount) -> AuthResult<Account> {
        match self.by_username.entry(new.username.clone()) {
            Entry::Occupied(_) => Err(AuthError::rejected(
                ResponseCode::UserExists,
                format!("username {} is taken", new.username),
            )),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let account = Account {
                    id,
                    username: new.username,
                    password_hash: new.password_hash,
                    active: new.active,
                    roles: new.roles,
                    parent_id: new.parent_id,
                    email: new.email,
                    fname: new.fname,
                    lname: new.lname,
                };
                self.accounts.insert(id, account.clone());
                slot.insert(id);
                Ok(account)
            }
        }
    }

    async fn save(&self, account: &Account) -> AuthResult<()> {
        match self.accounts.get_mut(&account.id) {
            Some(mut entry) => {
                *entry = account.clone();
                Ok(())
            }
            None => Err(AuthError::storage(format!("account {} does not exist", account.id))),
        }
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Task queue that just records what was enqueued.
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    tasks: RwLock<Vec<Task>>,
    reject: AtomicBool,
}

impl MemoryTaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `enqueue` fail.
    pub fn reject_all(&self, on: bool) {
        self.reject.store(on, Ordering::SeqCst);
    }

    /// Snapshot of the queued tasks.
    pub async fn queued(&self) -> Vec<Task> {
        self.tasks.read().await.clone()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> AuthResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(AuthError::storage("task queue unavailable"));
        }
        self.tasks.write().await.push(task);
        Ok(())
    }
}
