//! Storage traits for sessions, accounts and background tasks.
//!
//! Lookups return `AuthResult<Option<T>>`: `Ok(Some(_))` is found,
//! `Ok(None)` is not found, `Err(_)` is a storage failure. Callers keep the
//! three apart; only the last one is ever surfaced as `TECHNICAL`.
//!
//! # Implementations
//!
//! In-memory implementations live in [`memory`] and back both the server
//! binary and the tests.

pub mod account;
pub mod memory;
pub mod session;
pub mod tasks;

pub use account::{Account, AccountStore, NewAccount};
pub use memory::{MemoryAccountStore, MemorySessionStore, MemoryTaskQueue};
pub use session::{SessionRecord, SessionStore};
pub use tasks::{Task, TaskQueue};
