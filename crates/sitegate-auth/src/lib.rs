//! # sitegate-auth
//!
//! Authentication, authorization and session lifecycle for the Sitegate
//! account service.
//!
//! This crate provides:
//! - Signed bearer credentials and their persisted session records
//! - Issue / validate / refresh-on-expiry / revoke
//! - Scope and role based route policies with CSRF session binding
//! - A redirect-based OAuth broker for third-party login
//!
//! ## Modules
//!
//! - [`config`] - Authentication configuration
//! - [`token`] - Claims, signing and the credential lifecycle
//! - [`policy`] - Route policies and the access evaluator
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`login`] - Account login
//! - [`broker`] - Third-party OAuth broker
//! - [`middleware`] - Route guard and request context
//! - [`http`] - Axum handlers for the account endpoints

pub mod broker;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod login;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod storage;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory, ResponseCode};
pub use http::account_routes;
pub use middleware::{AuthContext, AuthState, Collaborators, RouteGuard, guarded};
pub use policy::{AccessDecision, DenyReason, Evaluator, MatchMode, RequestSource, RoutePolicy};
pub use token::{Audience, Claims, Scopes, TokenLifecycle, Validation};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sitegate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::broker::{HttpProviderClient, OAuthBroker, ProviderClient};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory, ResponseCode};
    pub use crate::login::{LoginService, LookupKind};
    pub use crate::middleware::{AuthContext, AuthState, Collaborators, guarded};
    pub use crate::policy::{MatchMode, RequestSource, RoutePolicy};
    pub use crate::storage::{
        AccountStore, MemoryAccountStore, MemorySessionStore, MemoryTaskQueue, SessionStore,
        TaskQueue,
    };
    pub use crate::token::{Audience, Claims, Roles, Scopes, TokenLifecycle};
}
