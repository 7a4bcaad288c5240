//! HTTP middleware for authentication and authorization.
//!
//! This module provides Axum middleware for:
//!
//! - Credential extraction (bearer header, `jwt` parameter, cookie)
//! - Validation with refresh-on-expiry
//! - Route policy enforcement
//! - Authorization context injection
//! - `{"code": ...}` error responses
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use sitegate_auth::middleware::{AuthContext, guarded};
//! use sitegate_auth::policy::{MatchMode, RoutePolicy};
//! use sitegate_auth::token::Scopes;
//!
//! async fn protected_handler(ctx: AuthContext) -> String {
//!     format!("Hello, {:?}!", ctx.account().map(|a| &a.username))
//! }
//!
//! let app = Router::new()
//!     .route(
//!         "/protected",
//!         guarded(
//!             get(protected_handler),
//!             &auth_state,
//!             RoutePolicy::requires(Scopes::ACCOUNT_FULL_ANY, MatchMode::Any),
//!         ),
//!     )
//!     .with_state(auth_state);
//! ```

pub mod auth;
pub mod error;
pub mod extract;
pub mod types;

pub use auth::{AuthState, Collaborators, RouteGuard, enforce, guarded};
pub use error::{code_response, status_for};
pub use types::AuthContext;
