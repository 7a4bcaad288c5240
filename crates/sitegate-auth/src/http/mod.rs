//! Axum HTTP handlers for the account endpoints.
//!
//! # Available Handlers
//!
//! - [`session`] - password login, logout, explicit refresh
//! - [`activation`] - consumes emailed activation links
//! - [`oauth`] - the three OAuth broker steps
//!
//! [`account_routes`] binds them to their paths and route policies.

pub mod activation;
pub mod oauth;
pub mod session;

use axum::{
    Router,
    routing::{get, post},
};

pub use activation::activate_handler;
pub use oauth::{oauth_action_handler, oauth_request_handler, oauth_response_handler};
pub use session::{login_handler, logout_handler, refresh_handler};

use crate::middleware::{AuthState, guarded};
use crate::policy::{MatchMode, RoutePolicy};
use crate::token::Scopes;

pub const LOGIN_PATH: &str = "/account/login";
pub const LOGOUT_PATH: &str = "/account/logout";
pub const REFRESH_PATH: &str = "/account/login-token-refresh";
pub const ACTIVATE_PATH: &str = "/account/activate";
pub const OAUTH_REQUEST_PATH: &str = "/account/oauth-request";
pub const OAUTH_RESPONSE_PATH: &str = "/account/oauth-response/";
pub const OAUTH_ACTION_PATH: &str = "/account/oauth-action";

/// The account endpoints, each behind its route guard.
pub fn account_routes(state: &AuthState) -> Router<AuthState> {
    Router::new()
        .route(LOGIN_PATH, post(login_handler))
        .route(
            LOGOUT_PATH,
            // single use: a refreshed credential is never handed back
            guarded(post(logout_handler), state, RoutePolicy::public().single_use()),
        )
        .route(
            REFRESH_PATH,
            guarded(
                post(refresh_handler),
                state,
                RoutePolicy::requires(Scopes::ACCOUNT_FULL_ANY, MatchMode::Any).force_db_check(),
            ),
        )
        .route(
            ACTIVATE_PATH,
            guarded(
                post(activate_handler),
                state,
                RoutePolicy::requires(Scopes::OOB_USER_ACTIVATE, MatchMode::All)
                    .activation_route()
                    .force_db_check()
                    .single_use(),
            ),
        )
        .route(
            OAUTH_REQUEST_PATH,
            get(oauth_request_handler).post(oauth_request_handler),
        )
        .route(OAUTH_RESPONSE_PATH, get(oauth_response_handler))
        .route(
            OAUTH_ACTION_PATH,
            guarded(
                post(oauth_action_handler),
                state,
                RoutePolicy::requires(Scopes::OAUTH_STATE, MatchMode::All)
                    .force_db_check()
                    .single_use(),
            ),
        )
}
