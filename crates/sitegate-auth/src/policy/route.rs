//! Route policy declarations.

use crate::error::AuthError;
use crate::token::{Roles, Scopes};

/// How `required_scopes` are matched against the credential's scopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Every required scope must be present.
    #[default]
    All,
    /// At least one required scope must be present.
    Any,
}

/// Trusted internal origins a route can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSource {
    /// The scheduled task runner.
    TaskRunner,
    /// The declared peer service.
    PeerService,
}

/// Access policy declared by a route.
///
/// # Example
///
/// ```
/// use sitegate_auth::policy::{MatchMode, RoutePolicy};
/// use sitegate_auth::token::Scopes;
///
/// let policy = RoutePolicy::requires(Scopes::ACCOUNT_FULL_ANY, MatchMode::Any).force_db_check();
/// assert!(!policy.is_public());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Empty means public.
    pub required_scopes: Scopes,
    pub match_mode: MatchMode,
    /// Any one of these roles admits the caller.
    pub required_roles: Roles,
    /// Always check the session record, even for unexpired credentials.
    pub force_db_check: bool,
    pub skip_csrf: bool,
    pub request_source: Option<RequestSource>,
    /// Inactive accounts may use this route.
    pub activation_route: bool,
    /// Revoke the credential after the handler succeeds.
    pub single_use: bool,
}

impl RoutePolicy {
    #[must_use]
    pub const fn public() -> Self {
        Self {
            required_scopes: Scopes::NONE,
            match_mode: MatchMode::All,
            required_roles: Roles::NONE,
            force_db_check: false,
            skip_csrf: false,
            request_source: None,
            activation_route: false,
            single_use: false,
        }
    }

    #[must_use]
    pub const fn requires(scopes: Scopes, match_mode: MatchMode) -> Self {
        let mut policy = Self::public();
        policy.required_scopes = scopes;
        policy.match_mode = match_mode;
        policy
    }

    #[must_use]
    pub const fn with_roles(mut self, roles: Roles) -> Self {
        self.required_roles = roles;
        self
    }

    #[must_use]
    pub const fn force_db_check(mut self) -> Self {
        self.force_db_check = true;
        self
    }

    #[must_use]
    pub const fn skip_csrf(mut self) -> Self {
        self.skip_csrf = true;
        self
    }

    #[must_use]
    pub const fn from_source(mut self, source: RequestSource) -> Self {
        self.request_source = Some(source);
        self
    }

    #[must_use]
    pub const fn activation_route(mut self) -> Self {
        self.activation_route = true;
        self
    }

    #[must_use]
    pub const fn single_use(mut self) -> Self {
        self.single_use = true;
        self
    }

    #[must_use]
    pub const fn is_public(&self) -> bool {
        self.required_scopes.is_empty()
    }

    /// The error every denial on this route collapses to: `AUTH_OOB` for
    /// routes that only out-of-band credentials open, `AUTH` otherwise.
    #[must_use]
    pub fn denial(&self, message: impl Into<String>) -> AuthError {
        if self.required_scopes.is_out_of_band_category() {
            AuthError::out_of_band_required(message)
        } else {
            AuthError::unauthorized(message)
        }
    }
}
