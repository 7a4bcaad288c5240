//! Allow/deny decision for one request.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. required roles
//! 2. request source
//! 3. public route (allow, nothing else is checked)
//! 4. credential present and principal resolved
//! 5. account active, unless this is the activation route
//! 6. CSRF binding for COOKIE credentials
//! 7. scope match, ALL or ANY
//!
//! The [`DenyReason`] is for server logs only. Callers turn every denial
//! into one of two client codes via [`RoutePolicy::denial`].

use std::fmt;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::policy::route::{MatchMode, RequestSource, RoutePolicy};
use crate::token::{Audience, Claims, Principal};

/// Out-of-band request facts the evaluator looks at besides the credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSignals<'a> {
    /// Value of the CSRF session header.
    pub session_header: Option<&'a str>,
    /// Value of the task-runner header.
    pub task_queue_name: Option<&'a str>,
    /// Value of the peer-service header.
    pub inbound_app_id: Option<&'a str>,
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingRole,
    WrongRequestSource,
    NoCredential,
    UnresolvedPrincipal,
    InactiveAccount,
    CsrfMismatch,
    InsufficientScope,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRole => "missing-role",
            Self::WrongRequestSource => "wrong-request-source",
            Self::NoCredential => "no-credential",
            Self::UnresolvedPrincipal => "unresolved-principal",
            Self::InactiveAccount => "inactive-account",
            Self::CsrfMismatch => "csrf-mismatch",
            Self::InsufficientScope => "insufficient-scope",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    #[must_use]
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Deny(reason) => Some(*reason),
            Self::Allow => None,
        }
    }

    /// Collapses the decision into the error the client sees.
    ///
    /// # Errors
    ///
    /// `AUTH` or `AUTH_OOB` on denial, depending on the route.
    pub fn into_result(self, policy: &RoutePolicy) -> Result<(), AuthError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(policy.denial(reason.as_str())),
        }
    }
}

/// Applies route policies.
#[derive(Debug, Clone)]
pub struct Evaluator {
    skip_csrf: bool,
    suspend_auth: bool,
    peer_app_id: String,
}

impl Evaluator {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            skip_csrf: config.csrf.skip_check,
            suspend_auth: config.suspend_auth,
            peer_app_id: config.request_source.peer_app_id.clone(),
        }
    }

    /// Decides whether a request may reach the route handler.
    ///
    /// `claims` and `principal` come from credential validation; both are
    /// `None` when no usable credential was presented.
    #[must_use]
    pub fn evaluate(
        &self,
        policy: &RoutePolicy,
        claims: Option<&Claims>,
        principal: Option<&Principal>,
        signals: &RequestSignals<'_>,
    ) -> AccessDecision {
        let account = principal.and_then(Principal::account);

        if !policy.required_roles.is_empty()
            && !account.is_some_and(|a| a.roles.intersects(policy.required_roles))
        {
            return AccessDecision::Deny(DenyReason::MissingRole);
        }

        if let Some(source) = policy.request_source {
            if !self.source_matches(source, signals) {
                return AccessDecision::Deny(DenyReason::WrongRequestSource);
            }
        }

        if policy.is_public() || self.suspend_auth {
            return AccessDecision::Allow;
        }

        let Some(claims) = claims else {
            return AccessDecision::Deny(DenyReason::NoCredential);
        };
        if !principal.is_some_and(Principal::is_resolved) {
            return AccessDecision::Deny(DenyReason::UnresolvedPrincipal);
        }

        if account.is_some_and(|a| !a.active) && !policy.activation_route {
            return AccessDecision::Deny(DenyReason::InactiveAccount);
        }

        if claims.audience == Audience::Cookie
            && !policy.skip_csrf
            && !self.skip_csrf
            && !csrf_bound(claims, signals.session_header)
        {
            return AccessDecision::Deny(DenyReason::CsrfMismatch);
        }

        let granted = match policy.match_mode {
            MatchMode::Any => claims.scopes.intersects(policy.required_scopes),
            MatchMode::All => claims.scopes.contains(policy.required_scopes),
        };
        if granted {
            AccessDecision::Allow
        } else {
            AccessDecision::Deny(DenyReason::InsufficientScope)
        }
    }

    fn source_matches(&self, source: RequestSource, signals: &RequestSignals<'_>) -> bool {
        match source {
            RequestSource::TaskRunner => signals.task_queue_name.is_some_and(|v| !v.is_empty()),
            RequestSource::PeerService => {
                !self.peer_app_id.is_empty() && signals.inbound_app_id == Some(self.peer_app_id.as_str())
            }
        }
    }
}

fn csrf_bound(claims: &Claims, header: Option<&str>) -> bool {
    match header {
        Some(header) => !claims.session_id.is_empty() && !header.is_empty() && header == claims.session_id,
        None => false,
    }
}
