//! Authentication context types.
//!
//! The route guard stores an [`AuthContext`] in the request extensions;
//! handlers pull it back out with the `AuthContext` extractor.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::storage::Account;
use crate::token::{Claims, Principal};

/// What the guard learned about the caller.
///
/// On public routes every field may be empty.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    /// Validated claims, if any.
    pub claims: Option<Claims>,

    /// Principal resolved from the claims.
    pub principal: Option<Principal>,

    /// The credential now in force: the presented one, or its replacement
    /// after a refresh.
    pub credential: Option<String>,

    /// The presented credential was expired and has been replaced.
    pub refreshed: bool,
}

impl AuthContext {
    /// The resolved account, if the caller is one.
    #[must_use]
    pub fn account(&self) -> Option<&Account> {
        self.principal.as_ref().and_then(Principal::account)
    }

    /// Id of the session record backing the credential.
    #[must_use]
    pub fn self_id(&self) -> Option<i64> {
        self.claims.as_ref().and_then(Claims::self_id_number)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Audience, PrincipalKind, Scopes};

    #[test]
    fn test_empty_context() {
        let ctx = AuthContext::default();
        assert!(!ctx.is_authenticated());
        assert!(ctx.account().is_none());
        assert!(ctx.self_id().is_none());
    }

    #[test]
    fn test_self_id_from_claims() {
        let ctx = AuthContext {
            claims: Some(Claims {
                self_id: "9".to_string(),
                issuer: String::new(),
                audience: Audience::App,
                subject_id: 1,
                principal_kind: PrincipalKind::Service,
                expires_at: 0,
                issued_at: 0,
                scopes: Scopes::OAUTH_STATE,
                session_id: String::new(),
                final_expires_at: 0,
                subject: String::new(),
                extra: String::new(),
            }),
            principal: Some(Principal::Service(1)),
            credential: None,
            refreshed: false,
        };
        assert_eq!(ctx.self_id(), Some(9));
        assert!(ctx.account().is_none());
    }
}
