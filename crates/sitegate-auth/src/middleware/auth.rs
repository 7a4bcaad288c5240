//! Route guard middleware.
//!
//! Each protected route is wrapped with a [`RouteGuard`] carrying its
//! [`RoutePolicy`]. The guard:
//!
//! 1. extracts the credential (header, `jwt` form field, `jwt` query
//!    parameter, cookie)
//! 2. validates it, refreshing if expired
//! 3. evaluates the route policy
//! 4. stores an [`AuthContext`] in the request extensions and runs the handler
//! 5. hands a refreshed credential back (cookie, or a `jwt` field merged into
//!    a JSON body) and revokes single-use credentials
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use sitegate_auth::middleware::guarded;
//! use sitegate_auth::policy::{MatchMode, RoutePolicy};
//! use sitegate_auth::token::Scopes;
//!
//! let app = Router::new()
//!     .route(
//!         "/ping",
//!         guarded(
//!             get(ping),
//!             &auth_state,
//!             RoutePolicy::requires(Scopes::ACCOUNT_FULL_ANY, MatchMode::Any),
//!         ),
//!     )
//!     .with_state(auth_state);
//! ```

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use cookie::Cookie;

use super::extract::{bearer_token, cookie_token, header_str, is_form, jwt_param};
use super::types::AuthContext;
use crate::broker::{OAuthBroker, ProviderClient};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::login::LoginService;
use crate::policy::{Evaluator, RequestSignals, RoutePolicy};
use crate::storage::{AccountStore, SessionStore, TaskQueue};
use crate::token::{Audience, JwtService, SigningKeyPair, TokenLifecycle, Validation};
use crate::AuthResult;

/// Largest form body the guard will buffer while looking for a `jwt` field.
const MAX_FORM_BODY: usize = 64 * 1024;

/// Largest JSON body the guard will rewrite to add a refreshed credential.
const MAX_JSON_BODY: usize = 4 * 1024 * 1024;

// =============================================================================
// Auth State
// =============================================================================

/// External collaborators the auth services are built on.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub tasks: Arc<dyn TaskQueue>,
    pub providers: Arc<dyn ProviderClient>,
    pub clock: Arc<dyn Clock>,
}

/// Shared state of the auth middleware and handlers.
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
    pub lifecycle: Arc<TokenLifecycle>,
    pub evaluator: Arc<Evaluator>,
    pub login: Arc<LoginService>,
    pub broker: Arc<OAuthBroker>,
    pub accounts: Arc<dyn AccountStore>,
    pub tasks: Arc<dyn TaskQueue>,
}

impl AuthState {
    /// Wires every auth service from one configuration.
    #[must_use]
    pub fn new(config: AuthConfig, signing_key: SigningKeyPair, deps: Collaborators) -> Self {
        let jwt = JwtService::new(signing_key, config.issuer.clone());
        let lifecycle = Arc::new(TokenLifecycle::new(
            jwt,
            deps.sessions,
            deps.accounts.clone(),
            deps.clock,
            config.tokens.clone(),
        ));
        let login = Arc::new(LoginService::new(
            lifecycle.clone(),
            deps.accounts.clone(),
            &config.broker,
        ));
        let broker = Arc::new(OAuthBroker::new(
            &config.broker,
            lifecycle.clone(),
            login.clone(),
            deps.accounts.clone(),
            deps.tasks.clone(),
            deps.providers,
        ));

        Self {
            evaluator: Arc::new(Evaluator::new(&config)),
            config: Arc::new(config),
            lifecycle,
            login,
            broker,
            accounts: deps.accounts,
            tasks: deps.tasks,
        }
    }

    /// The cookie carrying a COOKIE-audience credential.
    #[must_use]
    pub fn credential_cookie(&self, credential: &str) -> Cookie<'static> {
        self.config
            .cookie
            .build(credential, self.lifecycle.final_duration(Audience::Cookie))
    }
}

// =============================================================================
// Route Guard
// =============================================================================

/// Middleware state: the auth services plus one route's policy.
#[derive(Clone)]
pub struct RouteGuard {
    state: AuthState,
    policy: RoutePolicy,
}

impl RouteGuard {
    #[must_use]
    pub fn new(state: AuthState, policy: RoutePolicy) -> Self {
        Self { state, policy }
    }
}

/// Wraps a method router with a [`RouteGuard`] for `policy`.
pub fn guarded<S>(route: MethodRouter<S>, state: &AuthState, policy: RoutePolicy) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.layer(from_fn_with_state(
        RouteGuard::new(state.clone(), policy),
        enforce,
    ))
}

/// The guard itself, for use with `axum::middleware::from_fn_with_state`.
pub async fn enforce(State(guard): State<RouteGuard>, request: Request, next: Next) -> Response {
    let RouteGuard { state, policy } = guard;

    let (mut request, raw) = match take_credential(request, &state.config.cookie.name).await {
        Ok(found) => found,
        Err(err) => return err.into_response(),
    };

    let validation = match &raw {
        Some(raw) => match state.lifecycle.validate(raw, policy.force_db_check).await {
            Ok(validation) => validation,
            Err(err) if policy.is_public() => {
                tracing::warn!(error = %err, "Credential check failed on public route");
                Validation::Rejected
            }
            Err(err) => return err.into_response(),
        },
        None => Validation::Rejected,
    };

    let decision = {
        let headers = request.headers();
        let signals = RequestSignals {
            session_header: header_str(headers, &state.config.csrf.session_header),
            task_queue_name: header_str(headers, &state.config.request_source.task_queue_header),
            inbound_app_id: header_str(headers, &state.config.request_source.peer_app_header),
        };
        state
            .evaluator
            .evaluate(&policy, validation.claims(), validation.principal(), &signals)
    };
    if let Some(reason) = decision.deny_reason() {
        tracing::info!(reason = %reason, path = %request.uri().path(), "Access denied");
        return policy.denial(reason.as_str()).into_response();
    }

    let ctx = match validation {
        Validation::Valid { claims, principal } => AuthContext {
            claims: Some(claims),
            principal: Some(principal),
            credential: raw,
            refreshed: false,
        },
        Validation::Refreshed {
            claims,
            principal,
            credential,
        } => AuthContext {
            claims: Some(claims),
            principal: Some(principal),
            credential: Some(credential),
            refreshed: true,
        },
        Validation::Rejected => AuthContext::default(),
    };
    let audience = ctx.claims.as_ref().map(|c| c.audience);
    let self_id = ctx.self_id();
    let refreshed = ctx.refreshed.then(|| ctx.credential.clone()).flatten();

    request.extensions_mut().insert(ctx);
    let response = next.run(request).await;

    if policy.single_use {
        if let (Some(self_id), true) = (self_id, response.status().is_success()) {
            if let Err(err) = state.lifecycle.revoke(self_id).await {
                tracing::warn!(self_id, error = %err, "Failed to revoke single-use credential");
            }
        }
        return response;
    }

    match (refreshed, audience) {
        (Some(credential), Some(Audience::Cookie)) => {
            with_cookie(response, &state.credential_cookie(&credential))
        }
        (Some(credential), _) => merge_jwt(response, &credential).await,
        _ => response,
    }
}

/// Finds the credential, buffering a form body if that is where it might be.
async fn take_credential(
    request: Request,
    cookie_name: &str,
) -> AuthResult<(Request, Option<String>)> {
    if let Some(token) = bearer_token(request.headers()) {
        return Ok((request, Some(token)));
    }

    let request = if is_form(request.headers()) {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, MAX_FORM_BODY)
            .await
            .map_err(|e| AuthError::missing_info(format!("unreadable form body: {e}")))?;
        if let Some(token) = jwt_param(&bytes) {
            return Ok((Request::from_parts(parts, Body::from(bytes)), Some(token)));
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };

    if let Some(token) = request.uri().query().and_then(|q| jwt_param(q.as_bytes())) {
        return Ok((request, Some(token)));
    }

    let token = cookie_token(request.headers(), cookie_name);
    Ok((request, token))
}

/// Appends a `Set-Cookie` header.
pub(crate) fn with_cookie(mut response: Response, cookie: &Cookie<'_>) -> Response {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(err) => tracing::error!(error = %err, "Cookie is not a valid header value"),
    }
    response
}

/// Adds `"jwt": credential` to a JSON object body, unless the handler
/// already set one.
async fn merge_jwt(response: Response, credential: &str) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_JSON_BODY).await {
        Ok(bytes) => bytes,
        Err(err) => return AuthError::internal(format!("unreadable response body: {err}")).into_response(),
    };

    let merged = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(mut map)) => {
            map.entry("jwt")
                .or_insert_with(|| serde_json::Value::String(credential.to_string()));
            serde_json::to_vec(&map).unwrap_or_else(|_| bytes.to_vec())
        }
        _ => return Response::from_parts(parts, Body::from(bytes)),
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(merged))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::StatusCode,
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::policy::MatchMode;
    use crate::testing::{TestEnv, body_json, request};
    use crate::token::Scopes;

    async fn whoami(ctx: AuthContext) -> Json<Value> {
        Json(json!({
            "uid": ctx.claims.as_ref().map(|c| c.subject_id),
            "refreshed": ctx.refreshed,
        }))
    }

    fn app(env: &TestEnv, policy: RoutePolicy) -> Router {
        Router::new()
            .route("/whoami", guarded(get(whoami).post(whoami), &env.state, policy))
            .with_state(env.state.clone())
    }

    fn full_any() -> RoutePolicy {
        RoutePolicy::requires(Scopes::ACCOUNT_FULL_ANY, MatchMode::Any)
    }

    #[tokio::test]
    async fn test_bearer_credential_accepted() {
        let env = TestEnv::new();
        let issued = env.login(Audience::App).await;

        let response = app(&env, full_any())
            .oneshot(request("GET", "/whoami").bearer(&issued.credential).build())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["uid"], 42);
        assert!(json.get("jwt").is_none());
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth() {
        let env = TestEnv::new();
        let response = app(&env, full_any())
            .oneshot(request("GET", "/whoami").build())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "AUTH");
    }

    #[tokio::test]
    async fn test_out_of_band_route_denial_is_auth_oob() {
        let env = TestEnv::new();
        let issued = env.login(Audience::App).await;
        let policy = RoutePolicy::requires(Scopes::OOB_USER_EMAIL_CHANGE, MatchMode::All);

        let response = app(&env, policy)
            .oneshot(request("GET", "/whoami").bearer(&issued.credential).build())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["code"], "AUTH_OOB");
    }

    #[tokio::test]
    async fn test_query_and_form_parameters() {
        let env = TestEnv::new();
        let issued = env.login(Audience::App).await;

        let response = app(&env, full_any())
            .oneshot(request("GET", &format!("/whoami?jwt={}", issued.credential)).build())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(&env, full_any())
            .oneshot(
                request("POST", "/whoami")
                    .form(&format!("other=1&jwt={}", issued.credential))
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_form_body_beats_query_string() {
        let env = TestEnv::new();
        let issued = env.login(Audience::App).await;

        let response = app(&env, full_any())
            .oneshot(
                request("POST", "/whoami?jwt=garbage")
                    .form(&format!("jwt={}", issued.credential))
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let uri = format!("/whoami?jwt={}", issued.credential);
        let response = app(&env, full_any())
            .oneshot(request("POST", &uri).form("jwt=garbage").build())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_header_beats_cookie() {
        let env = TestEnv::new();
        let issued = env.login(Audience::App).await;

        let response = app(&env, full_any())
            .oneshot(
                request("GET", "/whoami")
                    .bearer(&issued.credential)
                    .cookie(&env.state.config.cookie.name, "garbage")
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cookie_requires_csrf_header() {
        let env = TestEnv::new();
        let issued = env.login(Audience::Cookie).await;
        let cookie_name = env.state.config.cookie.name.clone();

        let response = app(&env, full_any())
            .oneshot(
                request("GET", "/whoami")
                    .cookie(&cookie_name, &issued.credential)
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(&env, full_any())
            .oneshot(
                request("GET", "/whoami")
                    .cookie(&cookie_name, &issued.credential)
                    .header("x-session-id", &issued.claims.session_id)
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_merges_jwt_into_json() {
        let env = TestEnv::new();
        let issued = env.login(Audience::App).await;
        env.clock.advance(time::Duration::hours(2));

        let response = app(&env, full_any())
            .oneshot(request("GET", "/whoami").bearer(&issued.credential).build())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["refreshed"], true);
        let jwt = json["jwt"].as_str().unwrap();
        assert_ne!(jwt, issued.credential);
    }

    #[tokio::test]
    async fn test_refresh_sets_cookie_for_cookie_audience() {
        let env = TestEnv::new();
        let issued = env.login(Audience::Cookie).await;
        // inside the sliding window, so the record outlives the credential
        env.clock.advance(time::Duration::minutes(40));
        env.validate_now(&issued.credential).await;
        env.clock.advance(time::Duration::minutes(30));

        let response = app(&env, full_any())
            .oneshot(
                request("GET", "/whoami")
                    .cookie(&env.state.config.cookie.name, &issued.credential)
                    .header("x-session-id", &issued.claims.session_id)
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with("sitegate_jwt="));
        assert!(set_cookie.contains("Max-Age=3600"));
        assert!(body_json(response).await.get("jwt").is_none());
    }

    #[tokio::test]
    async fn test_single_use_revokes_after_success() {
        let env = TestEnv::new();
        let issued = env.login(Audience::App).await;
        let policy = full_any().single_use();

        let response = app(&env, policy)
            .oneshot(request("POST", "/whoami").bearer(&issued.credential).build())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let self_id = issued.claims.self_id_number().unwrap();
        assert!(env.sessions.load(self_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_is_technical() {
        let env = TestEnv::new();
        let issued = env.login(Audience::App).await;
        env.sessions.fail_loads(true);

        let response = app(&env, full_any().force_db_check())
            .oneshot(request("GET", "/whoami").bearer(&issued.credential).build())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], "TECHNICAL");
    }

    #[tokio::test]
    async fn test_public_route_passes_without_credential() {
        let env = TestEnv::new();
        let response = Router::new()
            .route(
                "/open",
                guarded(post(whoami), &env.state, RoutePolicy::public()),
            )
            .with_state(env.state.clone())
            .oneshot(request("POST", "/open").build())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["uid"], Value::Null);
    }
}
