//! The OAuth broker.
//!
//! Three steps, each a separate HTTP request:
//!
//! 1. [`OAuthBroker::start`]: gate the request against the allow-lists,
//!    mint a state credential carrying it, and hand back the provider's
//!    consent URL.
//! 2. [`OAuthBroker::capture`]: the provider redirects back with the state
//!    and a code. Swap the code for a profile, persist it on the state's
//!    session record, and send the browser to the client with a compact
//!    re-signed state credential.
//! 3. [`OAuthBroker::act`]: the client presents the compact credential (the
//!    route forces a persisted check, so the profile is available again)
//!    and asks to log in or register.

use std::sync::Arc;

use serde::Deserialize;

use super::provider::{Provider, ProviderClient, ProviderEndpoints, ProviderProfile};
use super::state::{
    BrokerState, LoginMeta, REQUEST_USERINFO, RegisterMeta, error_url, login_audience,
};
use crate::config::BrokerConfig;
use crate::error::{AuthError, ResponseCode};
use crate::login::{LoginService, LookupKind};
use crate::storage::{Account, AccountStore, NewAccount, Task, TaskQueue};
use crate::token::{
    Audience, Claims, Issued, PrincipalKind, SYSTEM_ID_OAUTH, Scopes, TokenLifecycle, Validation,
};
use crate::AuthResult;

/// Parameters of a broker request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerRequest {
    pub dest: String,
    pub scheme: String,
    pub provider: String,
    pub request: String,
    /// Client metadata, passed through to the action step.
    pub meta: String,
}

/// What the client asks for with a captured profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Login,
    Register,
}

impl ActionKind {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "login" => Some(Self::Login),
            "register" => Some(Self::Register),
            _ => None,
        }
    }
}

/// A completed action: the account is logged in.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub account: Account,
    pub issued: Issued,
    /// The client metadata, echoed back.
    pub meta: serde_json::Value,
}

/// A failed action, with the client metadata to echo back.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ActionFailure {
    #[source]
    pub error: AuthError,
    pub meta: serde_json::Value,
}

impl ActionFailure {
    fn with_meta(error: AuthError, meta: &serde_json::Value) -> Self {
        Self {
            error,
            meta: meta.clone(),
        }
    }
}

impl From<AuthError> for ActionFailure {
    fn from(error: AuthError) -> Self {
        Self {
            error,
            meta: serde_json::Value::Null,
        }
    }
}

/// Runs the redirect-based third-party login protocol.
pub struct OAuthBroker {
    config: BrokerConfig,
    response_url: String,
    lifecycle: Arc<TokenLifecycle>,
    login: Arc<LoginService>,
    accounts: Arc<dyn AccountStore>,
    tasks: Arc<dyn TaskQueue>,
    client: Arc<dyn ProviderClient>,
}

impl OAuthBroker {
    #[must_use]
    pub fn new(
        config: &BrokerConfig,
        lifecycle: Arc<TokenLifecycle>,
        login: Arc<LoginService>,
        accounts: Arc<dyn AccountStore>,
        tasks: Arc<dyn TaskQueue>,
        client: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            config: config.clone(),
            response_url: config.response_url(),
            lifecycle,
            login,
            accounts,
            tasks,
            client,
        }
    }

    // -------------------------------------------------------------------------
    // Step 1: request
    // -------------------------------------------------------------------------

    /// Starts a flow and returns the provider's consent URL.
    ///
    /// # Errors
    ///
    /// `NOT_ALLOWED` for values outside the allow-lists, checked before
    /// anything else happens; `TECHNICAL` for providers without an
    /// integration and for storage or signing failures.
    pub async fn start(&self, request: BrokerRequest) -> AuthResult<String> {
        let state = BrokerState {
            destination: request.dest,
            request: request.request,
            request_meta: request.meta,
            scheme: request.scheme,
            provider: request.provider,
            response: String::new(),
        };
        state.check_allowed(&self.config.allowed_schemes)?;

        let provider = Provider::parse(&state.provider).ok_or_else(|| {
            AuthError::configuration(format!("no integration for provider {}", state.provider))
        })?;
        let endpoints = ProviderEndpoints::resolve(provider, &self.config.providers);

        let issued = self
            .lifecycle
            .issue_service_oob(SYSTEM_ID_OAUTH, Scopes::OAUTH_STATE, state.to_extra()?)
            .await?;

        tracing::info!(
            provider = %provider,
            destination = %state.destination,
            "OAuth flow started"
        );
        endpoints.consent_url(&self.response_url, &issued.credential)
    }

    // -------------------------------------------------------------------------
    // Step 2: provider response
    // -------------------------------------------------------------------------

    /// Handles the provider's redirect and returns where to send the
    /// browser next: the client destination on success, its error page
    /// otherwise.
    pub async fn capture(&self, state_credential: &str, code: &str) -> String {
        let (claims, state) = match self.load_state(state_credential).await {
            Ok(found) => found,
            Err(err) => return self.failure_url(None, &err),
        };

        let scheme = state.scheme.clone();
        match self.complete_capture(&claims, state, code).await {
            Ok(url) => url,
            Err(err) => self.failure_url(Some(&scheme), &err),
        }
    }

    async fn load_state(&self, raw: &str) -> AuthResult<(Claims, BrokerState)> {
        if raw.is_empty() {
            return Err(AuthError::invalid_token("missing state"));
        }
        match self.lifecycle.validate(raw, true).await? {
            Validation::Valid { claims, .. } if is_state_credential(&claims) => {
                let state = BrokerState::from_extra(&claims.extra)?;
                Ok((claims, state))
            }
            Validation::Refreshed { .. } => Err(AuthError::invalid_token("state expired")),
            _ => Err(AuthError::invalid_token("state rejected")),
        }
    }

    async fn complete_capture(
        &self,
        claims: &Claims,
        mut state: BrokerState,
        code: &str,
    ) -> AuthResult<String> {
        if code.is_empty() {
            return Err(AuthError::invalid_token("provider sent no code"));
        }
        if state.request != REQUEST_USERINFO {
            return Err(AuthError::not_allowed("request", state.request));
        }

        let provider = Provider::parse(&state.provider).ok_or_else(|| {
            AuthError::configuration(format!("no integration for provider {}", state.provider))
        })?;
        let endpoints = ProviderEndpoints::resolve(provider, &self.config.providers);

        let access_token = self
            .client
            .exchange_code(&endpoints, code, &self.response_url)
            .await?;
        let mut profile = self.client.fetch_profile(&endpoints, &access_token).await?;
        profile.uid = format!("{}-{}-{}", self.config.user_id_prefix, provider, profile.uid);

        state.response = serde_json::to_string(&profile)
            .map_err(|e| AuthError::internal(format!("cannot encode profile: {e}")))?;

        // the profile can outgrow a URL; it lives on the record, and the
        // browser only carries the compact credential
        let self_id = claims
            .self_id_number()
            .ok_or_else(|| AuthError::invalid_token("state without self id"))?;
        let persisted = self.lifecycle.update_extra(self_id, state.to_extra()?).await?;
        let compact = self.lifecycle.sign(&persisted.without_extra())?;

        tracing::info!(provider = %provider, self_id, "OAuth response captured");
        Ok(state.destination_url(&compact))
    }

    fn failure_url(&self, scheme: Option<&str>, err: &AuthError) -> String {
        if err.is_server_error() {
            tracing::error!(error = %err, "OAuth response capture failed");
        } else {
            tracing::info!(error = %err, "OAuth response rejected");
        }
        let scheme = scheme
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.fallback_scheme());
        error_url(scheme, err.response_code())
    }

    // -------------------------------------------------------------------------
    // Step 3: action
    // -------------------------------------------------------------------------

    /// Logs in or registers the account behind a captured profile.
    ///
    /// `claims` are the persisted state claims, as a forced check yields
    /// them. Revoking the state afterwards is the route's job.
    ///
    /// # Errors
    ///
    /// `AUTH` when no profile was captured; the login and registration
    /// codes otherwise. Every failure echoes the client metadata.
    pub async fn act(&self, claims: &Claims, action: &str) -> Result<ActionOutcome, ActionFailure> {
        if !is_state_credential(claims) {
            return Err(AuthError::invalid_token("not a state credential").into());
        }
        let state = BrokerState::from_extra(&claims.extra)?;
        if state.request != REQUEST_USERINFO {
            return Err(AuthError::not_allowed("request", state.request).into());
        }
        let profile: ProviderProfile = serde_json::from_str(&state.response)
            .map_err(|_| AuthError::invalid_token("no captured profile"))?;

        match ActionKind::parse(action) {
            Some(ActionKind::Login) => self.act_login(&state, &profile).await,
            Some(ActionKind::Register) => self.act_register(&state, &profile).await,
            None => Err(AuthError::missing_info(format!("unknown action {action:?}")).into()),
        }
    }

    async fn act_login(
        &self,
        state: &BrokerState,
        profile: &ProviderProfile,
    ) -> Result<ActionOutcome, ActionFailure> {
        let (meta, echo) = if state.request_meta.is_empty() {
            (LoginMeta::default(), serde_json::Value::Null)
        } else {
            let meta: LoginMeta = decode_meta(&state.request_meta)?;
            let echo = serde_json::to_value(&meta).unwrap_or_default();
            (meta, echo)
        };

        let audience =
            login_audience(&meta.audience).map_err(|e| ActionFailure::with_meta(e, &echo))?;
        let outcome = self
            .login
            .login(&profile.uid, "", audience, LookupKind::OAuth)
            .await
            .map_err(|failure| ActionFailure::with_meta(failure.error, &echo))?;

        Ok(ActionOutcome {
            account: outcome.account,
            issued: outcome.issued,
            meta: echo,
        })
    }

    async fn act_register(
        &self,
        state: &BrokerState,
        profile: &ProviderProfile,
    ) -> Result<ActionOutcome, ActionFailure> {
        let meta: RegisterMeta = decode_meta(&state.request_meta)?;
        let echo = serde_json::to_value(&meta).unwrap_or_default();
        let fail = |error: AuthError| ActionFailure::with_meta(error, &echo);

        if !meta.terms {
            return Err(fail(AuthError::rejected(ResponseCode::Terms, "terms not accepted")));
        }
        let username = profile.uid.trim().to_lowercase();
        if !username.starts_with(&self.config.user_id_prefix) {
            return Err(fail(AuthError::rejected(
                ResponseCode::InvalidUsername,
                "provider username lacks prefix",
            )));
        }
        if profile.fname.is_empty() || profile.lname.is_empty() {
            return Err(fail(AuthError::missing_info("first and last name are required")));
        }
        let audience = login_audience(&meta.audience).map_err(fail)?;

        let account = self
            .accounts
            .register(NewAccount {
                username,
                email: profile.email.clone(),
                fname: profile.fname.clone(),
                lname: profile.lname.clone(),
                active: true,
                ..NewAccount::default()
            })
            .await
            .map_err(fail)?;
        tracing::info!(account_id = account.id, "Registered account via OAuth");

        if meta.newsletter {
            let task = Task::MailingListSync {
                account_id: account.id,
            };
            if let Err(err) = self.tasks.enqueue(task).await {
                tracing::warn!(account_id = account.id, error = %err, "Failed to enqueue mailing list sync");
            }
        }

        let issued = self
            .lifecycle
            .issue_login(&account, audience)
            .await
            .map_err(fail)?;

        Ok(ActionOutcome {
            account,
            issued,
            meta: echo,
        })
    }
}

fn is_state_credential(claims: &Claims) -> bool {
    claims.principal_kind == PrincipalKind::Service
        && claims.subject_id == SYSTEM_ID_OAUTH
        && claims.audience == Audience::OutOfBand
        && claims.scopes.contains(Scopes::OAUTH_STATE)
}

fn decode_meta<T: serde::de::DeserializeOwned>(raw: &str) -> AuthResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| AuthError::internal(format!("unreadable request metadata: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SessionStore;
    use crate::testing::{TEST_SECRET, TestEnv, query_value};
    use crate::token::{JwtService, SigningKeyPair};

    fn request(dest: &str, provider: &str, meta: &str) -> BrokerRequest {
        BrokerRequest {
            dest: dest.to_string(),
            scheme: "sitegate://".to_string(),
            provider: provider.to_string(),
            request: "userinfo".to_string(),
            meta: meta.to_string(),
        }
    }

    /// Runs steps 1 and 2 and returns the compact credential's claims as a
    /// forced check sees them.
    async fn captured(env: &TestEnv, dest: &str, meta: &str) -> Claims {
        let url = env.state.broker.start(request(dest, "google", meta)).await.unwrap();
        let state = query_value(&url, "state").unwrap();

        let redirect = env.state.broker.capture(&state, "code-1").await;
        let prefix = format!("sitegate://{dest}/");
        let compact = redirect.strip_prefix(&prefix).unwrap();

        env.state
            .lifecycle
            .validate(compact, true)
            .await
            .unwrap()
            .claims()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_gates_before_issuing() {
        let env = TestEnv::new();
        let err = env
            .state
            .broker
            .start(request("evil/dest", "google", ""))
            .await
            .unwrap_err();
        assert_eq!(err.response_code(), ResponseCode::NotAllowed);
        assert!(env.sessions.is_empty());

        let url = env
            .state
            .broker
            .start(request("oauth-action/login", "google", ""))
            .await
            .unwrap();
        assert!(url.contains("client_id=google-client"));
        assert_eq!(env.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_without_integration_is_technical() {
        let env = TestEnv::new();
        let err = env
            .state
            .broker
            .start(request("oauth-action/login", "clever", ""))
            .await
            .unwrap_err();
        assert_eq!(err.response_code(), ResponseCode::Technical);
        assert!(env.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_capture_persists_profile_and_compacts() {
        let env = TestEnv::new();
        let claims = captured(&env, "oauth-action/login", "").await;

        let state = BrokerState::from_extra(&claims.extra).unwrap();
        let profile: ProviderProfile = serde_json::from_str(&state.response).unwrap();
        assert_eq!(profile.uid, "oauth-google-g-1");
        assert_eq!(profile.fname, "Ada");
    }

    #[tokio::test]
    async fn test_capture_compact_credential_has_no_extra() {
        let env = TestEnv::new();
        let url = env
            .state
            .broker
            .start(request("oauth-action/login", "google", ""))
            .await
            .unwrap();
        let state = query_value(&url, "state").unwrap();
        let redirect = env.state.broker.capture(&state, "code-1").await;
        let compact = redirect.rsplit('/').next().unwrap();

        let codec = JwtService::new(
            SigningKeyPair::from_secret("test", TEST_SECRET).unwrap(),
            env.state.config.issuer.clone(),
        );
        let on_the_wire = codec.verify(compact, env.state.lifecycle.now()).unwrap().unwrap();
        assert!(on_the_wire.claims.extra.is_empty());
        assert_eq!(on_the_wire.claims.audience, Audience::OutOfBand);

        let forced = env.state.lifecycle.validate(compact, true).await.unwrap();
        assert!(!forced.claims().unwrap().extra.is_empty());
    }

    #[tokio::test]
    async fn test_capture_failures_redirect_to_error_page() {
        let env = TestEnv::new();

        let redirect = env.state.broker.capture("garbage", "code-1").await;
        assert_eq!(redirect, "http://localhost:8080/status/AUTH");

        let url = env
            .state
            .broker
            .start(request("oauth-action/login", "google", ""))
            .await
            .unwrap();
        let state = query_value(&url, "state").unwrap();

        let redirect = env.state.broker.capture(&state, "").await;
        assert_eq!(redirect, "sitegate://status/AUTH");

        env.provider.fail_exchange(true);
        let redirect = env.state.broker.capture(&state, "code-1").await;
        assert_eq!(redirect, "sitegate://status/TECHNICAL");
    }

    #[tokio::test]
    async fn test_capture_rejects_expired_state() {
        let env = TestEnv::new();
        let url = env
            .state
            .broker
            .start(request("oauth-action/login", "google", ""))
            .await
            .unwrap();
        let state = query_value(&url, "state").unwrap();

        env.clock.advance(time::Duration::hours(2));
        let redirect = env.state.broker.capture(&state, "code-1").await;
        // the state is unreadable, so the fallback scheme is used
        assert_eq!(redirect, "http://localhost:8080/status/AUTH");
    }

    #[tokio::test]
    async fn test_uncaptured_state_cannot_act() {
        let env = TestEnv::new();
        let url = env
            .state
            .broker
            .start(request("oauth-action/login", "google", ""))
            .await
            .unwrap();
        let state = query_value(&url, "state").unwrap();
        let claims = env
            .state
            .lifecycle
            .validate(&state, true)
            .await
            .unwrap()
            .claims()
            .cloned()
            .unwrap();

        let err = env.state.broker.act(&claims, "login").await.unwrap_err();
        assert_eq!(err.error.response_code(), ResponseCode::Auth);
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let env = TestEnv::new();
        let meta = r#"{"aud":"app","terms":true,"newsletter":true,"appId":"web"}"#;
        let claims = captured(&env, "oauth-action/register", meta).await;

        let outcome = env.state.broker.act(&claims, "register").await.unwrap();
        assert_eq!(outcome.account.username, "oauth-google-g-1");
        assert!(outcome.account.active);
        assert_eq!(outcome.issued.claims.audience, Audience::App);
        assert_eq!(outcome.meta["appId"], "web");
        assert_eq!(
            env.tasks.queued().await,
            vec![Task::MailingListSync {
                account_id: outcome.account.id
            }]
        );

        let claims = captured(&env, "oauth-action/login", r#"{"aud":"cookie"}"#).await;
        let outcome = env.state.broker.act(&claims, "login").await.unwrap();
        assert_eq!(outcome.account.username, "oauth-google-g-1");
        assert!(!outcome.issued.claims.session_id.is_empty());
    }

    #[tokio::test]
    async fn test_register_failures() {
        let env = TestEnv::new();

        let claims = captured(&env, "oauth-action/register", r#"{"aud":"app","terms":false}"#).await;
        let err = env.state.broker.act(&claims, "register").await.unwrap_err();
        assert_eq!(err.error.response_code(), ResponseCode::Terms);
        assert_eq!(err.meta["aud"], "app");

        let claims = captured(&env, "oauth-action/register", "").await;
        let err = env.state.broker.act(&claims, "register").await.unwrap_err();
        assert_eq!(err.error.response_code(), ResponseCode::Technical);

        env.provider.set_profile(ProviderProfile {
            uid: "g-2".to_string(),
            email: "x@example.com".to_string(),
            fname: String::new(),
            lname: "Lovelace".to_string(),
            aurl: String::new(),
        });
        let claims = captured(&env, "oauth-action/register", r#"{"aud":"app","terms":true}"#).await;
        let err = env.state.broker.act(&claims, "register").await.unwrap_err();
        assert_eq!(err.error.response_code(), ResponseCode::MissingInfo);
    }

    #[tokio::test]
    async fn test_register_duplicate_is_user_exists() {
        let env = TestEnv::new();
        let meta = r#"{"aud":"app","terms":true}"#;

        let claims = captured(&env, "oauth-action/register", meta).await;
        env.state.broker.act(&claims, "register").await.unwrap();

        let claims = captured(&env, "oauth-action/register", meta).await;
        let err = env.state.broker.act(&claims, "register").await.unwrap_err();
        assert_eq!(err.error.response_code(), ResponseCode::UserExists);
    }

    #[tokio::test]
    async fn test_newsletter_enqueue_failure_is_not_fatal() {
        let env = TestEnv::new();
        env.tasks.reject_all(true);
        let claims = captured(
            &env,
            "oauth-action/register",
            r#"{"aud":"app","terms":true,"newsletter":true}"#,
        )
        .await;

        assert!(env.state.broker.act(&claims, "register").await.is_ok());
        assert!(env.tasks.queued().await.is_empty());
    }

    #[tokio::test]
    async fn test_login_unknown_account() {
        let env = TestEnv::new();
        let claims = captured(&env, "oauth-action/login", r#"{"aud":"app"}"#).await;
        let err = env.state.broker.act(&claims, "login").await.unwrap_err();
        assert_eq!(err.error.response_code(), ResponseCode::NoUsername);
        assert_eq!(err.meta["aud"], "app");
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let env = TestEnv::new();
        let claims = captured(&env, "oauth-action/login", "").await;
        let err = env.state.broker.act(&claims, "delete").await.unwrap_err();
        assert_eq!(err.error.response_code(), ResponseCode::MissingInfo);

        let self_id = claims.self_id_number().unwrap();
        assert!(env.sessions.load(self_id).await.unwrap().is_some());
    }
}
