//! Shared fixtures for the handler, middleware and broker tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, header, request::Builder},
    response::Response,
};

use crate::broker::{ProviderClient, ProviderEndpoints, ProviderProfile};
use crate::clock::ManualClock;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::middleware::{AuthState, Collaborators};
use crate::password::hash_password;
use crate::storage::{Account, AccountStore, MemoryAccountStore, MemorySessionStore, MemoryTaskQueue};
use crate::token::{Audience, Issued, Roles, SigningKeyPair, Validation};
use crate::AuthResult;

pub(crate) const START: i64 = 1_700_000_000;
pub(crate) const TEST_SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
pub(crate) const TEST_USERNAME: &str = "ada@example.com";
pub(crate) const TEST_PASSWORD: &str = "hunter22";
pub(crate) const TEST_ACCOUNT_ID: i64 = 42;

/// Provider that answers from memory.
pub(crate) struct StubProvider {
    profile: Mutex<ProviderProfile>,
    fail_exchange: AtomicBool,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            profile: Mutex::new(ProviderProfile {
                uid: "g-1".to_string(),
                email: "ada@example.com".to_string(),
                fname: "Ada".to_string(),
                lname: "Lovelace".to_string(),
                aurl: "https://example.com/ada.png".to_string(),
            }),
            fail_exchange: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_profile(&self, profile: ProviderProfile) {
        *self.profile.lock().unwrap() = profile;
    }

    pub(crate) fn fail_exchange(&self, on: bool) {
        self.fail_exchange.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    async fn exchange_code(
        &self,
        endpoints: &ProviderEndpoints,
        code: &str,
        _redirect_uri: &str,
    ) -> AuthResult<String> {
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(AuthError::identity_provider(endpoints.provider.as_str(), "refused"));
        }
        Ok(format!("token-{code}"))
    }

    async fn fetch_profile(
        &self,
        _endpoints: &ProviderEndpoints,
        _access_token: &str,
    ) -> AuthResult<ProviderProfile> {
        Ok(self.profile.lock().unwrap().clone())
    }
}

pub(crate) fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.issuer = "https://accounts.example.com".to_string();
    config.signing.secret = String::from_utf8(TEST_SECRET.to_vec()).unwrap();
    config.broker.providers.google.client_id = "google-client".to_string();
    config.broker.providers.google.client_secret = "google-secret".to_string();
    config
}

/// A fully wired [`AuthState`] over in-memory collaborators, with account
/// 42 (`ada@example.com` / `hunter22`) seeded.
pub(crate) struct TestEnv {
    pub state: AuthState,
    pub clock: Arc<ManualClock>,
    pub sessions: Arc<MemorySessionStore>,
    pub accounts: Arc<MemoryAccountStore>,
    pub tasks: Arc<MemoryTaskQueue>,
    pub provider: Arc<StubProvider>,
}

impl TestEnv {
    pub(crate) fn new() -> Self {
        Self::with_config(test_config())
    }

    pub(crate) fn with_config(config: AuthConfig) -> Self {
        let clock = Arc::new(ManualClock::at_unix(START));
        let sessions = Arc::new(MemorySessionStore::new());
        let accounts = Arc::new(MemoryAccountStore::new());
        let tasks = Arc::new(MemoryTaskQueue::new());
        let provider = Arc::new(StubProvider::new());

        accounts.insert(Account {
            id: TEST_ACCOUNT_ID,
            username: TEST_USERNAME.to_string(),
            password_hash: hash_password(TEST_PASSWORD).unwrap(),
            active: true,
            roles: Roles::NONE,
            parent_id: None,
            email: TEST_USERNAME.to_string(),
            fname: "Ada".to_string(),
            lname: "Lovelace".to_string(),
        });

        let key = SigningKeyPair::from_secret("test", TEST_SECRET).unwrap();
        let state = AuthState::new(
            config,
            key,
            Collaborators {
                sessions: sessions.clone(),
                accounts: accounts.clone(),
                tasks: tasks.clone(),
                providers: provider.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            state,
            clock,
            sessions,
            accounts,
            tasks,
            provider,
        }
    }

    /// Issues a login credential for the seeded account.
    pub(crate) async fn login(&self, audience: Audience) -> Issued {
        let account = self
            .accounts
            .find_by_id(TEST_ACCOUNT_ID)
            .await
            .unwrap()
            .unwrap();
        self.state
            .lifecycle
            .issue_login(&account, audience)
            .await
            .unwrap()
    }

    /// Unforced validation at the current clock.
    pub(crate) async fn validate_now(&self, raw: &str) -> Validation {
        self.state.lifecycle.validate(raw, false).await.unwrap()
    }
}

/// Request builder for `oneshot` calls.
pub(crate) struct TestRequest {
    builder: Builder,
    body: Body,
}

pub(crate) fn request(method: &str, uri: &str) -> TestRequest {
    TestRequest {
        builder: Request::builder().method(method).uri(uri),
        body: Body::empty(),
    }
}

impl TestRequest {
    pub(crate) fn bearer(self, token: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    pub(crate) fn cookie(self, name: &str, value: &str) -> Self {
        self.header(header::COOKIE.as_str(), &format!("{name}={value}"))
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    pub(crate) fn form(mut self, body: &str) -> Self {
        self.builder = self
            .builder
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.body = Body::from(body.to_string());
        self
    }

    pub(crate) fn build(self) -> Request<Body> {
        self.builder.body(self.body).unwrap()
    }
}

pub(crate) async fn body_json(response: Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// A query parameter of an absolute URL.
pub(crate) fn query_value(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
