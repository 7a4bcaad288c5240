//! Third-party OAuth providers.
//!
//! The broker only needs two calls from a provider: swap an authorization
//! code for an access token, and fetch the user's profile with it. Both
//! sit behind [`ProviderClient`] so tests can stand in for the network.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{BrokerConfig, ProviderConfig, ProvidersConfig};
use crate::error::AuthError;
use crate::AuthResult;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_PROFILE_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/plus.login",
    "https://www.googleapis.com/auth/plus.me",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v3.2/dialog/oauth";
const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v3.2/oauth/access_token";
const FACEBOOK_PROFILE_URL: &str = "https://graph.facebook.com/me";
const FACEBOOK_SCOPES: &[&str] = &["email", "user_about_me", "public_profile"];
const FACEBOOK_FIELDS: &str = "email,first_name,last_name,picture.type(large)";

/// A provider the broker has endpoints for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    /// Maps an allow-listed provider name. Names without an integration
    /// (such as `clever`) yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "google" => Some(Self::Google),
            "facebook" => Some(Self::Facebook),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }

    #[must_use]
    pub fn scopes(&self) -> &'static [&'static str] {
        match self {
            Self::Google => GOOGLE_SCOPES,
            Self::Facebook => FACEBOOK_SCOPES,
        }
    }

    fn registration<'a>(&self, providers: &'a ProvidersConfig) -> &'a ProviderConfig {
        match self {
            Self::Google => &providers.google,
            Self::Facebook => &providers.facebook,
        }
    }

    fn default_urls(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Google => (GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GOOGLE_PROFILE_URL),
            Self::Facebook => (FACEBOOK_AUTH_URL, FACEBOOK_TOKEN_URL, FACEBOOK_PROFILE_URL),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved client registration and endpoints of one provider.
#[derive(Clone)]
pub struct ProviderEndpoints {
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
}

impl ProviderEndpoints {
    /// Configured endpoints, falling back to the provider's public ones.
    #[must_use]
    pub fn resolve(provider: Provider, providers: &ProvidersConfig) -> Self {
        let registration = provider.registration(providers);
        let (auth, token, profile) = provider.default_urls();
        Self {
            provider,
            client_id: registration.client_id.clone(),
            client_secret: registration.client_secret.clone(),
            auth_url: registration.auth_url.clone().unwrap_or_else(|| auth.to_string()),
            token_url: registration.token_url.clone().unwrap_or_else(|| token.to_string()),
            profile_url: registration
                .profile_url
                .clone()
                .unwrap_or_else(|| profile.to_string()),
        }
    }

    /// The provider's consent page, carrying `state` through the redirect.
    ///
    /// # Errors
    ///
    /// `TECHNICAL` if the configured authorization URL does not parse.
    pub fn consent_url(&self, redirect_uri: &str, state: &str) -> AuthResult<String> {
        let mut url = Url::parse(&self.auth_url).map_err(|e| {
            AuthError::configuration(format!("{} auth url: {e}", self.provider))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.provider.scopes().join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "online")
            .append_pair("approval_prompt", "force");
        Ok(url.into())
    }
}

impl fmt::Debug for ProviderEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEndpoints")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("profile_url", &self.profile_url)
            .finish_non_exhaustive()
    }
}

/// Normalised user profile, whatever provider it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lname: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aurl: String,
}

/// Outbound calls to a provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Exchanges an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses or cannot be reached.
    async fn exchange_code(
        &self,
        endpoints: &ProviderEndpoints,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<String>;

    /// Fetches the profile of the token's owner. The `uid` is the
    /// provider's own id, not yet namespaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses or cannot be reached.
    async fn fetch_profile(
        &self,
        endpoints: &ProviderEndpoints,
        access_token: &str,
    ) -> AuthResult<ProviderProfile>;
}

// =============================================================================
// HTTP client
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
    #[serde(default)]
    picture: String,
}

#[derive(Debug, Default, Deserialize)]
struct FacebookPictureData {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct FacebookPicture {
    #[serde(default)]
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookUser {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    picture: FacebookPicture,
}

/// [`ProviderClient`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    http_client: reqwest::Client,
}

impl HttpProviderClient {
    /// Creates a client honouring the broker's request timeout.
    ///
    /// # Errors
    ///
    /// `TECHNICAL` if the HTTP client cannot be built.
    pub fn new(config: &BrokerConfig) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { http_client })
    }
}

fn provider_error(provider: Provider, err: impl fmt::Display) -> AuthError {
    AuthError::identity_provider(provider.as_str(), err.to_string())
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn exchange_code(
        &self,
        endpoints: &ProviderEndpoints,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<String> {
        let provider = endpoints.provider;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", endpoints.client_id.as_str()),
            ("client_secret", endpoints.client_secret.as_str()),
        ];

        tracing::debug!(provider = %provider, url = %endpoints.token_url, "Exchanging authorization code");

        let response = self
            .http_client
            .post(&endpoints.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| provider_error(provider, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(provider, format!("token endpoint HTTP {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| provider_error(provider, format!("unreadable token response: {e}")))?;
        Ok(token.access_token)
    }

    async fn fetch_profile(
        &self,
        endpoints: &ProviderEndpoints,
        access_token: &str,
    ) -> AuthResult<ProviderProfile> {
        let provider = endpoints.provider;
        let request = match provider {
            Provider::Google => self
                .http_client
                .get(&endpoints.profile_url)
                .bearer_auth(access_token),
            Provider::Facebook => self
                .http_client
                .get(&endpoints.profile_url)
                .query(&[("access_token", access_token), ("fields", FACEBOOK_FIELDS)]),
        };

        let response = request.send().await.map_err(|e| provider_error(provider, e))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(provider_error(provider, format!("profile endpoint HTTP {status}")));
        }

        let profile = match provider {
            Provider::Google => {
                let user: GoogleUser = response
                    .json()
                    .await
                    .map_err(|e| provider_error(provider, format!("unreadable profile: {e}")))?;
                ProviderProfile {
                    uid: user.id,
                    email: user.email,
                    fname: user.given_name,
                    lname: user.family_name,
                    aurl: user.picture,
                }
            }
            Provider::Facebook => {
                let user: FacebookUser = response
                    .json()
                    .await
                    .map_err(|e| provider_error(provider, format!("unreadable profile: {e}")))?;
                ProviderProfile {
                    uid: user.id,
                    email: user.email,
                    fname: user.first_name,
                    lname: user.last_name,
                    aurl: user.picture.data.url,
                }
            }
        };
        Ok(profile)
    }
}
