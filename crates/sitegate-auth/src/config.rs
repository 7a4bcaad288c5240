//! Authentication and authorization configuration.
//!
//! One [`AuthConfig`] is built at startup and handed by reference to every
//! component constructor. Nothing here is global.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use crate::token::jwt::SigningAlgorithm;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://accounts.example.com"
///
/// [auth.tokens]
/// short_duration = "1h"
/// long_duration = "7d"
///
/// [auth.broker]
/// allowed_schemes = ["myapp://", "https://www.example.com/"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token issuer (`iss` claim).
    pub issuer: String,

    pub tokens: TokenConfig,

    pub signing: SigningConfig,

    pub cookie: CookieConfig,

    pub csrf: CsrfConfig,

    pub request_source: RequestSourceConfig,

    pub broker: BrokerConfig,

    /// Development switch: skip scope, CSRF and account-activity checks.
    /// Role and request-source constraints still apply.
    pub suspend_auth: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            tokens: TokenConfig::default(),
            signing: SigningConfig::default(),
            cookie: CookieConfig::default(),
            csrf: CsrfConfig::default(),
            request_source: RequestSourceConfig::default(),
            broker: BrokerConfig::default(),
            suspend_auth: false,
        }
    }
}

/// Credential lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of a signed credential (`exp - iat`), and the final
    /// duration of COOKIE and OUT_OF_BAND sessions.
    #[serde(with = "humantime_serde")]
    pub short_duration: Duration,

    /// Final duration of APP sessions.
    #[serde(with = "humantime_serde")]
    pub long_duration: Duration,

    /// APP sessions never reach a final expiry.
    pub app_never_expires: bool,
}

impl TokenConfig {
    #[must_use]
    pub fn short_secs(&self) -> i64 {
        duration_secs(self.short_duration)
    }

    #[must_use]
    pub fn long_secs(&self) -> i64 {
        duration_secs(self.long_duration)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            short_duration: Duration::from_secs(3600),
            long_duration: Duration::from_secs(7 * 24 * 3600),
            app_never_expires: false,
        }
    }
}

fn duration_secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

/// Token signing configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    /// Supported: "HS256", "RS256", "RS384", "ES384"
    pub algorithm: String,

    /// HS256 shared secret. When empty a random secret is generated at
    /// startup and credentials do not survive a restart.
    pub secret: String,

    /// PEM private key for the asymmetric algorithms.
    pub private_key_path: Option<PathBuf>,

    /// PEM public key (RSA only; EC derives it from the private key).
    pub public_key_path: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            secret: String::new(),
            private_key_path: None,
            public_key_path: None,
        }
    }
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("algorithm", &self.algorithm)
            .field("secret", &if self.secret.is_empty() { "" } else { "***" })
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .finish()
    }
}

/// Attributes of the credential cookie.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    pub secure: bool,
    pub http_only: bool,
    pub domain: Option<String>,
}

impl CookieConfig {
    /// Builds the cookie carrying `value`. A non-positive `max_age` yields a
    /// browser-session cookie.
    #[must_use]
    pub fn build(&self, value: impl Into<String>, max_age: i64) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), value.into()))
            .path("/")
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(SameSite::Lax);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if max_age > 0 {
            builder = builder.max_age(time::Duration::seconds(max_age));
        }
        builder.build()
    }

    /// Builds the removal cookie: empty value, expired immediately.
    #[must_use]
    pub fn clear(&self) -> Cookie<'static> {
        let mut cookie = self.build(String::new(), 0);
        cookie.make_removal();
        cookie
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "sitegate_jwt".to_string(),
            secure: true,
            http_only: true,
            domain: None,
        }
    }
}

/// Anti-CSRF binding for COOKIE credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Request header that must echo the credential's session id.
    pub session_header: String,

    /// Site-wide bypass of the binding check.
    pub skip_check: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            session_header: "x-session-id".to_string(),
            skip_check: false,
        }
    }
}

/// Headers that identify trusted internal callers.
///
/// These are set by the platform's front end, which strips them from
/// external traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestSourceConfig {
    /// Present (non-empty) on requests from the scheduled task runner.
    pub task_queue_header: String,

    /// Carries the calling service id on peer-service requests.
    pub peer_app_header: String,

    /// The one peer service allowed through.
    pub peer_app_id: String,
}

impl Default for RequestSourceConfig {
    fn default() -> Self {
        Self {
            task_queue_header: "x-task-queue-name".to_string(),
            peer_app_header: "x-inbound-app-id".to_string(),
            peer_app_id: String::new(),
        }
    }
}

/// OAuth broker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Allowed client redirect schemes (URL prefixes). The last one is the
    /// fallback used for error redirects.
    pub allowed_schemes: Vec<String>,

    /// Public base URL of this service, with trailing slash. The provider
    /// redirect URL is derived from it.
    pub api_hostname: String,

    /// Prefix of synthetic usernames for provider-backed accounts.
    pub user_id_prefix: String,

    /// Timeout for calls to the provider.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    pub providers: ProvidersConfig,
}

impl BrokerConfig {
    /// Scheme used when the request did not carry a usable one.
    #[must_use]
    pub fn fallback_scheme(&self) -> &str {
        self.allowed_schemes.last().map(String::as_str).unwrap_or_default()
    }

    /// Where providers send the browser back to.
    #[must_use]
    pub fn response_url(&self) -> String {
        format!("{}account/oauth-response/", self.api_hostname)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: vec![
                "sitegate://".to_string(),
                "http://localhost:8080/".to_string(),
            ],
            api_hostname: "http://localhost:8080/".to_string(),
            user_id_prefix: "oauth".to_string(),
            request_timeout: Duration::from_secs(10),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Per-provider client registrations.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub google: ProviderConfig,
    pub facebook: ProviderConfig,
}

/// Client registration with one provider. Endpoint URLs fall back to the
/// provider's public endpoints when unset.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub profile_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("profile_url", &self.profile_url)
            .finish_non_exhaustive()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer is empty
    /// - The signing algorithm is not supported
    /// - A non-empty HS256 secret is shorter than 32 bytes
    /// - `short_duration` is zero or `long_duration` is shorter than it
    /// - No redirect scheme is allowed
    /// - The provider username prefix is empty
    ///
    /// Returns `ConfigError::Missing` if only one half of a PEM key pair is
    /// configured for RSA.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        let Some(algorithm) = SigningAlgorithm::parse(&self.signing.algorithm) else {
            return Err(ConfigError::InvalidValue(format!(
                "Invalid signing algorithm: '{}'. Must be HS256, RS256, RS384, or ES384",
                self.signing.algorithm
            )));
        };

        if algorithm.is_symmetric()
            && !self.signing.secret.is_empty()
            && self.signing.secret.len() < 32
        {
            return Err(ConfigError::InvalidValue(
                "HS256 secret must be at least 32 bytes".to_string(),
            ));
        }

        if algorithm.is_rsa()
            && self.signing.private_key_path.is_some() != self.signing.public_key_path.is_some()
        {
            return Err(ConfigError::Missing(
                "RSA signing needs both private_key_path and public_key_path".to_string(),
            ));
        }

        if self.tokens.short_duration.is_zero() {
            return Err(ConfigError::InvalidValue(
                "tokens.short_duration must be > 0".to_string(),
            ));
        }

        if self.tokens.long_duration < self.tokens.short_duration {
            return Err(ConfigError::InvalidValue(
                "tokens.long_duration must not be shorter than tokens.short_duration".to_string(),
            ));
        }

        if self.broker.allowed_schemes.is_empty() {
            return Err(ConfigError::InvalidValue(
                "broker.allowed_schemes cannot be empty".to_string(),
            ));
        }

        // every username starts with ""
        if self.broker.user_id_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "broker.user_id_prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.issuer, "http://localhost:8080");
        assert_eq!(config.tokens.short_secs(), 3600);
        assert_eq!(config.tokens.long_secs(), 604_800);
        assert_eq!(config.signing.algorithm, "HS256");
        assert_eq!(config.csrf.session_header, "x-session-id");
        assert!(!config.suspend_auth);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(AuthConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.issuer = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("issuer"));
    }

    #[test]
    fn test_invalid_algorithm_fails_validation() {
        let mut config = AuthConfig::default();
        config.signing.algorithm = "none".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("signing algorithm"));
    }

    #[test]
    fn test_short_secret_fails_validation() {
        let mut config = AuthConfig::default();
        config.signing.secret = "too-short".to_string();
        assert!(config.validate().is_err());

        config.signing.secret = "x".repeat(32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_half_configured_rsa_keys_fail_validation() {
        let mut config = AuthConfig::default();
        config.signing.algorithm = "RS256".to_string();
        config.signing.private_key_path = Some(PathBuf::from("/keys/private.pem"));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_duration_ordering_fails_validation() {
        let mut config = AuthConfig::default();
        config.tokens.short_duration = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = AuthConfig::default();
        config.tokens.long_duration = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_schemes_fail_validation() {
        let mut config = AuthConfig::default();
        config.broker.allowed_schemes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_user_id_prefix_fails_validation() {
        let mut config = AuthConfig::default();
        config.broker.user_id_prefix = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("user_id_prefix"));
    }

    #[test]
    fn test_humantime_durations_deserialize() {
        let config: AuthConfig = serde_json::from_value(serde_json::json!({
            "tokens": { "short_duration": "30m", "long_duration": "14days" },
            "broker": { "request_timeout": "2s" }
        }))
        .unwrap();
        assert_eq!(config.tokens.short_secs(), 1800);
        assert_eq!(config.tokens.long_secs(), 14 * 86_400);
        assert_eq!(config.broker.request_timeout, Duration::from_secs(2));
        // untouched sections keep their defaults
        assert_eq!(config.cookie.name, "sitegate_jwt");
    }

    #[test]
    fn test_broker_urls() {
        let broker = BrokerConfig::default();
        assert_eq!(broker.fallback_scheme(), "http://localhost:8080/");
        assert_eq!(
            broker.response_url(),
            "http://localhost:8080/account/oauth-response/"
        );
    }

    #[test]
    fn test_cookie_attributes() {
        let mut config = CookieConfig::default();
        config.domain = Some("example.com".to_string());

        let cookie = config.build("token", 3600);
        assert_eq!(cookie.name(), "sitegate_jwt");
        assert_eq!(cookie.value(), "token");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(1)));

        let removal = config.clear();
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn test_signing_debug_redacts_secret() {
        let mut signing = SigningConfig::default();
        signing.secret = "super-secret-value-that-is-long-enough".to_string();
        let debug = format!("{signing:?}");
        assert!(!debug.contains("super-secret"));
    }
}
