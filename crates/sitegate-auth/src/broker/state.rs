//! Broker state carried inside the state credential.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ResponseCode};
use crate::token::Audience;
use crate::AuthResult;

/// Request kinds the broker knows how to serve.
pub const ALLOWED_REQUESTS: &[&str] = &["userinfo"];

/// Providers a request may name. Being listed does not imply being
/// configured.
pub const ALLOWED_PROVIDERS: &[&str] = &["google", "facebook", "clever"];

/// Client pages the browser may be sent back to.
pub const ALLOWED_DESTINATIONS: &[&str] = &["oauth-action/login", "oauth-action/register"];

/// The one request kind currently served.
pub const REQUEST_USERINFO: &str = "userinfo";

/// Protocol state, JSON-encoded into the state credential's `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerState {
    #[serde(rename = "dest")]
    pub destination: String,
    pub request: String,
    /// Client metadata, itself a JSON document; see [`LoginMeta`] and
    /// [`RegisterMeta`].
    #[serde(rename = "requestMeta", default, skip_serializing_if = "String::is_empty")]
    pub request_meta: String,
    pub scheme: String,
    pub provider: String,
    /// JSON-encoded provider profile, set once the provider has answered.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,
}

impl BrokerState {
    /// Rejects any field that is not on its allow-list.
    ///
    /// # Errors
    ///
    /// `NOT_ALLOWED` naming the first offending field.
    pub fn check_allowed(&self, schemes: &[String]) -> AuthResult<()> {
        let checks = [
            ("dest", &self.destination, ALLOWED_DESTINATIONS.contains(&self.destination.as_str())),
            ("scheme", &self.scheme, schemes.contains(&self.scheme)),
            ("provider", &self.provider, ALLOWED_PROVIDERS.contains(&self.provider.as_str())),
            ("request", &self.request, ALLOWED_REQUESTS.contains(&self.request.as_str())),
        ];
        for (field, value, allowed) in checks {
            if !allowed {
                return Err(AuthError::not_allowed(field, value.as_str()));
            }
        }
        Ok(())
    }

    /// Decodes the state from a credential's `extra`.
    ///
    /// # Errors
    ///
    /// `AUTH` when `extra` is not a broker state.
    pub fn from_extra(extra: &str) -> AuthResult<Self> {
        serde_json::from_str(extra)
            .map_err(|e| AuthError::invalid_token(format!("unreadable broker state: {e}")))
    }

    /// Encodes the state for a credential's `extra`.
    ///
    /// # Errors
    ///
    /// `TECHNICAL` if serialisation fails.
    pub fn to_extra(&self) -> AuthResult<String> {
        serde_json::to_string(self)
            .map_err(|e| AuthError::internal(format!("cannot encode broker state: {e}")))
    }

    /// Client page that receives the compact credential.
    #[must_use]
    pub fn destination_url(&self, compact_credential: &str) -> String {
        format!("{}{}/{}", self.scheme, self.destination, compact_credential)
    }
}

/// Client page that reports a failed flow.
#[must_use]
pub fn error_url(scheme: &str, code: ResponseCode) -> String {
    format!("{scheme}status/{}", code.as_str())
}

/// Metadata of a `login` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginMeta {
    #[serde(rename = "aud")]
    pub audience: String,
    pub app_id: String,
    pub app_name: String,
    pub app_scheme: String,
    pub app_port: String,
}

/// Metadata of a `register` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterMeta {
    #[serde(rename = "aud")]
    pub audience: String,
    pub terms: bool,
    pub newsletter: bool,
    pub app_id: String,
    pub app_name: String,
    pub app_scheme: String,
    pub app_port: String,
}

/// Parses the login audience a client asked for.
///
/// # Errors
///
/// `MISSINGINFO` for anything but `app` and `cookie`.
pub fn login_audience(value: &str) -> AuthResult<Audience> {
    match Audience::parse(value) {
        Some(audience @ (Audience::App | Audience::Cookie)) => Ok(audience),
        _ => Err(AuthError::missing_info(format!("login audience {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemes() -> Vec<String> {
        vec!["sitegate://".to_string(), "https://www.example.com/".to_string()]
    }

    fn valid() -> BrokerState {
        BrokerState {
            destination: "oauth-action/login".to_string(),
            request: "userinfo".to_string(),
            request_meta: String::new(),
            scheme: "sitegate://".to_string(),
            provider: "google".to_string(),
            response: String::new(),
        }
    }

    #[test]
    fn test_allow_lists() {
        assert!(valid().check_allowed(&schemes()).is_ok());

        let state = BrokerState {
            destination: "evil/dest".to_string(),
            ..valid()
        };
        let err = state.check_allowed(&schemes()).unwrap_err();
        assert_eq!(err.response_code(), ResponseCode::NotAllowed);

        let state = BrokerState {
            scheme: "javascript:".to_string(),
            ..valid()
        };
        assert!(state.check_allowed(&schemes()).is_err());

        let state = BrokerState {
            provider: "myspace".to_string(),
            ..valid()
        };
        assert!(state.check_allowed(&schemes()).is_err());

        let state = BrokerState {
            request: "contacts".to_string(),
            ..valid()
        };
        assert!(state.check_allowed(&schemes()).is_err());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(valid()).unwrap();
        assert_eq!(json["dest"], "oauth-action/login");
        assert!(json.get("requestMeta").is_none());
        assert!(json.get("response").is_none());

        let state = BrokerState::from_extra(
            r#"{"dest":"oauth-action/register","request":"userinfo","requestMeta":"{}","scheme":"sitegate://","provider":"facebook"}"#,
        )
        .unwrap();
        assert_eq!(state.request_meta, "{}");
        assert!(state.response.is_empty());

        assert!(BrokerState::from_extra("not json").is_err());
    }

    #[test]
    fn test_urls() {
        assert_eq!(valid().destination_url("abc"), "sitegate://oauth-action/login/abc");
        assert_eq!(
            error_url("https://www.example.com/", ResponseCode::Auth),
            "https://www.example.com/status/AUTH"
        );
    }

    #[test]
    fn test_meta_wire_names() {
        let meta: RegisterMeta = serde_json::from_str(
            r#"{"aud":"cookie","terms":true,"newsletter":true,"appId":"web","appPort":"3000"}"#,
        )
        .unwrap();
        assert_eq!(meta.audience, "cookie");
        assert!(meta.terms);
        assert_eq!(meta.app_id, "web");
        assert_eq!(meta.app_port, "3000");
        assert!(meta.app_name.is_empty());
    }

    #[test]
    fn test_login_audience() {
        assert_eq!(login_audience("app").unwrap(), Audience::App);
        assert_eq!(login_audience("cookie").unwrap(), Audience::Cookie);
        assert!(login_audience("oob").is_err());
        assert!(login_audience("").is_err());
    }
}
