//! The claim set carried inside a credential.
//!
//! Claims double as the payload of the persisted session record: the record
//! is the authoritative copy, the signed string is a cache of it.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::scopes::Scopes;

/// `final_expires_at` value meaning "never".
pub const NEVER_EXPIRES: i64 = -1;

/// Fixed system identity used by the OAuth broker for its state credentials.
pub const SYSTEM_ID_OAUTH: i64 = 1;

/// Transport and trust context of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Audience {
    /// Native/API clients holding the credential themselves.
    #[serde(rename = "app")]
    App,
    /// Browsers holding the credential in a cookie; CSRF-bound.
    #[serde(rename = "cookie")]
    Cookie,
    /// Single-purpose links and broker state; always checked against storage.
    #[serde(rename = "oob")]
    OutOfBand,
}

impl Audience {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Cookie => "cookie",
            Self::OutOfBand => "oob",
        }
    }

    /// Parses the wire name; used for audiences supplied in request metadata.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "app" => Some(Self::App),
            "cookie" => Some(Self::Cookie),
            "oob" => Some(Self::OutOfBand),
            _ => None,
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `subject_id` is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrincipalKind {
    /// An account record.
    #[serde(rename = "usr")]
    Account,
    /// A fixed numeric system identity.
    #[serde(rename = "sys")]
    Service,
}

/// Signed credential payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Id of the backing session record, as a decimal string.
    #[serde(rename = "jti", default)]
    pub self_id: String,

    #[serde(rename = "iss", default)]
    pub issuer: String,

    #[serde(rename = "aud")]
    pub audience: Audience,

    #[serde(rename = "uid")]
    pub subject_id: i64,

    #[serde(rename = "ut")]
    pub principal_kind: PrincipalKind,

    #[serde(rename = "exp")]
    pub expires_at: i64,

    #[serde(rename = "iat")]
    pub issued_at: i64,

    pub scopes: Scopes,

    /// CSRF session id; only COOKIE credentials carry one.
    #[serde(rename = "sid", default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,

    /// Absolute refresh ceiling, or [`NEVER_EXPIRES`].
    #[serde(rename = "fexp")]
    pub final_expires_at: i64,

    #[serde(rename = "sub", default, skip_serializing_if = "String::is_empty")]
    pub subject: String,

    /// Opaque protocol payload (broker state, pending email, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extra: String,
}

impl Claims {
    /// Parses `self_id`. Anything that is not a positive integer is `None`.
    #[must_use]
    pub fn self_id_number(&self) -> Option<i64> {
        self.self_id.parse::<i64>().ok().filter(|id| *id > 0)
    }

    /// `exp` is strictly in the past.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn never_expires(&self) -> bool {
        self.final_expires_at == NEVER_EXPIRES
    }

    /// Final expiry is set and still in the future. A zero `fexp` is a
    /// record that was never initialised and is never live.
    #[must_use]
    pub fn is_live_at(&self, now: i64) -> bool {
        match self.final_expires_at {
            0 => false,
            NEVER_EXPIRES => true,
            fexp => fexp > now,
        }
    }

    /// Copy with `extra` stripped, for the compact credential handed back
    /// through a redirect URL.
    #[must_use]
    pub fn without_extra(&self) -> Self {
        Self {
            extra: String::new(),
            ..self.clone()
        }
    }
}
