//! Authentication and authorization error types.
//!
//! [`AuthError`] is the crate-wide error. Every variant maps onto exactly one
//! client-facing [`ResponseCode`], which is all a caller ever sees: the
//! message fields are for server-side logs only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::jwt::JwtError;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The presented credential is missing, malformed, tampered with, or no
    /// longer backed by a live session record.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The credential is valid but does not satisfy the route policy.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Internal description of the failed check.
        message: String,
    },

    /// Denied on a route that only out-of-band credentials can open.
    #[error("Out-of-band credential required: {message}")]
    OutOfBandRequired {
        /// Internal description of the failed check.
        message: String,
    },

    /// A required field was absent or empty.
    #[error("Missing information: {message}")]
    MissingInfo {
        /// Which piece of information was missing.
        message: String,
    },

    /// The account exists but has not been activated.
    #[error("Account not activated")]
    NotActivated,

    /// A request value is not on the relevant allow-list.
    #[error("Not allowed: {field} = {value}")]
    NotAllowed {
        /// Name of the offending field.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// A user-actionable validation failure with a specific response code.
    #[error("Rejected ({code}): {message}")]
    Rejected {
        /// Code surfaced to the client.
        code: ResponseCode,
        /// Description of the failure.
        message: String,
    },

    /// Signing or key handling failed.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing error.
        message: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// The third-party OAuth provider failed or returned garbage.
    #[error("Identity provider error: {provider} - {message}")]
    IdentityProvider {
        /// The provider name.
        provider: String,
        /// Description of the error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `OutOfBandRequired` error.
    #[must_use]
    pub fn out_of_band_required(message: impl Into<String>) -> Self {
        Self::OutOfBandRequired {
            message: message.into(),
        }
    }

    /// Creates a new `MissingInfo` error.
    #[must_use]
    pub fn missing_info(message: impl Into<String>) -> Self {
        Self::MissingInfo {
            message: message.into(),
        }
    }

    /// Creates a new `NotAllowed` error.
    #[must_use]
    pub fn not_allowed(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::NotAllowed {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a new `Rejected` error carrying a specific response code.
    #[must_use]
    pub fn rejected(code: ResponseCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a new `IdentityProvider` error.
    #[must_use]
    pub fn identity_provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IdentityProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Signing { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
                | Self::IdentityProvider { .. }
        )
    }

    /// Returns `true` if this is an authorization denial.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::Unauthorized { .. } | Self::OutOfBandRequired { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::Unauthorized { .. } | Self::OutOfBandRequired { .. } => {
                ErrorCategory::Authorization
            }
            Self::MissingInfo { .. }
            | Self::NotActivated
            | Self::NotAllowed { .. }
            | Self::Rejected { .. } => ErrorCategory::Validation,
            Self::Signing { .. } => ErrorCategory::Token,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::IdentityProvider { .. } => ErrorCategory::Federation,
        }
    }

    /// Returns the code surfaced to clients for this error.
    #[must_use]
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::InvalidToken { .. } | Self::Unauthorized { .. } => ResponseCode::Auth,
            Self::OutOfBandRequired { .. } => ResponseCode::AuthOob,
            Self::MissingInfo { .. } => ResponseCode::MissingInfo,
            Self::NotActivated => ResponseCode::NotActivated,
            Self::NotAllowed { .. } => ResponseCode::NotAllowed,
            Self::Rejected { code, .. } => *code,
            Self::Signing { .. }
            | Self::Storage { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. }
            | Self::IdentityProvider { .. } => ResponseCode::Technical,
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::MissingClaim { claim } => Self::missing_info(claim),
            other => Self::signing(other.to_string()),
        }
    }
}

/// Categories of authentication/authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authorization-related errors (policy checks).
    Authorization,
    /// Token-related errors (validation, signing).
    Token,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
    /// Third-party OAuth provider errors.
    Federation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
            Self::Federation => write!(f, "federation"),
        }
    }
}

/// Status codes surfaced to clients in the `code` field of JSON responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    #[serde(rename = "AUTH")]
    Auth,
    #[serde(rename = "AUTH_OOB")]
    AuthOob,
    #[serde(rename = "TECHNICAL")]
    Technical,
    #[serde(rename = "MISSINGINFO")]
    MissingInfo,
    #[serde(rename = "NOT_ACTIVATED")]
    NotActivated,
    #[serde(rename = "EXPIRED")]
    Expired,
    #[serde(rename = "NOT_ALLOWED")]
    NotAllowed,
    #[serde(rename = "MISSING_USERNAME")]
    MissingUsername,
    #[serde(rename = "MISSING_PASSWORD")]
    MissingPassword,
    #[serde(rename = "WRONG_PASSWORD")]
    WrongPassword,
    #[serde(rename = "NOUSERNAME")]
    NoUsername,
    #[serde(rename = "INVALID_USERNAME")]
    InvalidUsername,
    #[serde(rename = "USER_EXISTS")]
    UserExists,
    #[serde(rename = "TERMS")]
    Terms,
    #[serde(rename = "LOGIN_COMPLETED")]
    LoginCompleted,
    #[serde(rename = "LOGOUT_SUCCESS")]
    LogoutSuccess,
    #[serde(rename = "ACTIVATION_COMPLETED")]
    ActivationCompleted,
    #[serde(rename = "ACTIVATION_EXISTS")]
    ActivationExists,
}

impl ResponseCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::AuthOob => "AUTH_OOB",
            Self::Technical => "TECHNICAL",
            Self::MissingInfo => "MISSINGINFO",
            Self::NotActivated => "NOT_ACTIVATED",
            Self::Expired => "EXPIRED",
            Self::NotAllowed => "NOT_ALLOWED",
            Self::MissingUsername => "MISSING_USERNAME",
            Self::MissingPassword => "MISSING_PASSWORD",
            Self::WrongPassword => "WRONG_PASSWORD",
            Self::NoUsername => "NOUSERNAME",
            Self::InvalidUsername => "INVALID_USERNAME",
            Self::UserExists => "USER_EXISTS",
            Self::Terms => "TERMS",
            Self::LoginCompleted => "LOGIN_COMPLETED",
            Self::LogoutSuccess => "LOGOUT_SUCCESS",
            Self::ActivationCompleted => "ACTIVATION_COMPLETED",
            Self::ActivationExists => "ACTIVATION_EXISTS",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
