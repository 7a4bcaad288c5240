//! Credentials: claim model, codec, and lifecycle.
//!
//! - [`claims`] - the signed payload and its wire names
//! - [`scopes`] - capability and role bit sets
//! - [`jwt`] - signing and verification
//! - [`lifecycle`] - issue, validate, refresh, revoke

pub mod claims;
pub mod jwt;
pub mod lifecycle;
pub mod scopes;

pub use claims::{Audience, Claims, NEVER_EXPIRES, PrincipalKind, SYSTEM_ID_OAUTH};
pub use jwt::{JwtError, JwtService, SigningAlgorithm, SigningKeyPair, VerifiedToken};
pub use lifecycle::{Issued, Principal, TokenLifecycle, Validation};
pub use scopes::{Roles, Scopes};

use rand::RngCore;

use crate::config::SigningConfig;
use crate::{AuthError, AuthResult};

/// Builds the signing key described by the configuration.
///
/// Without configured key material an ephemeral key is generated; such
/// credentials do not survive a restart.
///
/// # Errors
///
/// Returns a configuration error for unknown algorithms and unreadable or
/// invalid key files.
pub fn signing_key_from_config(config: &SigningConfig) -> AuthResult<SigningKeyPair> {
    let algorithm = SigningAlgorithm::parse(&config.algorithm).ok_or_else(|| {
        AuthError::configuration(format!("unknown signing algorithm {}", config.algorithm))
    })?;

    if algorithm.is_symmetric() {
        if config.secret.is_empty() {
            tracing::warn!("No signing secret configured; generating an ephemeral one");
            let mut secret = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut secret);
            return Ok(SigningKeyPair::from_secret("ephemeral", &secret)?);
        }
        return Ok(SigningKeyPair::from_secret("primary", config.secret.as_bytes())?);
    }

    let Some(private_path) = &config.private_key_path else {
        tracing::warn!(%algorithm, "No signing key configured; generating an ephemeral key pair");
        return Ok(if algorithm.is_rsa() {
            SigningKeyPair::generate_rsa(algorithm)?
        } else {
            SigningKeyPair::generate_ec()?
        });
    };

    let read = |path: &std::path::Path| {
        std::fs::read_to_string(path).map_err(|e| {
            AuthError::configuration(format!("cannot read key {}: {e}", path.display()))
        })
    };
    let private_pem = read(private_path)?;
    let public_pem = match &config.public_key_path {
        Some(path) => read(path)?,
        None => String::new(),
    };

    SigningKeyPair::from_pem("primary", algorithm, &private_pem, &public_pem)
        .map_err(|e| AuthError::configuration(e.to_string()))
}
