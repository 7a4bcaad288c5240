//! Credential codec: signs claim sets into compact JWTs and verifies them.
//!
//! ## Supported Algorithms
//!
//! - **HS256**: shared secret (the default deployment)
//! - **RS256** / **RS384**: RSA
//! - **ES384**: ECDSA with P-384
//!
//! ## Verification outcomes
//!
//! [`JwtService::verify`] has three outcomes:
//!
//! - `Err(_)`: bad signature or structurally broken token. No claims.
//! - `Ok(None)`: signature fine, but some other claim fault (wrong issuer,
//!   unusable self id). Callers treat this exactly like "no credential".
//! - `Ok(Some(v))`: usable claims, with `v.expired` set when `exp` is past.
//!   Expired claims are still returned so the caller can try a refresh.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::{
    DecodePrivateKey as EcDecodePrivateKey, EncodePrivateKey as EcEncodePrivateKey,
};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};

use super::claims::{Audience, Claims};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// A required claim is missing.
    #[error("Missing required claim: {claim}")]
    MissingClaim {
        /// Name of the missing claim.
        claim: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `MissingClaim` error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim {
            claim: claim.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` for faults that only make the claims untrusted, as
    /// opposed to a forged or mangled token.
    #[must_use]
    pub fn is_soft_claim_fault(&self) -> bool {
        matches!(self, Self::InvalidClaims { .. } | Self::MissingClaim { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::decoding_error(err.to_string()),
            ErrorKind::ExpiredSignature
            | ErrorKind::ImmatureSignature
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 over a shared secret.
    HS256,
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Parses a configured algorithm name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "HS256" => Some(Self::HS256),
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            "ES384" => Some(Self::ES384),
            _ => None,
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Returns `true` for the shared-secret algorithm.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// Keys used to sign and verify credentials.
pub struct SigningKeyPair {
    /// Key ID, stamped into every header.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,

    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Builds an HS256 key from a shared secret.
    ///
    /// # Errors
    /// Returns an error if the secret is empty.
    pub fn from_secret(kid: impl Into<String>, secret: &[u8]) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::invalid_key("HS256 secret cannot be empty"));
        }

        Ok(Self {
            kid: kid.into(),
            algorithm: SigningAlgorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Generates a new RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                algorithm
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    /// Generates a new EC key pair on the P-384 curve.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let (encoding_key, decoding_key) = ec_key_pair(&secret_key)?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
        })
    }

    /// Loads an asymmetric key pair from PEM strings.
    ///
    /// # Arguments
    /// * `kid` - Key ID
    /// * `algorithm` - Signing algorithm (RS256, RS384 or ES384)
    /// * `private_pem` - PEM-encoded private key (PKCS8; SEC1 is also accepted for EC)
    /// * `public_pem` - PEM-encoded public key (ignored for EC, derived from the private key)
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let (encoding_key, decoding_key) = match algorithm {
            SigningAlgorithm::RS256 | SigningAlgorithm::RS384 => {
                let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                (encoding_key, decoding_key)
            }
            SigningAlgorithm::ES384 => {
                let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                    .or_else(|_| EcSecretKey::from_sec1_pem(private_pem))
                    .map_err(|e| JwtError::invalid_key(format!("ES384 private key: {e}")))?;
                ec_key_pair(&secret_key)?
            }
            SigningAlgorithm::HS256 => {
                return Err(JwtError::invalid_key(
                    "HS256 uses a shared secret, not PEM keys",
                ));
            }
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
        })
    }
}

/// The signer takes the private key as PKCS8 DER.
fn ec_key_pair(secret_key: &EcSecretKey) -> Result<(EncodingKey, DecodingKey), JwtError> {
    let der = secret_key
        .to_pkcs8_der()
        .map_err(|e| JwtError::invalid_key(e.to_string()))?;
    let encoding_key = EncodingKey::from_ec_der(der.as_bytes());
    Ok((encoding_key, ec_decoding_key(secret_key)?))
}

/// jsonwebtoken wants EC public keys as raw x/y components.
fn ec_decoding_key(secret_key: &EcSecretKey) -> Result<DecodingKey, JwtError> {
    let signing_key = EcSigningKey::from(secret_key);
    let point = signing_key.verifying_key().to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
    let y = point
        .y()
        .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

    let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
    let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
    DecodingKey::from_ec_components(&x_b64, &y_b64).map_err(|e| JwtError::invalid_key(e.to_string()))
}

// ============================================================================
// JWT Service
// ============================================================================

/// Claims that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub claims: Claims,
    /// Only `exp` is in the past; everything else checked out.
    pub expired: bool,
}

/// Signs and verifies credentials.
///
/// This service is thread-safe (`Send + Sync`) and can be shared across
/// async tasks.
pub struct JwtService {
    signing_key: SigningKeyPair,
    issuer: String,
}

impl JwtService {
    /// Creates a new JWT service.
    ///
    /// # Arguments
    /// * `signing_key` - The key pair to use for signing/verification
    /// * `issuer` - The issuer claim value stamped into and required on every token
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
        }
    }

    /// Signs a claim set. The issuer is always overwritten with this
    /// service's issuer.
    ///
    /// # Errors
    /// `MissingClaim("sid")` for a COOKIE credential without a session id;
    /// `EncodingError` if signing fails.
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        if claims.audience == Audience::Cookie && claims.session_id.is_empty() {
            return Err(JwtError::missing_claim("sid"));
        }

        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        let result = if claims.issuer == self.issuer {
            encode(&header, claims, &self.signing_key.encoding_key)
        } else {
            let stamped = Claims {
                issuer: self.issuer.clone(),
                ..claims.clone()
            };
            encode(&header, &stamped, &self.signing_key.encoding_key)
        };

        result.map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Verifies a credential string against `now` (unix seconds).
    ///
    /// # Errors
    /// Returns an error for bad signatures and structurally invalid tokens.
    /// Softer claim faults come back as `Ok(None)`.
    pub fn verify(&self, token: &str, now: i64) -> Result<Option<VerifiedToken>, JwtError> {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = false; // expiry is judged against the injected clock below
        validation.validate_aud = false; // `aud` is our own transport enum, not an RFC audience

        let claims = match decode::<Claims>(token, &self.signing_key.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                let err = JwtError::from(e);
                if err.is_soft_claim_fault() {
                    tracing::debug!(error = %err, "Credential claims rejected");
                    return Ok(None);
                }
                return Err(err);
            }
        };

        if claims.self_id_number().is_none() {
            tracing::debug!("Credential carries no usable self id");
            return Ok(None);
        }

        let expired = claims.is_expired_at(now);
        Ok(Some(VerifiedToken { claims, expired }))
    }

    /// Returns the issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::claims::{NEVER_EXPIRES, PrincipalKind};
    use crate::token::scopes::Scopes;

    const ISSUER: &str = "https://accounts.example.com";
    const NOW: i64 = 1_700_000_000;

    fn hs_service() -> JwtService {
        let key = SigningKeyPair::from_secret("test", b"0123456789abcdef0123456789abcdef").unwrap();
        JwtService::new(key, ISSUER)
    }

    fn claims(audience: Audience) -> Claims {
        Claims {
            self_id: "5".to_string(),
            issuer: ISSUER.to_string(),
            audience,
            subject_id: 42,
            principal_kind: PrincipalKind::Account,
            expires_at: NOW + 3600,
            issued_at: NOW,
            scopes: Scopes::ACCOUNT_FULL_MASTER,
            session_id: if audience == Audience::Cookie {
                "s1".to_string()
            } else {
                String::new()
            },
            final_expires_at: NOW + 604_800,
            subject: String::new(),
            extra: String::new(),
        }
    }

    #[test]
    fn test_sign_verify_preserves_claims() {
        let service = hs_service();
        for audience in [Audience::App, Audience::Cookie, Audience::OutOfBand] {
            let mut original = claims(audience);
            original.extra = r#"{"dest":"oauth-action/login"}"#.to_string();
            let token = service.sign(&original).unwrap();

            let verified = service.verify(&token, NOW).unwrap().unwrap();
            assert_eq!(verified.claims, original);
            assert!(!verified.expired);
        }
    }

    #[test]
    fn test_never_expiring_final_expiry_survives() {
        let service = hs_service();
        let mut original = claims(Audience::App);
        original.final_expires_at = NEVER_EXPIRES;

        let token = service.sign(&original).unwrap();
        let verified = service.verify(&token, NOW).unwrap().unwrap();
        assert!(verified.claims.never_expires());
    }

    #[test]
    fn test_cookie_without_session_id_cannot_be_signed() {
        let service = hs_service();
        let mut original = claims(Audience::Cookie);
        original.session_id.clear();

        let err = service.sign(&original).unwrap_err();
        assert!(matches!(err, JwtError::MissingClaim { ref claim } if claim == "sid"));
    }

    #[test]
    fn test_expired_token_returns_claims() {
        let service = hs_service();
        let original = claims(Audience::App);
        let token = service.sign(&original).unwrap();

        let verified = service
            .verify(&token, original.expires_at + 1)
            .unwrap()
            .unwrap();
        assert!(verified.expired);
        assert_eq!(verified.claims.subject_id, 42);
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let signer = hs_service();
        let other_key =
            SigningKeyPair::from_secret("other", b"ffffffffffffffffffffffffffffffff").unwrap();
        let verifier = JwtService::new(other_key, ISSUER);

        let token = signer.sign(&claims(Audience::App)).unwrap();
        let err = verifier.verify(&token, NOW).unwrap_err();
        assert!(matches!(err, JwtError::InvalidSignature));
    }

    #[test]
    fn test_garbage_is_a_hard_failure() {
        let service = hs_service();
        assert!(service.verify("not-a-jwt", NOW).is_err());
        assert!(service.verify("", NOW).is_err());
    }

    #[test]
    fn test_foreign_issuer_is_no_credential() {
        let key = SigningKeyPair::from_secret("test", b"0123456789abcdef0123456789abcdef").unwrap();
        let foreign = JwtService::new(key, "https://elsewhere.example.com");
        let token = foreign.sign(&claims(Audience::App)).unwrap();

        assert_eq!(hs_service().verify(&token, NOW).unwrap(), None);
    }

    #[test]
    fn test_unresolvable_self_id_is_no_credential() {
        let service = hs_service();
        for bad in ["", "0", "-1", "abc"] {
            let mut original = claims(Audience::App);
            original.self_id = bad.to_string();
            let token = service.sign(&original).unwrap();
            assert_eq!(service.verify(&token, NOW).unwrap(), None, "self id {bad:?}");
        }
    }

    #[test]
    fn test_rs256_sign_verify() {
        let key = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let service = JwtService::new(key, ISSUER);
        let token = service.sign(&claims(Audience::App)).unwrap();
        assert!(service.verify(&token, NOW).unwrap().is_some());
    }

    #[test]
    fn test_es384_sign_verify() {
        let key = SigningKeyPair::generate_ec().unwrap();
        let service = JwtService::new(key, ISSUER);
        let token = service.sign(&claims(Audience::OutOfBand)).unwrap();
        let verified = service.verify(&token, NOW).unwrap().unwrap();
        assert_eq!(verified.claims.audience, Audience::OutOfBand);
    }

    #[test]
    fn test_generate_rsa_rejects_ec_algorithm() {
        assert!(SigningKeyPair::generate_rsa(SigningAlgorithm::ES384).is_err());
    }

    #[test]
    fn test_key_debug_shows_only_identity() {
        let key = SigningKeyPair::from_secret("k1", b"0123456789abcdef0123456789abcdef").unwrap();
        let shown = format!("{key:?}");
        assert!(shown.contains("k1"));
        assert!(shown.contains("HS256"));
        assert!(!shown.contains("0123456789abcdef"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(SigningKeyPair::from_secret("k", b"").is_err());
    }

    #[test]
    fn test_signing_algorithm_parse() {
        assert_eq!(SigningAlgorithm::parse("HS256"), Some(SigningAlgorithm::HS256));
        assert_eq!(SigningAlgorithm::parse("RS384"), Some(SigningAlgorithm::RS384));
        assert_eq!(SigningAlgorithm::parse("none"), None);
        assert!(SigningAlgorithm::HS256.is_symmetric());
        assert!(SigningAlgorithm::RS256.is_rsa());
    }

    #[test]
    fn test_jwt_error_predicates() {
        assert!(JwtError::invalid_claims("iss").is_soft_claim_fault());
        assert!(!JwtError::InvalidSignature.is_soft_claim_fault());
        assert!(JwtError::missing_claim("sid").is_soft_claim_fault());
        assert!(!JwtError::invalid_key("err").is_soft_claim_fault());
    }
}
