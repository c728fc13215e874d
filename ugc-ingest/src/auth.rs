//! Bearer-token verification.
//!
//! The identity service signs RS256 JWTs; this service only verifies them
//! against the published public key. Required claims: `sub` (the user id),
//! `aud` (must include the configured service audience) and `exp`.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Verification failure; always answered with 401, details only logged.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The public key could not be loaded.
    #[error("failed to load public key: {0}")]
    Key(String),

    /// The token is missing, malformed, expired or signed for someone else.
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Claims this service consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// The authenticated user.
    pub sub: Uuid,
}

/// Verifies bearer tokens; CPU-only, no I/O.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and extract the claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Invalid`] for anything short of a valid,
    /// unexpired token carrying the right audience.
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// RS256 verifier over the identity service's public key.
pub struct RsaJwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl RsaJwtVerifier {
    /// Build a verifier from a PEM-encoded RSA public key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Key`] when the PEM does not parse.
    pub fn from_pem(pem: &[u8], audience: &str) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem).map_err(|e| AuthError::Key(e.to_string()))?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        Ok(Self { key, validation })
    }

    /// Build a verifier from a PEM file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Key`] when the file is unreadable or does not
    /// parse.
    pub fn from_pem_file(path: &Path, audience: &str) -> Result<Self, AuthError> {
        let pem = std::fs::read(path)
            .map_err(|e| AuthError::Key(format!("{}: {e}", path.display())))?;
        Self::from_pem(&pem, audience)
    }
}

impl TokenVerifier for RsaJwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::Invalid(e.to_string()))
    }
}
