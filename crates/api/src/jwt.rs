//! HS256 bearer-token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use platform_auth::{CredentialClaims, CredentialError, CredentialVerifier, validate_claims};

/// Verifies HS256-signed tokens carrying [`CredentialClaims`].
///
/// Registered-claim checks of `jsonwebtoken` are disabled; the time window is
/// checked by [`validate_claims`] against the caller's clock.
pub struct Hs256CredentialVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256CredentialVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl CredentialVerifier for Hs256CredentialVerifier {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialClaims, CredentialError> {
        let data = decode::<CredentialClaims>(token, &self.key, &self.validation)
            .map_err(|e| CredentialError::Rejected(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
