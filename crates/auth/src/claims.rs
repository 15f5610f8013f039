use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use platform_core::PrincipalId;

use crate::AuthenticationError;

/// Bearer-token claims model (transport-agnostic).
///
/// This is the minimal set of claims the platform expects once a token has been
/// decoded/verified by whatever transport/security layer is in use. Tenant and
/// role are deliberately absent: they are read from the principal record so a
/// token can never carry stale or forged authorization data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Subject / principal identifier.
    #[serde(default)]
    pub sub: Option<String>,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

impl CredentialClaims {
    /// Extract the subject as a principal id.
    pub fn subject(&self) -> Result<PrincipalId, AuthenticationError> {
        let sub = self
            .sub
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthenticationError::InvalidCredential("missing subject".to_string()))?;

        sub.parse::<PrincipalId>()
            .map_err(|e| AuthenticationError::InvalidCredential(e.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Why a credential was rejected by a verifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("malformed or unverifiable token: {0}")]
    Rejected(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

impl From<CredentialError> for AuthenticationError {
    fn from(value: CredentialError) -> Self {
        AuthenticationError::InvalidCredential(value.to_string())
    }
}

/// Opaque bearer-credential verification capability.
///
/// Signature checking and decoding live behind this trait; the authorization
/// core only consumes the verified claims.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialClaims, CredentialError>;
}

/// Deterministically validate credential claims.
///
/// Note: this validates the *claims* only. Signature verification / decoding is
/// intentionally outside this crate.
pub fn validate_claims(claims: &CredentialClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn claims(sub: Option<String>, issued_at: DateTime<Utc>, ttl: Duration) -> CredentialClaims {
        CredentialClaims {
            sub,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    #[test]
    fn time_window_is_checked() {
        let now = Utc::now();
        let ok = claims(None, now - Duration::minutes(1), Duration::minutes(10));
        assert_eq!(validate_claims(&ok, now), Ok(()));

        let expired = claims(None, now - Duration::minutes(20), Duration::minutes(10));
        assert_eq!(validate_claims(&expired, now), Err(TokenValidationError::Expired));

        let future = claims(None, now + Duration::minutes(5), Duration::minutes(10));
        assert_eq!(validate_claims(&future, now), Err(TokenValidationError::NotYetValid));

        let inverted = claims(None, now, Duration::minutes(-1));
        assert_eq!(
            validate_claims(&inverted, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn subject_must_be_present_and_a_principal_id() {
        let now = Utc::now();
        let missing = claims(None, now, Duration::minutes(1));
        assert!(matches!(
            missing.subject(),
            Err(AuthenticationError::InvalidCredential(_))
        ));

        let blank = claims(Some("  ".into()), now, Duration::minutes(1));
        assert!(blank.subject().is_err());

        let garbage = claims(Some("42".into()), now, Duration::minutes(1));
        assert!(garbage.subject().is_err());

        let id = PrincipalId::new();
        let good = claims(Some(id.to_string()), now, Duration::minutes(1));
        assert_eq!(good.subject().unwrap(), id);
    }
}
