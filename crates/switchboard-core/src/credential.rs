//! Connection credential issuing.
//!
//! Credentials are HS256 JWTs carrying `sub`, `iat`, and `exp`. Nothing is
//! stored server-side: the broker validates the signature and expiry when a
//! client presents the token on connect.

use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default credential lifetime (24 hours).
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Credential errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No user name was supplied.
    #[error("User is required")]
    EmptySubject,

    /// The issuer was configured without a signing secret.
    #[error("Token signing secret is not configured")]
    EmptySecret,

    /// The JWT encoder failed.
    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl CredentialError {
    /// Whether the error was caused by caller input rather than the server.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, CredentialError::EmptySubject)
    }
}

/// Claims embedded in a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the user name.
    pub sub: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// A signed credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// The encoded JWT.
    pub token: String,
    /// The claims it carries.
    pub claims: Claims,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Mints signed credentials from a process-wide secret.
#[derive(Clone)]
pub struct CredentialIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl fmt::Debug for CredentialIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CredentialIssuer {
    /// Create an issuer signing with `secret`.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty.
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, CredentialError> {
        if secret.is_empty() {
            return Err(CredentialError::EmptySecret);
        }
        Ok(Self {
            key: EncodingKey::from_secret(secret),
            ttl,
        })
    }

    /// Credential lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a credential for `user`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is empty or signing fails.
    pub fn issue(&self, user: &str) -> Result<Credential, CredentialError> {
        self.issue_at(user, Utc::now())
    }

    /// Issue a credential for `user`, valid from `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is empty or signing fails.
    pub fn issue_at(&self, user: &str, now: DateTime<Utc>) -> Result<Credential, CredentialError> {
        if user.is_empty() {
            return Err(CredentialError::EmptySubject);
        }

        let iat = now.timestamp();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user.to_string(),
            iat,
            exp: iat.saturating_add(ttl_secs),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key)?;
        Ok(Credential { token, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    const SECRET: &[u8] = b"test-secret";

    fn decode_claims(
        token: &str,
        secret: &[u8],
        validate_exp: bool,
    ) -> jsonwebtoken::errors::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = validate_exp;
        validation.required_spec_claims.clear();
        decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation).map(|d| d.claims)
    }

    #[test]
    fn test_issue_signed_credential() {
        let issuer = CredentialIssuer::new(SECRET, DEFAULT_CREDENTIAL_TTL).unwrap();
        let credential = issuer.issue("alice").unwrap();

        let claims = decode_claims(&credential.token, SECRET, true).unwrap();
        assert_eq!(claims, credential.claims);
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn test_issue_at_fixed_time() {
        let issuer = CredentialIssuer::new(SECRET, DEFAULT_CREDENTIAL_TTL).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let credential = issuer.issue_at("bob", now).unwrap();

        assert_eq!(credential.claims.iat, 1_704_067_200);
        assert_eq!(credential.claims.exp, 1_704_067_200 + 86_400);

        // Long expired by now; only the signature is checked here.
        let claims = decode_claims(&credential.token, SECRET, false).unwrap();
        assert_eq!(claims.sub, "bob");
    }

    #[test]
    fn test_wrong_secret_fails_verification() {
        let issuer = CredentialIssuer::new(SECRET, DEFAULT_CREDENTIAL_TTL).unwrap();
        let credential = issuer.issue("alice").unwrap();
        assert!(decode_claims(&credential.token, b"other-secret", true).is_err());
    }

    #[test]
    fn test_empty_user_rejected() {
        let issuer = CredentialIssuer::new(SECRET, DEFAULT_CREDENTIAL_TTL).unwrap();
        let err = issuer.issue("").unwrap_err();
        assert!(matches!(err, CredentialError::EmptySubject));
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let err = CredentialIssuer::new(b"", DEFAULT_CREDENTIAL_TTL).unwrap_err();
        assert!(matches!(err, CredentialError::EmptySecret));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_debug_redacts_token() {
        let issuer = CredentialIssuer::new(SECRET, DEFAULT_CREDENTIAL_TTL).unwrap();
        let credential = issuer.issue("alice").unwrap();
        let debug = format!("{:?}", credential);
        assert!(!debug.contains(&credential.token));
    }
}
