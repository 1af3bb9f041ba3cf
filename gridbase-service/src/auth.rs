//! Token issuance and validation.
//!
//! Tokens are HS512 JWTs carrying the user and an ISO-8601 `expires`
//! claim. Expiry is checked against an injected [`JwtClock`] rather than by
//! `jsonwebtoken`, which keeps tests deterministic.

use chrono::{DateTime, TimeZone, Utc};
use gridbase_core::AuthError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// CLOCKS
// ============================================================================

/// Clock abstraction for token time checks.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// CLAIMS
// ============================================================================

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// RFC 3339 expiry timestamp.
    pub expires: String,
}

/// Authenticated caller extracted from a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Principal {
    pub user_uuid: Option<Uuid>,
    pub user: Option<String>,
}

/// Issues and validates request tokens.
pub trait TokenService: Send + Sync {
    /// Issue a token for an authenticated user.
    fn issue(&self, user_uuid: Uuid, user: &str) -> Result<String, AuthError>;

    fn validate(&self, token: Option<&str>) -> Result<Principal, AuthError>;
}

// ============================================================================
// JWT VALIDATOR
// ============================================================================

/// HS512 token validator and issuer.
#[derive(Clone)]
pub struct JwtValidator {
    secret: SecretString,
    lifetime: Duration,
    clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("secret", &"[REDACTED]")
            .field("lifetime", &self.lifetime)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl JwtValidator {
    pub fn new(secret: SecretString, lifetime: Duration) -> Self {
        Self {
            secret,
            lifetime,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn JwtClock>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> Result<DateTime<Utc>, AuthError> {
        let now = self.clock.now_epoch_secs();
        Utc.timestamp_opt(now, 0).single().ok_or_else(|| {
            tracing::error!(timestamp = now, "Clock returned an unrepresentable time");
            AuthError::Invalid {
                reason: "server time is not available".to_string(),
            }
        })
    }
}

impl TokenService for JwtValidator {
    fn issue(&self, user_uuid: Uuid, user: &str) -> Result<String, AuthError> {
        let lifetime = chrono::Duration::from_std(self.lifetime).map_err(|e| AuthError::Invalid {
            reason: format!("token lifetime out of range: {}", e),
        })?;
        let claims = Claims {
            user_uuid: Some(user_uuid),
            user: Some(user.to_string()),
            expires: (self.now()? + lifetime).to_rfc3339(),
        };
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        encode(&Header::new(Algorithm::HS512), &claims, &key).map_err(|e| AuthError::Invalid {
            reason: format!("failed to sign token: {}", e),
        })
    }

    fn validate(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::MissingToken),
        };

        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::new();

        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|e| AuthError::Invalid {
                reason: e.to_string(),
            })?
            .claims;

        let expires = DateTime::parse_from_rfc3339(&claims.expires).map_err(|e| AuthError::Invalid {
            reason: format!("bad expires claim: {}", e),
        })?;
        if expires.with_timezone(&Utc) < self.now()? {
            return Err(AuthError::Expired);
        }

        Ok(Principal {
            user_uuid: claims.user_uuid,
            user: claims.user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-01-01 00:00:00 UTC
    const NOW: i64 = 1704067200;

    fn validator(now: i64) -> JwtValidator {
        JwtValidator::new(SecretString::new("test-secret".into()), Duration::from_secs(3600))
            .with_clock(Arc::new(FixedClock(now)))
    }

    #[test]
    fn test_issue_then_validate() -> Result<(), AuthError> {
        let user = Uuid::from_u128(1);
        let token = validator(NOW).issue(user, "root")?;
        let principal = validator(NOW + 60).validate(Some(&token))?;
        assert_eq!(principal.user_uuid, Some(user));
        assert_eq!(principal.user.as_deref(), Some("root"));
        Ok(())
    }

    #[test]
    fn test_expired_token() -> Result<(), AuthError> {
        let token = validator(NOW).issue(Uuid::nil(), "root")?;
        assert_eq!(validator(NOW + 7200).validate(Some(&token)), Err(AuthError::Expired));
        Ok(())
    }

    #[test]
    fn test_missing_and_invalid_tokens() -> Result<(), AuthError> {
        assert_eq!(validator(NOW).validate(None), Err(AuthError::MissingToken));
        assert_eq!(validator(NOW).validate(Some("")), Err(AuthError::MissingToken));
        assert!(matches!(
            validator(NOW).validate(Some("not.a.jwt")),
            Err(AuthError::Invalid { .. })
        ));

        let token = validator(NOW).issue(Uuid::nil(), "root")?;
        let other = JwtValidator::new(SecretString::new("other".into()), Duration::from_secs(60))
            .with_clock(Arc::new(FixedClock(NOW)));
        assert!(matches!(other.validate(Some(&token)), Err(AuthError::Invalid { .. })));
        Ok(())
    }

    #[test]
    fn test_debug_redacts_secret() {
        assert!(!format!("{:?}", validator(NOW)).contains("test-secret"));
    }
}
