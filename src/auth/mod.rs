use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::SecurityConfig;

/// Dashboard roles, most privileged first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Manager,
    Fieldworker,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Manager => "manager",
            Role::Fieldworker => "fieldworker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown role: {0}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "superadmin" => Ok(Role::Superadmin),
            "manager" => Ok(Role::Manager),
            "fieldworker" => Ok(Role::Fieldworker),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = ParseRoleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Who a request is acting as, decoded from a session token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: i64,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    fn new(identity: &Identity, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: identity.subject_id.to_string(),
            role: identity.role.as_str().to_string(),
            exp: (issued_at + ttl).timestamp(),
            iat: issued_at.timestamp(),
        }
    }

    fn into_identity(self) -> Result<Identity, SessionError> {
        let subject_id = self.sub.parse().map_err(|_| SessionError::InvalidClaims)?;
        let role = self.role.parse().map_err(|_| SessionError::InvalidClaims)?;
        Ok(Identity { subject_id, role })
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Token generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT secret")]
    InvalidSecret,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token is missing required claims")]
    InvalidClaims,
}

/// A signed session token with its absolute expiry
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and validates HS256 session tokens.
///
/// The key is fixed for the lifetime of the issuer; a new key invalidates every
/// token signed with the old one.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::InvalidSecret);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self, SessionError> {
        Self::new(&config.jwt_secret, Duration::hours(config.jwt_expiry_hours as i64))
    }

    pub fn issue(&self, identity: &Identity) -> Result<SessionToken, SessionError> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<SessionToken, SessionError> {
        let claims = Claims::new(identity, now, self.ttl);
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| SessionError::TokenGeneration("expiry out of range".to_string()))?;

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::TokenGeneration(e.to_string()))?;

        Ok(SessionToken { token, expires_at })
    }

    /// Decode a token into exactly one identity, or fail
    pub fn validate(&self, token: &str) -> Result<Identity, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!("Rejected session token: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
                | jsonwebtoken::errors::ErrorKind::Json(_) => SessionError::InvalidClaims,
                _ => SessionError::InvalidToken,
            }
        })?;

        token_data.claims.into_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(secret: &str) -> SessionIssuer {
        SessionIssuer::new(secret, Duration::hours(24)).unwrap()
    }

    #[test]
    fn issue_and_validate_round_trip() {
        let issuer = issuer("test_secret_key");
        let identity = Identity {
            subject_id: 1,
            role: Role::Fieldworker,
        };

        let session = issuer.issue(&identity).unwrap();
        let decoded = issuer.validate(&session.token).unwrap();
        assert_eq!(decoded, identity);
        assert_eq!(decoded.role, Role::Fieldworker);
    }

    #[test]
    fn token_expires_after_ttl() {
        let issuer = issuer("test_secret_key");
        let identity = Identity {
            subject_id: 7,
            role: Role::Manager,
        };

        let session = issuer.issue(&identity).unwrap();
        let expires_in = session.expires_at.timestamp() - Utc::now().timestamp();
        assert!(expires_in > 23 * 3600);
        assert!(expires_in <= 24 * 3600);

        let stale = issuer
            .issue_at(&identity, Utc::now() - Duration::hours(25))
            .unwrap();
        assert!(matches!(issuer.validate(&stale.token), Err(SessionError::InvalidToken)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let identity = Identity {
            subject_id: 1,
            role: Role::Superadmin,
        };
        let token = issuer("secret1").issue(&identity).unwrap().token;
        assert!(issuer("secret2").validate(&token).is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(issuer("test_secret_key").validate("invalid_token").is_err());
    }

    #[test]
    fn missing_role_claim_fails_closed() {
        #[derive(Serialize)]
        struct Partial {
            sub: String,
            exp: i64,
        }

        let partial = Partial {
            sub: "1".to_string(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &partial,
            &EncodingKey::from_secret(b"test_secret_key"),
        )
        .unwrap();

        assert!(matches!(
            issuer("test_secret_key").validate(&token),
            Err(SessionError::InvalidClaims)
        ));
    }

    #[test]
    fn unknown_role_fails_closed() {
        let claims = Claims {
            sub: "1".to_string(),
            role: "owner".to_string(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test_secret_key"),
        )
        .unwrap();

        assert!(issuer("test_secret_key").validate(&token).is_err());
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(
            SessionIssuer::new("", Duration::hours(1)),
            Err(SessionError::InvalidSecret)
        ));
    }
}
