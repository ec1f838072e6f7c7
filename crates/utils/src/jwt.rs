use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionTokenError {
    #[error("failed to sign session token: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("invalid session token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

/// Claims carried by the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(user_id: Uuid, role: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            role: role.into(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

pub fn encode_session(claims: &SessionClaims, secret: &[u8]) -> Result<String, SessionTokenError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret))
        .map_err(SessionTokenError::Encode)
}

pub fn decode_session(token: &str, secret: &[u8]) -> Result<SessionClaims, SessionTokenError> {
    let validation = Validation::default();
    decode::<SessionClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(SessionTokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_roundtrip_and_tamper() {
        let claims = SessionClaims::new(Uuid::new_v4(), "admin", Duration::hours(1));
        let token = encode_session(&claims, b"secret").unwrap();

        assert_eq!(decode_session(&token, b"secret").unwrap(), claims);
        assert!(decode_session(&token, b"other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = SessionClaims::new(Uuid::new_v4(), "user", Duration::hours(1));
        claims.exp = Utc::now().timestamp() - 3600;
        let token = encode_session(&claims, b"secret").unwrap();

        assert!(decode_session(&token, b"secret").is_err());
    }
}
