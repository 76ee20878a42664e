//! Bearer session tokens
//!
//! Sessions are self-contained HS256 tokens so the connection hub can
//! validate them without a database round trip. Proximity never revokes a
//! session; the `locked` flag is advisory state on top of it.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Session lifetime in seconds (24 hours)
pub const SESSION_TTL_SECS: i64 = 86_400;

/// Claims carried inside a session token
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// User the session belongs to
    sub: String,

    /// Device the session was issued to
    device_id: String,

    /// Session id, fresh per issuance
    jti: String,

    /// Issued-at, seconds since epoch
    iat: i64,

    /// Expiry, seconds since epoch
    exp: i64,
}

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_in: i64,
}

/// Identity extracted from a validated session token
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub device_id: String,
    pub session_id: String,
}

/// Mints and validates session tokens
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionIssuer {
    /// Create an issuer from the configured signing secret
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }

    /// Issue a session for a device/user pair
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails
    pub fn issue(&self, device_id: &str, user_id: &str) -> Result<IssuedSession> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            device_id: device_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + SESSION_TTL_SECS,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Authentication(format!("failed to sign session: {e}")))?;

        tracing::debug!(device_id, user_id, "session issued");
        Ok(IssuedSession {
            token,
            expires_in: SESSION_TTL_SECS,
        })
    }

    /// Validate a bearer token.
    ///
    /// Expired, tampered, and malformed tokens all fail uniformly.
    ///
    /// # Errors
    ///
    /// Returns `Authentication` for any invalid token
    pub fn validate(&self, token: &str) -> Result<SessionContext> {
        let data =
            jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &Validation::default())
                .map_err(|_| Error::Authentication("invalid session token".to_string()))?;

        Ok(SessionContext {
            user_id: data.claims.sub,
            device_id: data.claims.device_id,
            session_id: data.claims.jti,
        })
    }
}
