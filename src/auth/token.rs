//! Join token verification

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::util::time::unix_millis;

type HmacSha256 = Hmac<Sha256>;

/// Resolved player identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    /// Name asserted by the token, if any
    pub display_name: Option<String>,
}

/// Auth collaborator contract: one token in, one identity out
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: Option<&str>) -> Result<Identity, AuthError>;
}

/// Claims carried by a join token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinClaims {
    /// Subject (player ID)
    pub sub: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
    /// Account username
    #[serde(default)]
    pub name: Option<String>,
}

/// HS256 token resolver
pub struct JwtResolver {
    secret: String,
}

impl JwtResolver {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify a token and extract claims
    pub fn verify(&self, token: &str) -> Result<JoinClaims, AuthError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken);
        };

        let message = format!("{}.{}", header_b64, payload_b64);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AuthError::InvalidToken)?;
        mac.update(message.as_bytes());

        let provided_signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        mac.verify_slice(&provided_signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims: JoinClaims =
            serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

        if claims.exp < unix_millis() / 1000 {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}

impl IdentityResolver for JwtResolver {
    fn resolve(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        let claims = self.verify(token)?;
        Ok(Identity {
            id: claims.sub,
            display_name: claims.name,
        })
    }
}

/// Development resolver: every join gets a fresh identity, name chosen by the client
#[derive(Debug, Default)]
pub struct GuestResolver;

impl IdentityResolver for GuestResolver {
    fn resolve(&self, _token: Option<&str>) -> Result<Identity, AuthError> {
        Ok(Identity {
            id: Uuid::new_v4(),
            display_name: None,
        })
    }
}

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}
