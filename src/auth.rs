//! Credential Service
//!
//! Argon2id password hashing and stateless JWT bearer tokens. Tokens carry
//! the username as subject and expire after the configured TTL; there is no
//! revocation list, so logout is an acknowledgment only.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::FromRequestParts, http::request::Parts, http::StatusCode, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::error::ApiError;
use crate::server::AppState;
use crate::store::User;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed token or bad signature
    #[error("invalid token")]
    Invalid,

    #[error("token expired")]
    Expired,

    /// Wrong credentials, unknown subject, or inactive account
    #[error("incorrect username or password")]
    Unauthorized,

    /// Authenticated but lacking the administrator flag
    #[error("insufficient privileges")]
    Forbidden,

    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Invalid | AuthError::Expired | AuthError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Hash a password using Argon2id with a fresh salt
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Internal(format!("invalid password hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// Process-wide signing keys and token lifetime
pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_minutes: i64,
}

impl Keys {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes,
        }
    }

    /// Issue a signed token for `subject`, expiring after the configured TTL
    pub fn issue_token(&self, subject: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to encode token: {e}")))
    }

    /// Verify signature and expiry, returning the claims
    pub fn resolve_token(&self, token: &str) -> Result<Claims, AuthError> {
        // no leeway: a token is invalid the moment its expiry passes
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;
        Ok(data.claims)
    }
}

/// Extractor for routes requiring an authenticated, active user
pub struct AuthUser(pub User);

/// Extractor for routes requiring an administrator
pub struct AdminUser(pub User);

async fn authorize_active_user(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<User, ApiError> {
    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| AuthError::Invalid)?;

    let claims = state.auth.resolve_token(bearer.token())?;

    let user = state
        .store
        .find_user_by_username(&claims.sub)?
        .filter(|u| u.is_active)
        .ok_or(AuthError::Unauthorized)?;

    Ok(user)
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(AuthUser(authorize_active_user(parts, state).await?))
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = authorize_active_user(parts, state).await?;
        if !user.is_admin {
            return Err(AuthError::Forbidden.into());
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("correct-horse").unwrap();

        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_roundtrip() {
        let keys = Keys::new("test-secret-at-least-32-characters", 30);
        let token = keys.issue_token("alice").unwrap();

        let claims = keys.resolve_token(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = Keys::new("test-secret-at-least-32-characters", -5);
        let token = keys.issue_token("alice").unwrap();

        let result = keys.resolve_token(&token);
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_token_rejected_right_after_expiry() {
        // zero TTL: expiry equals issue time, so the token must be dead one
        // second later without any grace window
        let keys = Keys::new("test-secret-at-least-32-characters", 0);
        let token = keys.issue_token("alice").unwrap();

        std::thread::sleep(std::time::Duration::from_secs(1));

        let result = keys.resolve_token(&token);
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let keys = Keys::new("test-secret-at-least-32-characters", 30);
        let other = Keys::new("another-secret-entirely-different!", 30);

        let token = keys.issue_token("alice").unwrap();
        let result = other.resolve_token(&token);
        assert!(matches!(result, Err(AuthError::Invalid)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let keys = Keys::new("test-secret-at-least-32-characters", 30);
        assert!(matches!(
            keys.resolve_token("not-a-jwt"),
            Err(AuthError::Invalid)
        ));
    }
}
