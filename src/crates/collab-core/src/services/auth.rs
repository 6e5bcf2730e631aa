//! Handshake authentication.
//!
//! Verifies the bearer token presented at socket handshake — either in the
//! handshake auth payload or the `Authorization` header — as a JWT signed
//! with a shared HMAC-SHA256 secret, and resolves the authenticated user.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{CollabError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the authenticated user id.
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    pub exp: usize,
}

/// The identity attached to a socket after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub user_name: String,
    pub user_picture: Option<String>,
}

pub struct JwtVerifier {
    secret: String,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Verify `token`'s signature and expiry, returning the identity it
    /// authenticates. Any failure (bad signature, expired, malformed)
    /// collapses to `CollabError::AuthInvalid`.
    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(jsonwebtoken::Algorithm::HS256),
        )
        .map_err(|e| CollabError::AuthInvalid(e.to_string()))?;

        let claims = data.claims;
        Ok(AuthenticatedUser {
            user_name: claims.name.clone().unwrap_or_else(|| claims.sub.clone()),
            user_picture: claims.picture.clone(),
            user_id: claims.sub,
        })
    }
}

/// Extract the bearer token from a handshake: either an explicit auth
/// payload field or a standard `Authorization: Bearer <token>` header
/// value.
pub fn extract_bearer_token(auth_payload_token: Option<&str>, authorization_header: Option<&str>) -> Result<String> {
    if let Some(token) = auth_payload_token {
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }
    if let Some(header) = authorization_header {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Ok(token.to_string());
        }
    }
    Err(CollabError::AuthMissing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(secret: &str, sub: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            name: Some("Test User".to_string()),
            picture: None,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_verify_accepts_correctly_signed_token() {
        let verifier = JwtVerifier::new("test-secret");
        let token = sign("test-secret", "u1");
        let user = verifier.verify(&token).unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.user_name, "Test User");
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let verifier = JwtVerifier::new("test-secret");
        let token = sign("other-secret", "u1");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let verifier = JwtVerifier::new("test-secret");
        let claims = Claims {
            sub: "u1".to_string(),
            name: None,
            picture: None,
            exp: (chrono::Utc::now().timestamp() - 10) as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_extract_bearer_token_prefers_auth_payload() {
        let token = extract_bearer_token(Some("payload-token"), Some("Bearer header-token")).unwrap();
        assert_eq!(token, "payload-token");
    }

    #[test]
    fn test_extract_bearer_token_falls_back_to_header() {
        let token = extract_bearer_token(None, Some("Bearer header-token")).unwrap();
        assert_eq!(token, "header-token");
    }

    #[test]
    fn test_extract_bearer_token_missing_is_auth_missing() {
        let err = extract_bearer_token(None, None).unwrap_err();
        assert!(matches!(err, CollabError::AuthMissing));
    }
}
