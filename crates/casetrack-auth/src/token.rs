//! JWT access/refresh token issuance and verification.
//!
//! Both tokens are HS256 JWTs signed with a shared secret; they differ only in
//! lifetime and the `kind` claim, which the verifier checks so a refresh token
//! can never authenticate a request and an access token can never be refreshed.

use casetrack_core::UserId;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::error::AuthError;

pub const ACCESS_TOKEN_LIFETIME_SECS: i64 = 900;
pub const REFRESH_TOKEN_LIFETIME_SECS: i64 = 86_400;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn lifetime_secs(self) -> i64 {
        match self {
            Self::Access => ACCESS_TOKEN_LIFETIME_SECS,
            Self::Refresh => REFRESH_TOKEN_LIFETIME_SECS,
        }
    }
}

/// Claims embedded in every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id, as a decimal string.
    pub sub: String,
    pub username: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id (ULID string).
    pub jti: String,
}

impl Claims {
    /// Parse the subject claim back into a [`UserId`].
    ///
    /// # Errors
    /// Returns [`AuthError::TokenInvalid`] when the subject is not a decimal id.
    pub fn user_id(&self) -> Result<UserId, AuthError> {
        self.sub
            .parse::<i64>()
            .map(UserId)
            .map_err(|err| AuthError::TokenInvalid(format!("bad subject claim: {err}")))
    }
}

/// An access/refresh pair as returned by the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issue one signed token of the given kind.
///
/// # Errors
/// Returns [`AuthError::Crypto`] when encoding fails.
pub fn issue_token(
    kind: TokenKind,
    user_id: UserId,
    username: &str,
    secret: &str,
) -> Result<String, AuthError> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        kind,
        iat: now,
        exp: now + kind.lifetime_secs(),
        jti: Ulid::new().to_string(),
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AuthError::Crypto(format!("JWT encode: {err}")))
}

/// Issue an access+refresh pair for a freshly authenticated user.
///
/// # Errors
/// Returns [`AuthError::Crypto`] when encoding fails.
pub fn issue_token_pair(
    user_id: UserId,
    username: &str,
    secret: &str,
) -> Result<TokenPair, AuthError> {
    Ok(TokenPair {
        access: issue_token(TokenKind::Access, user_id, username, secret)?,
        refresh: issue_token(TokenKind::Refresh, user_id, username, secret)?,
    })
}

/// Decode and verify a token, enforcing signature, expiry, and kind.
///
/// # Errors
/// Returns [`AuthError::TokenExpired`] for expired signatures and
/// [`AuthError::TokenInvalid`] for every other defect, including a kind
/// mismatch.
pub fn decode_token(
    token: &str,
    secret: &str,
    expected_kind: TokenKind,
) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    let claims = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid(err.to_string()),
    })?;

    if claims.kind != expected_kind {
        return Err(AuthError::TokenInvalid("unexpected token kind".to_string()));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn must_pair() -> TokenPair {
        issue_token_pair(UserId(7), "testuser", SECRET)
            .unwrap_or_else(|err| panic!("pair issuance failed: {err}"))
    }

    fn must_decode(token: &str, kind: TokenKind) -> Claims {
        decode_token(token, SECRET, kind)
            .unwrap_or_else(|err| panic!("decode failed: {err}"))
    }

    // Test IDs: TAUTH-005
    #[test]
    fn access_token_round_trip() {
        let pair = must_pair();
        let claims = must_decode(&pair.access, TokenKind::Access);
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "testuser");
        assert_eq!(
            claims.user_id().unwrap_or_else(|err| panic!("bad subject: {err}")),
            UserId(7)
        );
    }

    // Test IDs: TAUTH-006
    #[test]
    fn refresh_token_is_not_an_access_token() {
        let pair = must_pair();
        assert!(matches!(
            decode_token(&pair.refresh, SECRET, TokenKind::Access),
            Err(AuthError::TokenInvalid(_))
        ));
        assert!(matches!(
            decode_token(&pair.access, SECRET, TokenKind::Refresh),
            Err(AuthError::TokenInvalid(_))
        ));
    }

    // Test IDs: TAUTH-007
    #[test]
    fn wrong_secret_is_rejected() {
        let pair = must_pair();
        assert!(matches!(
            decode_token(&pair.access, "other-secret", TokenKind::Access),
            Err(AuthError::TokenInvalid(_))
        ));
    }

    // Test IDs: TAUTH-008
    #[test]
    fn expired_token_is_rejected() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: "7".to_string(),
            username: "testuser".to_string(),
            kind: TokenKind::Access,
            iat: now - 1000,
            exp: now - 100,
            jti: Ulid::new().to_string(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap_or_else(|err| panic!("encode failed: {err}"));

        assert!(matches!(
            decode_token(&token, SECRET, TokenKind::Access),
            Err(AuthError::TokenExpired)
        ));
    }

    // Test IDs: TAUTH-009
    #[test]
    fn token_ids_are_unique() {
        let first = must_decode(&must_pair().access, TokenKind::Access);
        let second = must_decode(&must_pair().access, TokenKind::Access);
        assert_ne!(first.jti, second.jti);
    }
}
