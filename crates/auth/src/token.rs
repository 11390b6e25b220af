//! Token issuance: password hashing and JWT access/refresh pairs.
//!
//! Signing-key material is the caller's concern; this module only consumes
//! it through [`AuthConfig`](crate::config::AuthConfig).

use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use blue_papaya_core::{AuthProvider, UserId};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::TokenPair;

/// Upper bound on a token lifetime, roughly a century. Keeps expiry
/// arithmetic inside the range calendar types can represent.
const MAX_TTL_SECS: i64 = 100 * 365 * 24 * 3600;

fn clamp_ttl(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs())
        .unwrap_or(i64::MAX)
        .min(MAX_TTL_SECS)
}

/// Errors from token issuance and validation.
#[derive(Debug, Error)]
pub enum TokenError {
    /// JWT signing or validation failed.
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Password hashing failed.
    #[error("password hashing failed")]
    Hashing,

    /// A stored password hash could not be parsed.
    #[error("malformed password hash")]
    MalformedHash,

    /// Issuer failure injected by a test fake.
    #[error("issuer failure: {0}")]
    Other(String),
}

/// What a token is good for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    /// Short-lived API credential.
    Access,
    /// Longer-lived rotation credential.
    Refresh,
}

/// Claims carried by every token this system signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user ID.
    pub sub: String,
    /// Provider the user authenticated with.
    pub provider: AuthProvider,
    /// Access or refresh.
    pub token_use: TokenUse,
    /// Unique token ID; makes successive issuances distinct.
    pub jti: Uuid,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiry (Unix timestamp).
    pub exp: i64,
}

/// Password hashing and token signing capability.
pub trait TokenIssuer: Send + Sync {
    /// Hash a plaintext password for storage.
    fn hash_password(&self, password: &str) -> Result<String, TokenError>;

    /// Verify a plaintext password against a stored hash.
    ///
    /// Returns `Ok(false)` on mismatch; errors are reserved for malformed
    /// hashes.
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, TokenError>;

    /// Issue an access/refresh pair, both expiries computed from `now`.
    fn issue_pair(
        &self,
        user_id: UserId,
        provider: AuthProvider,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError>;

    /// Issue an access token alone (Google sessions keep the provider's
    /// refresh token instead of a local one).
    fn issue_access(
        &self,
        user_id: UserId,
        provider: AuthProvider,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), TokenError>;
}

/// Production issuer: Argon2id password hashes, HS256 JWTs.
pub struct JwtIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl JwtIssuer {
    /// Build an issuer from the auth configuration.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs: clamp_ttl(config.access_token_ttl),
            refresh_ttl_secs: clamp_ttl(config.refresh_token_ttl),
        }
    }

    fn sign(
        &self,
        user_id: UserId,
        provider: AuthProvider,
        token_use: TokenUse,
        now: DateTime<Utc>,
        ttl_secs: i64,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        let expires = now + chrono::Duration::seconds(ttl_secs);
        let claims = Claims {
            sub: user_id.to_string(),
            provider,
            token_use,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, expires))
    }

    /// Decode and validate a token this issuer signed.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Jwt`] for bad signatures and expired tokens.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

impl TokenIssuer for JwtIssuer {
    fn hash_password(&self, password: &str) -> Result<String, TokenError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| TokenError::Hashing)
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, TokenError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| TokenError::MalformedHash)?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    fn issue_pair(
        &self,
        user_id: UserId,
        provider: AuthProvider,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        let (access_token, access_token_expires) =
            self.sign(user_id, provider, TokenUse::Access, now, self.access_ttl_secs)?;
        let (refresh_token, refresh_token_expires) = self.sign(
            user_id,
            provider,
            TokenUse::Refresh,
            now,
            self.refresh_ttl_secs,
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_expires,
            refresh_token_expires,
        })
    }

    fn issue_access(
        &self,
        user_id: UserId,
        provider: AuthProvider,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        self.sign(user_id, provider, TokenUse::Access, now, self.access_ttl_secs)
    }
}

impl std::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIssuer")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::GoogleOAuthConfig;
    use secrecy::SecretString;

    fn test_config() -> AuthConfig {
        AuthConfig {
            database_url: SecretString::from("postgres://localhost/bp_auth_test"),
            jwt_secret: SecretString::from("kJ8#mN2$pQ5&rT9!vX3@zB6^cD0*fG4%"),
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 3600),
            google: GoogleOAuthConfig {
                client_id: "client-id".to_string(),
                client_secret: SecretString::from("client-secret-value"),
                redirect_uri: "https://shop.example.com/auth/google/callback".to_string(),
            },
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let issuer = JwtIssuer::new(&test_config());
        let hash = issuer.hash_password("hunter22").unwrap();

        assert!(issuer.verify_password("hunter22", &hash).unwrap());
        assert!(!issuer.verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        let issuer = JwtIssuer::new(&test_config());
        assert!(matches!(
            issuer.verify_password("pw", "not-an-argon2-hash"),
            Err(TokenError::MalformedHash)
        ));
    }

    #[test]
    fn test_pair_expiries_follow_config() {
        let issuer = JwtIssuer::new(&test_config());
        let now = Utc::now();
        let pair = issuer
            .issue_pair(UserId::generate(), AuthProvider::Local, now)
            .unwrap();

        assert_eq!(pair.access_token_expires, now + chrono::Duration::seconds(900));
        assert_eq!(
            pair.refresh_token_expires,
            now + chrono::Duration::seconds(7 * 24 * 3600)
        );
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn test_extreme_ttl_is_clamped() {
        let mut config = test_config();
        config.refresh_token_ttl = Duration::from_secs(u64::MAX);
        let issuer = JwtIssuer::new(&config);

        let pair = issuer
            .issue_pair(UserId::generate(), AuthProvider::Local, Utc::now())
            .unwrap();
        assert!(pair.refresh_token_expires > pair.access_token_expires);
    }

    #[test]
    fn test_decode_roundtrip() {
        let issuer = JwtIssuer::new(&test_config());
        let user_id = UserId::generate();
        let pair = issuer
            .issue_pair(user_id, AuthProvider::Google, Utc::now())
            .unwrap();

        let claims = issuer.decode(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.provider, AuthProvider::Google);
        assert_eq!(claims.token_use, TokenUse::Access);

        let claims = issuer.decode(&pair.refresh_token).unwrap();
        assert_eq!(claims.token_use, TokenUse::Refresh);
    }

    #[test]
    fn test_successive_tokens_are_distinct() {
        let issuer = JwtIssuer::new(&test_config());
        let user_id = UserId::generate();
        let now = Utc::now();

        let first = issuer.issue_pair(user_id, AuthProvider::Local, now).unwrap();
        let second = issuer.issue_pair(user_id, AuthProvider::Local, now).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn test_decode_rejects_foreign_signature() {
        let issuer = JwtIssuer::new(&test_config());
        let mut other_config = test_config();
        other_config.jwt_secret = SecretString::from("qW3#eR5$tY7&uI9!oP1@aS2^dF4*gH6%");
        let other = JwtIssuer::new(&other_config);

        let pair = other
            .issue_pair(UserId::generate(), AuthProvider::Local, Utc::now())
            .unwrap();
        assert!(issuer.decode(&pair.access_token).is_err());
    }
}
