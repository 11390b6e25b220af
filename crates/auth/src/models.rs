//! Domain models for the auth subsystem.

use blue_papaya_core::{AuthProvider, Email, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user record as stored in the relational store.
///
/// Name and email are globally unique. A user has exactly one provider at a
/// time; the last successful sign-in wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Unique display name.
    pub name: String,
    /// Unique email address; the merge key across providers.
    pub email: Email,
    /// Argon2 hash for local accounts; `None` for provider-only accounts.
    pub password_hash: Option<String>,
    /// Provider used for the most recent successful sign-in.
    pub provider: AuthProvider,
    /// Provider-assigned subject ID (Google accounts only).
    pub provider_id: Option<String>,
    /// Role assigned at creation.
    pub role: Role,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Transient sign-up request payload.
///
/// Non-empty fields are the caller's responsibility; nothing here is
/// persisted as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpParams {
    /// Requested unique display name.
    pub name: String,
    /// Requested unique email.
    pub email: Email,
    /// Plaintext password; hashed before it touches the store.
    pub password: String,
}

/// Transient sign-in request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SignInParams {
    /// Account email.
    pub email: Email,
    /// Plaintext password.
    pub password: String,
}

/// An access/refresh token pair with expiry times, as produced by the
/// token issuer from a single captured "now".
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Longer-lived refresh token.
    pub refresh_token: String,
    /// Access token expiry.
    pub access_token_expires: DateTime<Utc>,
    /// Refresh token expiry.
    pub refresh_token_expires: DateTime<Utc>,
}

/// Output of every successful authentication operation.
///
/// Handed to the boundary layer for cookie/response encoding; never
/// persisted as-is.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    /// The authenticated user.
    pub user_id: UserId,
    /// Short-lived access token.
    pub access_token: String,
    /// Longer-lived refresh token.
    pub refresh_token: String,
    /// Access token expiry.
    pub access_token_expires: DateTime<Utc>,
    /// Refresh token expiry.
    pub refresh_token_expires: DateTime<Utc>,
    /// Whether this operation created the user.
    pub is_new_user: bool,
}

impl AuthResult {
    /// Assemble a result from a token pair.
    #[must_use]
    pub fn from_pair(user_id: UserId, pair: TokenPair, is_new_user: bool) -> Self {
        Self {
            user_id,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_token_expires: pair.access_token_expires,
            refresh_token_expires: pair.refresh_token_expires,
            is_new_user,
        }
    }
}
